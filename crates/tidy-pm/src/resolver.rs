//! Dependency resolution
//!
//! A concurrent breadth-first walk over the registry manifest graph. The
//! walk starts from the union of a project's production and development
//! dependencies and produces a flat set: one entry per package name,
//! first fetch wins. Fetch failures drop the affected subtree and the
//! walk continues; resolution is best-effort by policy.
//!
//! Termination is supervised: work is tracked by a `pending` counter
//! (enqueued tasks) and an `active` counter (workers mid-fetch). Child
//! enqueues bump `pending` before the parent's `active` decrement, so a
//! supervisor that observes both at zero twice in a row knows the walk
//! has quiesced.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::events::{Event, NullProgress, Progress};
use crate::manifest::PackageJson;
use crate::registry::RegistryClient;
use crate::snapshot::Snapshot;
use crate::sync::Semaphore;

/// Worker threads walking the graph.
pub const DEFAULT_WORKERS: usize = 100;

/// Concurrent registry fetches allowed at once.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 64;

/// Capacity of the bounded task queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

/// Supervisor sampling interval.
const SUPERVISOR_TICK: Duration = Duration::from_millis(50);

/// Delay before re-sampling an apparently quiescent walk.
const QUIESCENT_CONFIRM: Duration = Duration::from_millis(100);

/// Errors that can occur during resolution
#[derive(Debug, Error)]
pub enum ResolveError {
    /// A resolver worker thread could not be spawned
    #[error("Failed to spawn resolver worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// One resolved package in the flat set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPackage {
    /// Exact version reported by the registry
    pub version: String,

    /// Tarball URL
    pub tarball: String,

    /// Direct dependencies (name -> range); the flat walk leaves this
    /// empty because children become top-level entries themselves.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
}

/// Flat resolution result: at most one version per package name.
pub type ResolutionSet = BTreeMap<String, ResolvedPackage>;

/// A unit of work: fetch one package manifest.
#[derive(Debug, Clone)]
struct Task {
    name: String,
    range: String,
}

/// Shared walk state.
///
/// `maps` guards the resolved-set/in-flight pair so the check-insert is
/// atomic. `pending` counts enqueued-but-unclaimed tasks, `active` counts
/// workers past the claim point.
#[derive(Default)]
struct WalkState {
    maps: Mutex<WalkMaps>,
    pending: AtomicUsize,
    active: AtomicUsize,
    cancelled: AtomicBool,
}

#[derive(Default)]
struct WalkMaps {
    resolved: ResolutionSet,
    in_flight: HashSet<String>,
}

/// Concurrent dependency resolver.
pub struct Resolver {
    client: Arc<RegistryClient>,
    project_root: PathBuf,
    workers: usize,
    queue_capacity: usize,
    fetch_limit: Arc<Semaphore>,
    progress: Arc<dyn Progress>,
}

impl Resolver {
    /// Create a resolver for a project.
    pub fn new(client: Arc<RegistryClient>, project_root: &Path) -> Self {
        Self {
            client,
            project_root: project_root.to_path_buf(),
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            fetch_limit: Arc::new(Semaphore::new(DEFAULT_FETCH_CONCURRENCY)),
            progress: Arc::new(NullProgress),
        }
    }

    /// Override the worker pool size.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Override the task queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Override the fetch concurrency cap.
    pub fn with_fetch_concurrency(mut self, fetches: usize) -> Self {
        self.fetch_limit = Arc::new(Semaphore::new(fetches.max(1)));
        self
    }

    /// Attach a progress sink.
    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    /// Resolve the full dependency set for `manifest`.
    ///
    /// Returns the snapshot from a previous run when the manifest hash
    /// still matches; otherwise walks the graph and stores a fresh
    /// snapshot on the way out.
    pub fn resolve(&self, manifest: &PackageJson) -> Result<ResolutionSet, ResolveError> {
        let hash = manifest.canonical_hash();

        if let Some(resolved) = Snapshot::load(&self.project_root, &hash) {
            debug!(packages = resolved.len(), "resolution served from snapshot");
            self.progress.event(&Event::Resolved {
                packages: resolved.len(),
                from_cache: true,
            });
            return Ok(resolved);
        }

        let roots: Vec<Task> = manifest
            .all_dependencies()
            .into_iter()
            .map(|(name, range)| Task { name, range })
            .collect();

        self.progress.event(&Event::ResolveStarted { roots: roots.len() });

        if roots.is_empty() {
            return Ok(ResolutionSet::new());
        }

        let state = Arc::new(WalkState::default());
        state.pending.store(roots.len(), Ordering::SeqCst);

        let (tx, rx) = bounded::<Task>(self.queue_capacity);

        std::thread::scope(|scope| -> Result<(), ResolveError> {
            for id in 0..self.workers {
                let worker_rx = rx.clone();
                let worker_tx = tx.clone();
                let worker_state = state.clone();
                let client = self.client.clone();
                let fetch_limit = self.fetch_limit.clone();
                let progress = self.progress.clone();

                let spawned = std::thread::Builder::new()
                    .name(format!("tidy-resolver-{}", id))
                    .spawn_scoped(scope, move || {
                        worker_loop(
                            &worker_rx,
                            &worker_tx,
                            worker_state.as_ref(),
                            client.as_ref(),
                            fetch_limit.as_ref(),
                            progress.as_ref(),
                        )
                    });

                if let Err(err) = spawned {
                    // Unblock already-running workers before the scope
                    // joins them.
                    state.cancelled.store(true, Ordering::Release);
                    return Err(ResolveError::Spawn(err));
                }
            }

            // Roots are never dropped: block until each is queued.
            for task in roots {
                if tx.send(task).is_err() {
                    break;
                }
            }

            supervise(&state);
            Ok(())
        })?;

        drop(tx);

        let resolved = std::mem::take(&mut state.maps.lock().resolved);

        self.progress.event(&Event::Resolved {
            packages: resolved.len(),
            from_cache: false,
        });

        if let Err(err) = Snapshot::store(&self.project_root, &hash, &resolved) {
            warn!(%err, "failed to write resolution snapshot");
        }

        Ok(resolved)
    }
}

/// Signal cancellation once `pending` and `active` stay zero across two
/// samples taken 100 ms apart.
fn supervise(state: &WalkState) {
    loop {
        std::thread::sleep(SUPERVISOR_TICK);

        if !is_quiescent(state) {
            continue;
        }

        std::thread::sleep(QUIESCENT_CONFIRM);

        if is_quiescent(state) {
            state.cancelled.store(true, Ordering::Release);
            return;
        }
    }
}

fn is_quiescent(state: &WalkState) -> bool {
    state.pending.load(Ordering::SeqCst) == 0 && state.active.load(Ordering::SeqCst) == 0
}

fn worker_loop(
    rx: &Receiver<Task>,
    tx: &Sender<Task>,
    state: &WalkState,
    client: &RegistryClient,
    fetch_limit: &Semaphore,
    progress: &dyn Progress,
) {
    loop {
        if state.cancelled.load(Ordering::Acquire) {
            return;
        }

        let task = match rx.recv_timeout(SUPERVISOR_TICK) {
            Ok(task) => task,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return,
        };

        run_task(task, tx, state, client, fetch_limit, progress);
    }
}

fn run_task(
    task: Task,
    tx: &Sender<Task>,
    state: &WalkState,
    client: &RegistryClient,
    fetch_limit: &Semaphore,
    progress: &dyn Progress,
) {
    // Claim the name, or drop the task if it is already handled.
    {
        let mut maps = state.maps.lock();
        if maps.resolved.contains_key(&task.name) || maps.in_flight.contains(&task.name) {
            state.pending.fetch_sub(1, Ordering::SeqCst);
            return;
        }
        maps.in_flight.insert(task.name.clone());
    }

    state.active.fetch_add(1, Ordering::SeqCst);
    state.pending.fetch_sub(1, Ordering::SeqCst);

    let fetched = {
        let _permit = fetch_limit.acquire();
        client.manifest(&task.name, &task.range)
    };

    let manifest = match fetched {
        Ok(manifest) => manifest,
        Err(err) => {
            warn!(name = %task.name, range = %task.range, %err, "dropping unresolvable package");
            progress.event(&Event::FetchFailed {
                name: task.name.clone(),
                range: task.range.clone(),
                message: err.to_string(),
            });
            state.maps.lock().in_flight.remove(&task.name);
            state.active.fetch_sub(1, Ordering::SeqCst);
            return;
        }
    };

    {
        let mut maps = state.maps.lock();
        maps.in_flight.remove(&task.name);

        maps.resolved
            .entry(task.name.clone())
            .or_insert_with(|| ResolvedPackage {
                version: manifest.version.clone(),
                tarball: manifest.dist.tarball.clone(),
                dependencies: BTreeMap::new(),
            });

        // Enqueue children while still holding the lock: `pending` rises
        // before our `active` decrement below, which keeps the
        // supervisor's quiescence check sound.
        for (dep_name, dep_range) in &manifest.dependencies {
            if maps.resolved.contains_key(dep_name) || maps.in_flight.contains(dep_name) {
                continue;
            }

            state.pending.fetch_add(1, Ordering::SeqCst);
            let child = Task {
                name: dep_name.clone(),
                range: dep_range.clone(),
            };
            if tx.try_send(child).is_err() {
                // Queue full: drop. The name is either in flight, already
                // resolved, or will be re-enqueued by another parent.
                state.pending.fetch_sub(1, Ordering::SeqCst);
                debug!(name = %dep_name, "task queue full, dropping enqueue");
            }
        }
    }

    state.active.fetch_sub(1, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolved_package_serialization() {
        let pkg = ResolvedPackage {
            version: "3.0.1".to_string(),
            tarball: "https://example.test/is-odd-3.0.1.tgz".to_string(),
            dependencies: BTreeMap::new(),
        };

        let json = serde_json::to_string(&pkg).unwrap();
        assert!(!json.contains("dependencies"));

        let back: ResolvedPackage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pkg);
    }

    #[test]
    fn test_walk_state_quiescence() {
        let state = WalkState::default();
        assert!(is_quiescent(&state));

        state.pending.fetch_add(1, Ordering::SeqCst);
        assert!(!is_quiescent(&state));

        state.pending.fetch_sub(1, Ordering::SeqCst);
        state.active.fetch_add(1, Ordering::SeqCst);
        assert!(!is_quiescent(&state));

        state.active.fetch_sub(1, Ordering::SeqCst);
        assert!(is_quiescent(&state));
    }
}
