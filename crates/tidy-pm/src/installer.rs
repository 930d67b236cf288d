//! Package installation
//!
//! Drives the store to fetch each resolved package, then materializes the
//! extracted contents into the project's `node_modules/` tree. Files are
//! hard-linked from the store and fall back to byte copies on filesystems
//! that refuse links. Installs run on a small worker pool; a failure in
//! one package never stops its siblings.

use crossbeam_channel::bounded;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::events::{Event, NullProgress, Progress};
use crate::paths::{self, MANIFEST_FILE};
use crate::registry::RegistryClient;
use crate::resolver::{ResolutionSet, ResolvedPackage};
use crate::store::{Store, StoreError};

/// Worker threads materializing packages.
pub const DEFAULT_INSTALL_WORKERS: usize = 10;

/// Errors that can occur while installing a single package
#[derive(Debug, Error)]
pub enum InstallError {
    /// Store fetch or extraction failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Materialization into the project failed
    #[error("Failed to materialize package: {0}")]
    Io(#[from] std::io::Error),
}

/// A package that failed to install.
#[derive(Debug, Clone)]
pub struct PackageFailure {
    pub name: String,
    pub message: String,
}

/// Summary of an install run.
#[derive(Debug, Default)]
pub struct InstallReport {
    /// Packages newly materialized
    pub installed: usize,

    /// Packages already present
    pub skipped: usize,

    /// Per-package failures; siblings still completed
    pub failures: Vec<PackageFailure>,
}

impl InstallReport {
    /// Whether every package landed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Installs a resolution set into a project.
pub struct Installer {
    store: Arc<Store>,
    client: Arc<RegistryClient>,
    project_root: PathBuf,
    workers: usize,
    installing: Mutex<HashSet<String>>,
    progress: Arc<dyn Progress>,
}

impl Installer {
    /// Create an installer for a project.
    pub fn new(store: Arc<Store>, client: Arc<RegistryClient>, project_root: &Path) -> Self {
        Self {
            store,
            client,
            project_root: project_root.to_path_buf(),
            workers: DEFAULT_INSTALL_WORKERS,
            installing: Mutex::new(HashSet::new()),
            progress: Arc::new(NullProgress),
        }
    }

    /// Override the worker pool size.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Attach a progress sink.
    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    /// Install every package in `resolved`.
    ///
    /// Already-materialized packages are skipped; per-package failures are
    /// collected in the report rather than aborting the run.
    pub fn install_all(&self, resolved: &ResolutionSet) -> InstallReport {
        let report = Mutex::new(InstallReport::default());
        let (tx, rx) = bounded::<(&String, &ResolvedPackage)>(self.workers * 2);

        std::thread::scope(|scope| {
            for id in 0..self.workers {
                let rx = rx.clone();
                let report = &report;

                std::thread::Builder::new()
                    .name(format!("tidy-install-{}", id))
                    .spawn_scoped(scope, move || {
                        for (name, pkg) in rx {
                            self.install_entry(name, pkg, report);
                        }
                    })
                    .expect("failed to spawn install worker");
            }

            for item in resolved {
                if tx.send(item).is_err() {
                    break;
                }
            }
            drop(tx);
        });

        report.into_inner()
    }

    fn install_entry(&self, name: &str, pkg: &ResolvedPackage, report: &Mutex<InstallReport>) {
        if is_installed(&self.project_root, name) {
            self.progress.event(&Event::Skipped {
                name: name.to_string(),
                version: pkg.version.clone(),
            });
            report.lock().skipped += 1;
            return;
        }

        if !self.installing.lock().insert(name.to_string()) {
            debug!(name, "install already in progress, skipping");
            report.lock().skipped += 1;
            return;
        }

        self.progress.event(&Event::Installing {
            name: name.to_string(),
            version: pkg.version.clone(),
        });

        let result = self.install_one(name, pkg);
        self.installing.lock().remove(name);

        match result {
            Ok(()) => {
                self.progress.event(&Event::Installed {
                    name: name.to_string(),
                    version: pkg.version.clone(),
                });
                report.lock().installed += 1;
            }
            Err(err) => {
                warn!(name, %err, "package install failed");
                self.progress.event(&Event::InstallFailed {
                    name: name.to_string(),
                    message: err.to_string(),
                });
                report.lock().failures.push(PackageFailure {
                    name: name.to_string(),
                    message: err.to_string(),
                });
            }
        }
    }

    /// Fetch one package into the store and materialize it.
    pub fn install_one(&self, name: &str, pkg: &ResolvedPackage) -> Result<(), InstallError> {
        self.store
            .ensure(name, &pkg.version, &pkg.tarball, &self.client)?;

        let source = self.store.entry_dir(name, &pkg.version);
        let target = paths::node_modules(&self.project_root).join(name);
        materialize(&source, &target)?;
        Ok(())
    }
}

/// Whether `name` is already materialized in the project.
pub fn is_installed(project_root: &Path, name: &str) -> bool {
    paths::node_modules(project_root)
        .join(name)
        .join(MANIFEST_FILE)
        .is_file()
}

/// Instantiate a store entry into the project tree.
///
/// Any previous directory at `target` is removed first. Directories are
/// recreated; files are hard-linked with a byte-copy fallback for
/// cross-device or otherwise link-refusing filesystems. Symlinks are
/// never used, so downstream path resolution behaves the same on every
/// platform.
pub fn materialize(source: &Path, target: &Path) -> Result<(), std::io::Error> {
    if target.exists() {
        std::fs::remove_dir_all(target)?;
    }
    std::fs::create_dir_all(target)?;
    link_tree(source, target)
}

fn link_tree(source: &Path, target: &Path) -> Result<(), std::io::Error> {
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let from = entry.path();
        let to = target.join(entry.file_name());

        if entry.file_type()?.is_dir() {
            std::fs::create_dir_all(&to)?;
            link_tree(&from, &to)?;
        } else if std::fs::hard_link(&from, &to).is_err() {
            std::fs::copy(&from, &to)?;
        }
    }

    Ok(())
}
