//! Two-tier manifest cache
//!
//! Registry manifests are cached in memory for the life of the process and
//! on disk under `<home>/.tidy-cache/manifests/` with a 24 hour TTL. The
//! in-memory tier is shared by all resolver workers; disk writes happen on
//! a detached thread so resolution never blocks on them.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::paths::{self, PathsError};
use crate::registry::Manifest;

/// How long a disk-cached manifest stays valid.
pub const MANIFEST_TTL_HOURS: i64 = 24;

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// Cache root could not be located
    #[error(transparent)]
    Paths(#[from] PathsError),

    /// IO error
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// On-disk record wrapping a manifest with its write time.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedManifest {
    manifest: Manifest,
    cached_at: DateTime<Utc>,
}

/// Shared manifest cache.
///
/// Reads hit the in-memory map first, then the disk tier. A disk hit
/// within the TTL is promoted into memory; a stale record is deleted by
/// the read that observes its age.
pub struct ManifestCache {
    memory: RwLock<HashMap<String, Manifest>>,
    disk_root: PathBuf,
    ttl: Duration,
}

impl ManifestCache {
    /// Create a cache rooted at the per-user default directory.
    pub fn new() -> Result<Self, CacheError> {
        Ok(Self::with_root(paths::manifest_cache_root()?))
    }

    /// Create a cache rooted at an explicit directory.
    pub fn with_root(disk_root: PathBuf) -> Self {
        Self {
            memory: RwLock::new(HashMap::new()),
            disk_root,
            ttl: Duration::hours(MANIFEST_TTL_HOURS),
        }
    }

    /// Cache key for a `(name, normalized-version)` pair.
    pub fn key(name: &str, version: &str) -> String {
        format!("{}@{}", name, version)
    }

    fn disk_path(&self, key: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.disk_root.join(format!("{}.json", digest))
    }

    /// Look up a manifest, consulting both tiers.
    pub fn get(&self, name: &str, version: &str) -> Option<Manifest> {
        let key = Self::key(name, version);

        if let Some(manifest) = self.memory.read().get(&key) {
            return Some(manifest.clone());
        }

        let manifest = self.read_disk(&key)?;
        self.memory
            .write()
            .insert(key, manifest.clone());
        Some(manifest)
    }

    fn read_disk(&self, key: &str) -> Option<Manifest> {
        let path = self.disk_path(key);
        let data = std::fs::read(&path).ok()?;

        let record: CachedManifest = match serde_json::from_slice(&data) {
            Ok(record) => record,
            Err(err) => {
                debug!(%key, %err, "discarding unreadable cache record");
                let _ = std::fs::remove_file(&path);
                return None;
            }
        };

        if Utc::now() - record.cached_at > self.ttl {
            debug!(%key, "discarding expired cache record");
            let _ = std::fs::remove_file(&path);
            return None;
        }

        Some(record.manifest)
    }

    /// Insert a manifest into memory now and onto disk asynchronously.
    pub fn insert(&self, name: &str, version: &str, manifest: Manifest) {
        let key = Self::key(name, version);
        self.memory.write().insert(key.clone(), manifest.clone());

        let path = self.disk_path(&key);
        let root = self.disk_root.clone();
        std::thread::spawn(move || {
            let record = CachedManifest {
                manifest,
                cached_at: Utc::now(),
            };
            if let Err(err) = write_record(&root, &path, &record) {
                debug!(%key, %err, "manifest cache write failed");
            }
        });
    }

    /// Insert a manifest into memory and wait for the disk write.
    ///
    /// Used by tests and by callers that need the record durable before
    /// returning.
    pub fn insert_sync(&self, name: &str, version: &str, manifest: Manifest) -> Result<(), CacheError> {
        let key = Self::key(name, version);
        self.memory.write().insert(key.clone(), manifest.clone());

        let record = CachedManifest {
            manifest,
            cached_at: Utc::now(),
        };
        write_record(&self.disk_root, &self.disk_path(&key), &record)?;
        Ok(())
    }

    /// Drop every in-memory entry.
    pub fn clear_memory(&self) {
        self.memory.write().clear();
    }

    /// Remove the on-disk tier entirely.
    pub fn clear_disk(&self) -> Result<(), CacheError> {
        if self.disk_root.exists() {
            std::fs::remove_dir_all(&self.disk_root)?;
        }
        Ok(())
    }

    /// The disk tier root directory.
    pub fn disk_root(&self) -> &Path {
        &self.disk_root
    }

    #[cfg(test)]
    fn backdate(&self, name: &str, version: &str, age: Duration) {
        let key = Self::key(name, version);
        let path = self.disk_path(&key);
        let data = std::fs::read(&path).unwrap();
        let mut record: CachedManifest = serde_json::from_slice(&data).unwrap();
        record.cached_at = Utc::now() - age;
        std::fs::write(&path, serde_json::to_vec(&record).unwrap()).unwrap();
    }
}

fn write_record(
    root: &Path,
    path: &Path,
    record: &CachedManifest,
) -> Result<(), std::io::Error> {
    std::fs::create_dir_all(root)?;
    let data = serde_json::to_vec(record)?;
    std::fs::write(path, data)
}
