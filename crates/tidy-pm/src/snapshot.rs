//! Resolution snapshot
//!
//! A project-local record of the last successful resolution, keyed by the
//! hash of the manifest that produced it. Valid only while the hash
//! matches; never invalidated by time. Writes are best-effort.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::paths;
use crate::resolver::ResolutionSet;

/// Snapshot file name inside the project packages directory.
pub const SNAPSHOT_FILE: &str = ".tidy-resolution-cache.json";

/// Errors that can occur while persisting a snapshot
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// IO error
    #[error("Failed to write resolution snapshot: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Failed to encode resolution snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Stored resolution keyed by the manifest hash that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub package_hash: String,
    pub resolved: ResolutionSet,
}

impl Snapshot {
    /// Location of the snapshot for a project.
    pub fn path(project_root: &Path) -> PathBuf {
        paths::node_modules(project_root).join(SNAPSHOT_FILE)
    }

    /// Load the stored set if its hash matches `package_hash`.
    pub fn load(project_root: &Path, package_hash: &str) -> Option<ResolutionSet> {
        let path = Self::path(project_root);
        let data = std::fs::read(&path).ok()?;

        let snapshot: Snapshot = match serde_json::from_slice(&data) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                debug!(%err, "discarding unreadable resolution snapshot");
                return None;
            }
        };

        if snapshot.package_hash != package_hash {
            return None;
        }

        Some(snapshot.resolved)
    }

    /// Persist a resolution for the given manifest hash.
    pub fn store(
        project_root: &Path,
        package_hash: &str,
        resolved: &ResolutionSet,
    ) -> Result<(), SnapshotError> {
        let snapshot = Snapshot {
            package_hash: package_hash.to_string(),
            resolved: resolved.clone(),
        };

        let path = Self::path(project_root);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_vec_pretty(&snapshot)?)?;
        Ok(())
    }
}
