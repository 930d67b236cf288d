//! Filesystem locations used across the package manager
//!
//! Per-user roots (store, manifest cache) and per-project paths
//! (node_modules, .bin) live here so every subsystem agrees on them.

use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the project manifest file.
pub const MANIFEST_FILE: &str = "package.json";

/// Name of the per-project packages directory.
pub const NODE_MODULES: &str = "node_modules";

/// Errors that can occur while locating directories
#[derive(Debug, Error)]
pub enum PathsError {
    /// Working directory could not be read
    #[error("Failed to determine the current working directory: {0}")]
    WorkingDir(#[source] std::io::Error),

    /// Home directory could not be determined
    #[error("Could not determine the user home directory")]
    HomeDir,
}

/// Find the project root by walking up from `start` until a directory
/// containing `package.json` is found.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let mut current = start;

    loop {
        if current.join(MANIFEST_FILE).exists() {
            return Some(current.to_path_buf());
        }

        current = current.parent()?;
    }
}

/// Determine the project root for the current invocation.
///
/// Walks up from the working directory looking for a `package.json`; if
/// none exists the working directory itself is the root (fresh projects
/// have no manifest yet). Failure to read the working directory is the
/// one fatal condition here.
pub fn project_root() -> Result<PathBuf, PathsError> {
    let cwd = env::current_dir().map_err(PathsError::WorkingDir)?;
    Ok(find_project_root(&cwd).unwrap_or(cwd))
}

/// The user home directory.
pub fn home_dir() -> Result<PathBuf, PathsError> {
    dirs::home_dir().ok_or(PathsError::HomeDir)
}

/// Per-user extracted-package store: `<home>/.tidy/store/`.
pub fn store_root() -> Result<PathBuf, PathsError> {
    Ok(home_dir()?.join(".tidy").join("store"))
}

/// Per-user manifest cache: `<home>/.tidy-cache/manifests/`.
pub fn manifest_cache_root() -> Result<PathBuf, PathsError> {
    Ok(home_dir()?.join(".tidy-cache").join("manifests"))
}

/// The project packages directory: `<root>/node_modules/`.
pub fn node_modules(project_root: &Path) -> PathBuf {
    project_root.join(NODE_MODULES)
}

/// The executable link directory: `<root>/node_modules/.bin/`.
pub fn bin_dir(project_root: &Path) -> PathBuf {
    node_modules(project_root).join(".bin")
}
