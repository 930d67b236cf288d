//! Content-addressed package store
//!
//! Extracted packages live under `<home>/.tidy/store/<name>@<version>/`
//! and are shared by every project on the machine. An entry directory
//! either exists completely or not at all: extraction happens in a
//! sibling `.tmp` directory that is renamed into place once the archive
//! is fully written.

mod extract;

pub use extract::{unpack_tarball, ExtractError};

use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::paths::{self, PathsError};
use crate::registry::{RegistryClient, RegistryError};

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store root could not be located
    #[error(transparent)]
    Paths(#[from] PathsError),

    /// Tarball download failed
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Archive decoding failed
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// Filesystem failure
    #[error("Store IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How an `ensure` call was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetched {
    /// The entry was already in the store.
    Cached,

    /// The tarball was downloaded and extracted.
    Downloaded,
}

/// Per-user store of extracted packages.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Open the store at the per-user default location.
    pub fn new() -> Result<Self, StoreError> {
        Ok(Self::with_root(paths::store_root()?))
    }

    /// Open a store rooted at an explicit directory.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    /// The store root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the extracted contents of `name@version`.
    pub fn entry_dir(&self, name: &str, version: &str) -> PathBuf {
        self.root.join(format!("{}@{}", name, version))
    }

    /// Whether `name@version` is already extracted.
    pub fn contains(&self, name: &str, version: &str) -> bool {
        self.entry_dir(name, version).exists()
    }

    /// Make sure `name@version` is present, downloading `url` if needed.
    pub fn ensure(
        &self,
        name: &str,
        version: &str,
        url: &str,
        client: &RegistryClient,
    ) -> Result<Fetched, StoreError> {
        if self.contains(name, version) {
            return Ok(Fetched::Cached);
        }

        let response = client.download(url)?;
        self.ensure_from_reader(name, version, response)
    }

    /// Extract a tarball stream into the store entry for `name@version`.
    ///
    /// Concurrent callers may race to create the same entry; the rename
    /// into place is the serialization point. A caller that loses the
    /// race discards its own work and reports the entry as cached.
    pub fn ensure_from_reader<R: Read>(
        &self,
        name: &str,
        version: &str,
        reader: R,
    ) -> Result<Fetched, StoreError> {
        let entry = self.entry_dir(name, version);
        if entry.exists() {
            return Ok(Fetched::Cached);
        }

        let tmp = tmp_dir(&entry);
        if tmp.exists() {
            std::fs::remove_dir_all(&tmp)?;
        }
        std::fs::create_dir_all(&tmp)?;

        if let Err(err) = unpack_tarball(reader, &tmp) {
            let _ = std::fs::remove_dir_all(&tmp);
            return Err(err.into());
        }

        match std::fs::rename(&tmp, &entry) {
            Ok(()) => Ok(Fetched::Downloaded),
            Err(err) => {
                let _ = std::fs::remove_dir_all(&tmp);
                if entry.exists() {
                    debug!(name, version, "lost extraction race, entry already complete");
                    Ok(Fetched::Cached)
                } else {
                    Err(err.into())
                }
            }
        }
    }
}

/// Sibling temporary directory for an entry: `<entry>.tmp`.
fn tmp_dir(entry: &Path) -> PathBuf {
    let mut os = entry.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}
