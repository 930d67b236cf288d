//! Tarball extraction
//!
//! Streams a gzipped tar archive into a directory. Registry tarballs root
//! their contents under a `package/` segment, which is stripped. Only
//! regular files and directories are materialized; symlinks, hard links
//! and device nodes are skipped. Entries that would land outside the
//! destination are rejected before any byte is written.

use flate2::read::GzDecoder;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};
use thiserror::Error;

/// Errors that can occur while unpacking a tarball
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Archive or filesystem IO failure
    #[error("Failed to unpack archive: {0}")]
    Io(#[from] std::io::Error),

    /// Entry path would escape the destination directory
    #[error("Archive entry escapes the destination: {0}")]
    PathEscape(PathBuf),
}

/// Unpack a gzipped tarball from `reader` into `dest`.
///
/// `dest` must already exist. On error the caller is responsible for
/// cleaning up whatever was partially written.
pub fn unpack_tarball<R: Read>(reader: R, dest: &Path) -> Result<(), ExtractError> {
    let decoder = GzDecoder::new(reader);
    let mut archive = Archive::new(decoder);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let raw_path = entry.path()?.into_owned();

        let relative = match package_relative(&raw_path) {
            Some(relative) => relative,
            None => continue,
        };

        let safe = sanitize(&relative).ok_or(ExtractError::PathEscape(raw_path))?;
        let target = dest.join(&safe);

        match entry.header().entry_type() {
            EntryType::Directory => {
                std::fs::create_dir_all(&target)?;
            }
            EntryType::Regular => {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let mut file = std::fs::File::create(&target)?;
                std::io::copy(&mut entry, &mut file)?;
            }
            _ => {}
        }
    }

    Ok(())
}

/// Strip the registry's `package/` root segment. Returns `None` when
/// nothing remains.
fn package_relative(path: &Path) -> Option<PathBuf> {
    let mut components = path.components();

    let stripped: PathBuf = match components.clone().next() {
        Some(Component::Normal(first)) if first == "package" => components.skip(1).collect(),
        _ => path.to_path_buf(),
    };

    if stripped.as_os_str().is_empty() {
        None
    } else {
        Some(stripped)
    }
}

/// Reduce a path to plain child components, rejecting anything that could
/// climb out of the destination (`..`, absolute paths, drive prefixes).
fn sanitize(path: &Path) -> Option<PathBuf> {
    let mut safe = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Normal(part) => safe.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if safe.as_os_str().is_empty() {
        None
    } else {
        Some(safe)
    }
}
