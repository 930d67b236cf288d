//! Executable linking
//!
//! After packages are materialized, each one that declares a `bin` field
//! gets an entry in `node_modules/.bin/` pointing at its executable.
//! Links are recreated idempotently and linking is best-effort per
//! package: a package with a broken declaration is skipped, not fatal.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::paths::{self, MANIFEST_FILE};
use crate::registry::Bin;

/// The slice of an installed package.json the linker cares about.
#[derive(Debug, Deserialize)]
struct BinManifest {
    #[serde(default)]
    bin: Option<Bin>,
}

/// Link every declared executable under `node_modules/.bin/`.
///
/// Scans the immediate subdirectories of `node_modules/`, reads each
/// `package.json`, and links the declared executables. Errors for an
/// individual package are swallowed so one broken package cannot fail
/// the whole install.
pub fn link_binaries(project_root: &Path) -> Result<(), std::io::Error> {
    let modules = paths::node_modules(project_root);
    let bin_dir = paths::bin_dir(project_root);
    std::fs::create_dir_all(&bin_dir)?;

    for entry in std::fs::read_dir(&modules)? {
        let entry = entry?;

        if !entry.file_type()?.is_dir() || entry.file_name() == ".bin" {
            continue;
        }

        let pkg_dir = entry.path();
        if let Err(err) = link_package(&pkg_dir, &bin_dir) {
            debug!(package = %pkg_dir.display(), %err, "skipping binary links");
        }
    }

    Ok(())
}

fn link_package(pkg_dir: &Path, bin_dir: &Path) -> Result<(), std::io::Error> {
    let manifest_path = pkg_dir.join(MANIFEST_FILE);
    if !manifest_path.is_file() {
        return Ok(());
    }

    let data = std::fs::read(&manifest_path)?;
    let manifest: BinManifest = match serde_json::from_slice(&data) {
        Ok(manifest) => manifest,
        Err(err) => {
            debug!(package = %pkg_dir.display(), %err, "unreadable package manifest");
            return Ok(());
        }
    };

    let entries: BTreeMap<String, String> = match manifest.bin {
        None => return Ok(()),
        Some(Bin::Single(path)) => {
            let name = pkg_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            BTreeMap::from([(name, path)])
        }
        Some(Bin::Named(map)) => map,
    };

    for (link_name, rel_path) in entries {
        if link_name.is_empty() {
            continue;
        }

        let target = pkg_dir.join(&rel_path);
        if !target.is_file() {
            continue;
        }

        ensure_executable(&target)?;

        let link = bin_dir.join(&link_name);
        if link.symlink_metadata().is_ok() {
            std::fs::remove_file(&link)?;
        }

        create_link(&target, &link)?;
    }

    Ok(())
}

/// Make sure the owner-executable bit is set.
#[cfg(unix)]
fn ensure_executable(path: &Path) -> Result<(), std::io::Error> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path)?;
    let mode = metadata.permissions().mode();
    let wanted = mode | 0o111;

    if mode != wanted {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(wanted))?;
    }

    Ok(())
}

#[cfg(not(unix))]
fn ensure_executable(_path: &Path) -> Result<(), std::io::Error> {
    Ok(())
}

#[cfg(unix)]
fn create_link(target: &Path, link: &Path) -> Result<(), std::io::Error> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_link(target: &Path, link: &Path) -> Result<(), std::io::Error> {
    // Symlink creation needs elevation on most Windows setups; fall back
    // to a plain copy.
    if std::os::windows::fs::symlink_file(target, link).is_ok() {
        return Ok(());
    }

    std::fs::copy(target, link)?;
    ensure_executable(link)
}

#[cfg(all(not(unix), not(windows)))]
fn create_link(target: &Path, link: &Path) -> Result<(), std::io::Error> {
    std::fs::copy(target, link).map(|_| ())
}
