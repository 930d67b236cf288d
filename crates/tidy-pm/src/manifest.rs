//! Project manifest (package.json)
//!
//! Reading and writing the per-project manifest. The writer touches only
//! the dependency maps; every other top-level key round-trips untouched
//! through the flattened `extra` map.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::paths::MANIFEST_FILE;

/// Errors that can occur while reading or writing a project manifest
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Failed to read or write the manifest file
    #[error("Failed to access {MANIFEST_FILE}: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON
    #[error("Failed to parse {MANIFEST_FILE}: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The project manifest.
///
/// `dependencies`, `devDependencies` and `scripts` are modeled; everything
/// else is preserved verbatim in `extra` so a rewrite never loses fields
/// like `license` or `type`. Maps are ordered so serialization is
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,

    #[serde(
        default,
        rename = "devDependencies",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub dev_dependencies: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scripts: BTreeMap<String, String>,

    /// Top-level keys the package manager does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PackageJson {
    /// Parse a manifest from a JSON string.
    pub fn from_str(content: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Read the manifest at `<dir>/package.json`.
    pub fn load(dir: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(dir.join(MANIFEST_FILE))?;
        Self::from_str(&content)
    }

    /// Write the manifest to `<dir>/package.json`, pretty-printed with
    /// two-space indentation and a trailing newline.
    pub fn save(&self, dir: &Path) -> Result<(), ManifestError> {
        let mut content = serde_json::to_string_pretty(self)?;
        content.push('\n');
        std::fs::write(dir.join(MANIFEST_FILE), content)?;
        Ok(())
    }

    /// All declared dependencies, production and development together.
    pub fn all_dependencies(&self) -> BTreeMap<String, String> {
        let mut all = self.dependencies.clone();
        all.extend(
            self.dev_dependencies
                .iter()
                .map(|(name, range)| (name.clone(), range.clone())),
        );
        all
    }

    /// Hex-encoded SHA-256 of the canonical serialization.
    ///
    /// Ordered maps make the serialization canonical, so the same manifest
    /// always hashes to the same value.
    pub fn canonical_hash(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(bytes))
    }
}
