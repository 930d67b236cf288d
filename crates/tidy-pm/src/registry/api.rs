//! Registry wire types
//!
//! Response shapes for the npm-compatible registry. Only the fields the
//! package manager consumes are modeled; unknown fields are ignored.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-version manifest served by the registry.
///
/// Response from `GET /{name}/{version-tag}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Package name
    pub name: String,

    /// Exact resolved semantic version
    pub version: String,

    /// Distribution information
    #[serde(default)]
    pub dist: Dist,

    /// Runtime dependencies (name -> range string)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,

    /// Declared executables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin: Option<Bin>,
}

/// Tarball location and integrity data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dist {
    /// Download URL for the gzipped tarball
    #[serde(default)]
    pub tarball: String,

    /// Registry-reported digest of the tarball
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub shasum: String,

    /// Unpacked size in bytes, when the registry reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// The `bin` field of a package manifest.
///
/// A bare string declares a single executable named after the package; the
/// map form names each executable explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bin {
    /// Single executable, link name taken from the package name
    Single(String),

    /// Named executables (link name -> relative path)
    Named(BTreeMap<String, String>),
}
