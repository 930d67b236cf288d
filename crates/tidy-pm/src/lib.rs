//! Tidy package manager core
//!
//! This crate provides the machinery behind the `tidy` CLI:
//! - Project manifest parsing (package.json) with lossless rewrite
//! - Version range narrowing to registry-fetchable tags
//! - A two-tier (memory + disk) registry manifest cache
//! - Concurrent dependency resolution into a flat set
//! - A per-user content-addressed store of extracted packages
//! - Hard-link materialization into project trees
//! - Executable linking and script running
//! - Source scanning for undeclared imports

pub mod bin;
pub mod cache;
pub mod events;
pub mod installer;
pub mod manifest;
pub mod paths;
pub mod registry;
pub mod resolver;
pub mod runner;
pub mod scanner;
pub mod snapshot;
pub mod store;
pub mod sync;
pub mod version;

pub use cache::{CacheError, ManifestCache};
pub use events::{Event, NullProgress, Progress};
pub use installer::{InstallError, InstallReport, Installer};
pub use manifest::{ManifestError, PackageJson};
pub use registry::{Bin, Dist, Manifest, RegistryClient, RegistryError};
pub use resolver::{ResolutionSet, ResolveError, ResolvedPackage, Resolver};
pub use runner::{RunnerError, ScriptRunner};
pub use scanner::{ScanError, ScanReport};
pub use snapshot::Snapshot;
pub use store::{ExtractError, Fetched, Store, StoreError};
