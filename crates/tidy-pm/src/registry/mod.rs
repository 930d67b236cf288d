//! Registry access
//!
//! Wire types and the HTTP client for the package registry.

mod api;
mod client;

pub use api::{Bin, Dist, Manifest};
pub use client::{RegistryClient, RegistryError, DEFAULT_REGISTRY};
