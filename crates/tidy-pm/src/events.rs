//! Progress events
//!
//! The resolver and installer report what they are doing through a
//! `Progress` sink. Front-ends (the CLI, a TUI, tests) decide how to
//! render the stream; the core never prints.

/// A progress event emitted during resolution or installation.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Resolution started with this many root dependencies.
    ResolveStarted { roots: usize },

    /// Resolution finished with a flat set of this size.
    Resolved { packages: usize, from_cache: bool },

    /// A manifest fetch failed; the subtree was dropped.
    FetchFailed {
        name: String,
        range: String,
        message: String,
    },

    /// A package install began.
    Installing { name: String, version: String },

    /// A package was materialized into the project.
    Installed { name: String, version: String },

    /// A package was already present and left untouched.
    Skipped { name: String, version: String },

    /// A package failed to install; siblings continue.
    InstallFailed { name: String, message: String },
}

/// Consumer of progress events.
pub trait Progress: Send + Sync {
    fn event(&self, event: &Event);
}

/// Sink that discards every event.
pub struct NullProgress;

impl Progress for NullProgress {
    fn event(&self, _event: &Event) {}
}
