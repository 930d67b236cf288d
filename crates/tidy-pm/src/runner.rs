//! Script execution
//!
//! Runs a script from the project manifest through the platform shell,
//! with the project's `.bin` directory prepended to the lookup path so
//! installed executables resolve first.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::debug;

use crate::bin;
use crate::manifest::PackageJson;
use crate::paths;

/// Errors that can occur while running a script
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The manifest declares no scripts at all
    #[error("No scripts defined in package.json")]
    NoScripts,

    /// The requested script is missing
    #[error("Script '{name}' not found in package.json (available: {})", .available.join(", "))]
    ScriptNotFound { name: String, available: Vec<String> },

    /// PATH could not be recomposed
    #[error("Failed to compose PATH: {0}")]
    Path(#[from] env::JoinPathsError),

    /// The shell could not be spawned
    #[error("Failed to launch script: {0}")]
    Io(#[from] std::io::Error),

    /// The script ran and exited non-zero
    #[error("Script exited with status {0}")]
    ExitStatus(i32),
}

/// Runs project scripts.
pub struct ScriptRunner {
    project_root: PathBuf,
    manifest: PackageJson,
}

impl ScriptRunner {
    /// Create a runner for a project.
    pub fn new(project_root: &Path, manifest: PackageJson) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            manifest,
        }
    }

    /// Names of the available scripts.
    pub fn scripts(&self) -> Vec<String> {
        self.manifest.scripts.keys().cloned().collect()
    }

    /// Run `script_name` and wait for it to finish.
    ///
    /// The child inherits the parent's standard streams and environment,
    /// with `node_modules/.bin` prepended to PATH. A non-zero exit is an
    /// error carrying the child's status code.
    pub fn run(&self, script_name: &str) -> Result<(), RunnerError> {
        if self.manifest.scripts.is_empty() {
            return Err(RunnerError::NoScripts);
        }

        let command = self.manifest.scripts.get(script_name).ok_or_else(|| {
            RunnerError::ScriptNotFound {
                name: script_name.to_string(),
                available: self.scripts(),
            }
        })?;

        // Relink best-effort: stale links still beat missing ones.
        if paths::node_modules(&self.project_root).exists() {
            if let Err(err) = bin::link_binaries(&self.project_root) {
                debug!(%err, "binary linking before script run failed");
            }
        }

        let status = shell_command(command)
            .current_dir(&self.project_root)
            .env("PATH", self.lookup_path()?)
            .status()?;

        if status.success() {
            Ok(())
        } else {
            Err(RunnerError::ExitStatus(status.code().unwrap_or(-1)))
        }
    }

    /// PATH with the project `.bin` directory prepended.
    fn lookup_path(&self) -> Result<std::ffi::OsString, env::JoinPathsError> {
        let mut entries = vec![paths::bin_dir(&self.project_root)];
        if let Some(existing) = env::var_os("PATH") {
            entries.extend(env::split_paths(&existing));
        }
        env::join_paths(entries)
    }
}

/// Platform shell invocation for a script string.
#[cfg(not(windows))]
fn shell_command(script: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(script);
    command
}

#[cfg(windows)]
fn shell_command(script: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(script);
    command
}
