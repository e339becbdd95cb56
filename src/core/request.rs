//! Command request - the persisted `{command, working_dir}` pair used to
//! re-run a command when its output destination is refreshed

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building a [`CommandRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("No command provided.")]
    EmptyCommand,

    #[error("Working directory must be absolute: {0}")]
    RelativeWorkingDir(String),
}

/// A re-runnable unit of work
///
/// Immutable once built. An empty working directory means the process
/// inherits the caller's current directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandRequest {
    command: String,
    #[serde(default)]
    working_dir: String,
}

impl CommandRequest {
    /// Create a request, validating the command text and working directory
    pub fn new(
        command: impl Into<String>,
        working_dir: impl Into<String>,
    ) -> Result<Self, RequestError> {
        let command = command.into();
        if command.trim().is_empty() {
            return Err(RequestError::EmptyCommand);
        }

        let working_dir = working_dir.into();
        if !working_dir.is_empty() && !Path::new(&working_dir).is_absolute() {
            return Err(RequestError::RelativeWorkingDir(working_dir));
        }

        Ok(Self {
            command,
            working_dir,
        })
    }

    /// Create a request that inherits the current directory
    pub fn inherit(command: impl Into<String>) -> Result<Self, RequestError> {
        Self::new(command, String::new())
    }

    /// Create a request from an optional directory path
    pub fn in_dir(command: impl Into<String>, dir: Option<&Path>) -> Result<Self, RequestError> {
        let working_dir = dir
            .map(|d| d.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::new(command, working_dir)
    }

    /// The command line handed to the shell
    pub fn command(&self) -> &str {
        &self.command
    }

    /// The working directory, or `None` to inherit
    pub fn working_dir(&self) -> Option<&Path> {
        if self.working_dir.is_empty() {
            None
        } else {
            Some(Path::new(&self.working_dir))
        }
    }
}

impl std::fmt::Display for CommandRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.working_dir() {
            Some(dir) => write!(f, "{} (in {})", self.command, dir.display()),
            None => write!(f, "{}", self.command),
        }
    }
}

/// Work out a working directory for a command the way an editor would
///
/// Order: the directory of the active file, then the directory of the
/// project file, then the first open folder. `None` means inherit.
pub fn resolve_working_dir(
    file_name: Option<&Path>,
    project_file: Option<&Path>,
    folders: &[PathBuf],
) -> Option<PathBuf> {
    let parent_of = |p: &Path| -> Option<PathBuf> {
        let absolute = if p.is_absolute() {
            p.to_path_buf()
        } else {
            std::env::current_dir().ok()?.join(p)
        };
        absolute.parent().map(Path::to_path_buf)
    };

    file_name
        .and_then(parent_of)
        .or_else(|| project_file.and_then(parent_of))
        .or_else(|| folders.first().cloned())
}
