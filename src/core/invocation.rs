//! Invocation configuration
//!
//! Every optional parameter an editor command can pass is collected in
//! [`InvocationConfig`] and validated once, before anything runs.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sink::{DestinationId, SinkError};

/// Message shown when a region argument is required but nothing is selected
pub const PARAMETER_REQUIRED_MESSAGE: &str = "This command requires a parameter.";

/// Errors detected before a process is spawned
///
/// Hosts show these to the user as a dialog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationError {
    #[error("No command provided.")]
    MissingCommand,

    #[error("{}", PARAMETER_REQUIRED_MESSAGE)]
    ParameterRequired,

    #[error("Working directory must be absolute: {0}")]
    RelativeWorkingDir(String),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Where command output is rendered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputTarget {
    /// A fresh scratch document per invocation
    #[default]
    NewDocument,
    /// The reusable output panel
    Panel,
    /// A destination the caller already owns; it is not reconfigured
    Existing(DestinationId),
}

/// Parameters for one shell command invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvocationConfig {
    /// Command text; `None` prompts the user
    pub command: Option<String>,
    /// Prepended to the command with a single space; ignored when blank
    pub command_prefix: Option<String>,
    /// Prompt label; `None` uses the configured default
    pub prompt: Option<String>,
    /// Append the selected text to the command
    pub region: bool,
    /// With `region`, refuse to run on an empty selection; no effect without it
    pub arg_required: bool,
    /// Output destination
    pub target: OutputTarget,
    /// Document title; `None` uses the configured default
    pub title: Option<String>,
    /// Syntax hint for the output
    pub syntax: Option<String>,
    /// Refresh the originating destination once the run completes
    pub refresh: bool,
    /// Working directory override; `None` asks the editor
    pub working_dir: Option<PathBuf>,
}

impl InvocationConfig {
    /// Config that runs `command` in a new document
    pub fn command(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            ..Self::default()
        }
    }

    /// Config for the "run on region" variant: selection appended, and required
    pub fn on_region(mut self) -> Self {
        self.region = true;
        self.arg_required = true;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.command_prefix = Some(prefix.into());
        self
    }

    pub fn with_target(mut self, target: OutputTarget) -> Self {
        self.target = target;
        self
    }

    pub fn in_panel(self) -> Self {
        self.with_target(OutputTarget::Panel)
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_syntax(mut self, syntax: impl Into<String>) -> Self {
        self.syntax = Some(syntax.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    /// Check the parameter combination once, at the boundary
    pub fn validate(&self) -> Result<(), InvocationError> {
        if let Some(command) = &self.command {
            if command.trim().is_empty() {
                return Err(InvocationError::MissingCommand);
            }
        }

        if let Some(dir) = &self.working_dir {
            if !dir.is_absolute() {
                return Err(InvocationError::RelativeWorkingDir(
                    dir.display().to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Work out the region argument from the selection text
    ///
    /// Returns `Ok(None)` when regions are not in use.
    pub fn region_argument(&self, selection: &str) -> Result<Option<String>, InvocationError> {
        if !self.region {
            return Ok(None);
        }

        let arg = selection.trim();
        if arg.is_empty() {
            if self.arg_required {
                return Err(InvocationError::ParameterRequired);
            }
            // Optional and empty: the separator is still appended
            return Ok(Some(String::new()));
        }

        Ok(Some(arg.to_string()))
    }

    /// Build the final command line from the typed/configured command
    pub fn compose(&self, command: &str, arg: Option<&str>) -> String {
        let mut line = match self.command_prefix.as_deref().map(str::trim) {
            Some(prefix) if !prefix.is_empty() => format!("{} {}", prefix, command),
            _ => command.to_string(),
        };

        if let Some(arg) = arg {
            line.push(' ');
            line.push_str(arg);
        }

        line
    }
}

/// Join the text of several selections the way they are passed to commands
pub fn join_selections<S: AsRef<str>>(selections: &[S]) -> String {
    let mut value = String::new();
    for selection in selections {
        value.push(' ');
        value.push_str(selection.as_ref());
    }
    value
}
