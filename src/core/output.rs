//! Output stream model - chunks of process output terminated by a sentinel

use serde::{Deserialize, Serialize};

/// Placeholder shown when a command succeeds without printing anything
pub const DEFAULT_NO_OUTPUT_MESSAGE: &str = "Shell command succeeded with no output";

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The process exited with a status code
    Exited(i32),
    /// The process ended without a status code (killed by a signal)
    Terminated,
    /// The process could not be started
    SpawnFailed,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Exited(0))
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            RunOutcome::Exited(code) => Some(*code),
            _ => None,
        }
    }
}

/// One item of the output-delivery contract
///
/// A run delivers zero or more `Chunk`s followed by exactly one `Finished`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Chunk(String),
    Finished(RunOutcome),
}

impl OutputEvent {
    pub fn is_sentinel(&self) -> bool {
        matches!(self, OutputEvent::Finished(_))
    }
}

/// Whether the exit status is made visible in the destination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatusPolicy {
    /// A failing command shows only what it printed
    #[default]
    Silent,
    /// Non-zero exits get a trailing status line
    Annotate,
}

impl ExitStatusPolicy {
    /// Text to append for the given outcome, if any
    pub fn annotation(&self, outcome: RunOutcome) -> Option<String> {
        match (self, outcome) {
            (ExitStatusPolicy::Silent, _) => None,
            (ExitStatusPolicy::Annotate, RunOutcome::Exited(0)) => None,
            (ExitStatusPolicy::Annotate, RunOutcome::Exited(code)) => {
                Some(format!("\n[exited with status {}]\n", code))
            }
            (ExitStatusPolicy::Annotate, RunOutcome::Terminated) => {
                Some("\n[terminated]\n".to_string())
            }
            // The spawn error text is already in the output
            (ExitStatusPolicy::Annotate, RunOutcome::SpawnFailed) => None,
        }
    }
}

/// Placeholder policy for runs that finish without any output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoOutputPolicy {
    pub show_message: bool,
    pub message: String,
}

impl NoOutputPolicy {
    /// The placeholder to insert, if enabled
    pub fn placeholder(&self) -> Option<&str> {
        if self.show_message && !self.message.is_empty() {
            Some(&self.message)
        } else {
            None
        }
    }
}

impl Default for NoOutputPolicy {
    fn default() -> Self {
        Self {
            show_message: false,
            message: DEFAULT_NO_OUTPUT_MESSAGE.to_string(),
        }
    }
}
