//! Editor capabilities the shell command controller calls into
//!
//! The text buffer model, selection expansion and dialogs belong to the host
//! editor; this trait is the seam between them and the controller.

use std::path::PathBuf;

use async_trait::async_trait;

/// Host editor services available to a shell command invocation
#[async_trait]
pub trait EditorContext: Send + Sync {
    /// Text of each selection, already expanded by the host
    fn selections(&self) -> Vec<String>;

    /// Directory the command should run in; `None` inherits
    fn working_dir(&self) -> Option<PathBuf>;

    /// Ask the user for a command line. `None` means cancelled.
    async fn prompt(&self, label: &str, initial: &str) -> Option<String>;

    /// Show a blocking message to the user
    fn message_dialog(&self, message: &str);

    /// Show a transient informational message
    fn status_message(&self, message: &str) {
        tracing::info!("{}", message);
    }
}
