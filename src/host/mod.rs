//! Host module for process execution and editor capabilities

pub mod command_runner;
pub mod editor;

pub use command_runner::{CommandError, CommandResult, CommandRunner, RunHandle, Shell};
pub use editor::EditorContext;
