//! ShellCommand - run shell commands from an editor and stream their output
//! into scratch documents or a reusable panel
//!
//! - [`host::CommandRunner`] executes command lines on a background worker
//!   and streams output chunks followed by a completion sentinel
//! - [`sink::OutputSinks`] owns output destinations, the request each one can
//!   replay, and the generation counter that drops output from superseded runs
//! - [`ShellCommand`] ties an [`core::InvocationConfig`] to both

pub mod core;
pub mod host;
pub mod logging;
pub mod settings;
pub mod shell_command;
pub mod sink;

pub use shell_command::{Invocation, ShellCommand};
