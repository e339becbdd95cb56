//! Command-line interface
//!
//! A terminal host for the shell command controller: output documents are
//! echoed to stdout as they fill, prompts and dialogs use the terminal.

pub mod config;
pub mod run;

use clap::{Parser, Subcommand};

/// Process exit codes
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const UNEXPECTED_FAILURE: i32 = 1;
    /// Missing command, missing required parameter, bad flags
    pub const INVALID_INPUT: i32 = 2;
    /// The shell could not be started
    pub const SPAWN_FAILED: i32 = 3;
    /// The command prompt was cancelled
    pub const CANCELLED: i32 = 4;
}

#[derive(Debug, Parser)]
#[command(name = "shellcommand", version, about = "Run shell commands and capture their output")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true, env = "SHELLCOMMAND_VERBOSE")]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long = "json-output", global = true)]
    pub json_output: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a command and stream its output
    Run(run::RunArgs),
    /// Inspect or create the settings file
    Config(config::ConfigArgs),
}
