//! ShellCommand - run shell commands and capture their output
//!
//! Terminal host for the `shellcommand` library:
//! - `shellcommand run <command>` streams output, optionally refreshing it
//! - `shellcommand config` manages the settings file

mod cli;

use clap::Parser;
use cli::{exit_codes, Cli, Commands};

use shellcommand::logging;

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let cli = Cli::parse();

    // Initialize logging
    if let Err(e) = logging::init(cli.verbose, cli.json_output) {
        eprintln!("Failed to initialize logging: {}", e);
        return exit_codes::UNEXPECTED_FAILURE;
    }

    // Create tokio runtime for command workers
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create runtime: {}", e);
            return exit_codes::UNEXPECTED_FAILURE;
        }
    };

    match cli.command {
        Commands::Run(args) => rt.block_on(async {
            match cli::run::run(args).await {
                Ok(code) => code,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    categorize_error(&e)
                }
            }
        }),
        Commands::Config(args) => rt.block_on(async {
            match cli::config::run(args).await {
                Ok(()) => exit_codes::SUCCESS,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    categorize_error(&e)
                }
            }
        }),
    }
}

/// Categorize an error into the appropriate exit code
fn categorize_error(e: &anyhow::Error) -> i32 {
    let msg = e.to_string().to_lowercase();

    if msg.contains("invalid") || msg.contains("already exists") || msg.contains("must be") {
        exit_codes::INVALID_INPUT
    } else {
        exit_codes::UNEXPECTED_FAILURE
    }
}
