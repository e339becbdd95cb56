//! `shellcommand run` - run a command into a terminal-backed destination

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};

use shellcommand::core::{
    ExitStatusPolicy, InvocationConfig, InvocationError, OutputTarget, RunOutcome,
};
use shellcommand::host::EditorContext;
use shellcommand::settings::{Settings, SettingsError};
use shellcommand::sink::{MemorySurface, Surface, SurfaceError, SurfaceFactory};
use shellcommand::ShellCommand;

use super::exit_codes;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Command line to run; prompts when omitted
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Text placed before the command
    #[arg(long)]
    pub prefix: Option<String>,

    /// Prompt label used when no command is given
    #[arg(long)]
    pub prompt: Option<String>,

    /// Selected text; may be repeated
    #[arg(long = "selection", value_name = "TEXT")]
    pub selections: Vec<String>,

    /// Append the selection to the command
    #[arg(long)]
    pub region: bool,

    /// Refuse to run when the selection is empty (implies --region)
    #[arg(long)]
    pub arg_required: bool,

    /// Write to the output panel instead of a new document
    #[arg(long)]
    pub panel: bool,

    /// Title of the output document
    #[arg(long)]
    pub title: Option<String>,

    /// Syntax hint for the output
    #[arg(long)]
    pub syntax: Option<String>,

    /// Working directory for the command
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Refresh the output this many times after the first run
    #[arg(long, default_value_t = 0)]
    pub repeat: u32,

    /// Append the exit status of failing commands
    #[arg(long)]
    pub show_exit_status: bool,

    /// Show a placeholder when the command prints nothing
    #[arg(long)]
    pub no_output_message: bool,

    /// Keep ANSI escape sequences
    #[arg(long)]
    pub raw: bool,
}

impl RunArgs {
    fn invocation_config(&self) -> anyhow::Result<InvocationConfig> {
        let command = if self.command.is_empty() {
            None
        } else {
            Some(self.command.join(" "))
        };

        let working_dir = match &self.cwd {
            Some(dir) if dir.is_relative() => Some(std::env::current_dir()?.join(dir)),
            other => other.clone(),
        };

        Ok(InvocationConfig {
            command,
            command_prefix: self.prefix.clone(),
            prompt: self.prompt.clone(),
            region: self.region || self.arg_required,
            arg_required: self.arg_required,
            target: if self.panel {
                OutputTarget::Panel
            } else {
                OutputTarget::NewDocument
            },
            title: self.title.clone(),
            syntax: self.syntax.clone(),
            refresh: false,
            working_dir,
        })
    }

    fn apply(&self, settings: &mut Settings) {
        if self.show_exit_status {
            settings.exit_status = ExitStatusPolicy::Annotate;
        }
        if self.no_output_message {
            settings.show_success_but_no_output_message = true;
        }
        if self.raw {
            settings.strip_ansi = false;
        }
    }
}

/// Terminal stand-in for the editor
struct TerminalEditor {
    selections: Vec<String>,
}

#[async_trait]
impl EditorContext for TerminalEditor {
    fn selections(&self) -> Vec<String> {
        self.selections.clone()
    }

    fn working_dir(&self) -> Option<PathBuf> {
        None
    }

    async fn prompt(&self, label: &str, initial: &str) -> Option<String> {
        eprint!("{}: {}", label, initial);
        let _ = std::io::stderr().flush();

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        match lines.next_line().await {
            Ok(Some(line)) => Some(format!("{}{}", initial, line)),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Failed to read command: {}", e);
                None
            }
        }
    }

    fn message_dialog(&self, message: &str) {
        eprintln!("{}", message);
    }
}

/// Memory surface that echoes inserted text to stdout
struct TerminalSurface {
    inner: MemorySurface,
    label: String,
}

impl TerminalSurface {
    fn new(label: impl Into<String>) -> Self {
        Self {
            inner: MemorySurface::new(),
            label: label.into(),
        }
    }
}

impl Surface for TerminalSurface {
    fn set_title(&mut self, title: &str) {
        self.label = title.to_string();
        self.inner.set_title(title);
    }

    fn set_syntax(&mut self, syntax: Option<&str>) {
        self.inner.set_syntax(syntax);
    }

    fn set_scratch(&mut self, scratch: bool) {
        self.inner.set_scratch(scratch);
    }

    fn set_read_only(&mut self, read_only: bool) {
        self.inner.set_read_only(read_only);
    }

    fn is_read_only(&self) -> bool {
        self.inner.is_read_only()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn insert(&mut self, pos: usize, text: &str) -> Result<(), SurfaceError> {
        self.inner.insert(pos, text)?;
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
        Ok(())
    }

    fn clear(&mut self) -> Result<(), SurfaceError> {
        self.inner.clear()?;
        eprintln!("--- {} ---", self.label);
        Ok(())
    }

    fn text(&self) -> String {
        self.inner.text()
    }
}

struct TerminalSurfaceFactory;

impl SurfaceFactory for TerminalSurfaceFactory {
    fn new_document(&self) -> Box<dyn Surface> {
        Box::new(TerminalSurface::new("output"))
    }

    fn panel(&self, name: &str) -> Box<dyn Surface> {
        Box::new(TerminalSurface::new(name))
    }

    fn show_panel(&self, name: &str) {
        tracing::debug!("Showing panel {}", name);
    }

    fn find_syntax(&self, hint: &str) -> Option<String> {
        // No highlighting on a terminal; accept the hint as-is
        Some(hint.to_string())
    }
}

/// Exit code for an invocation that never started; the editor already showed it
fn exit_code_for_error(error: &InvocationError) -> i32 {
    match error {
        InvocationError::Sink(_) => exit_codes::UNEXPECTED_FAILURE,
        _ => exit_codes::INVALID_INPUT,
    }
}

fn exit_code_for(outcome: RunOutcome) -> i32 {
    match outcome {
        RunOutcome::Exited(code) => code,
        RunOutcome::SpawnFailed => exit_codes::SPAWN_FAILED,
        RunOutcome::Terminated => exit_codes::UNEXPECTED_FAILURE,
    }
}

/// Run the command, refresh it `--repeat` times, and return the exit code
pub async fn run(args: RunArgs) -> anyhow::Result<i32> {
    let mut settings = match Settings::load() {
        Ok(settings) => settings,
        Err(SettingsError::NoConfigDir) => Settings::default(),
        Err(e) => return Err(e.into()),
    };
    args.apply(&mut settings);

    let config = args.invocation_config()?;
    let editor = TerminalEditor {
        selections: args.selections.clone(),
    };

    let sc = ShellCommand::new(settings, Arc::new(TerminalSurfaceFactory));

    let invocation = match sc.run(&config, &editor, None).await {
        Ok(Some(invocation)) => invocation,
        Ok(None) => return Ok(exit_codes::CANCELLED),
        Err(e) => return Ok(exit_code_for_error(&e)),
    };

    let destination = invocation.destination;
    let mut outcome = invocation.handle.wait().await;

    for _ in 0..args.repeat {
        match sc.refresh(destination)? {
            Some(handle) => outcome = handle.wait().await,
            None => break,
        }
    }

    sc.close(destination)?;
    Ok(exit_code_for(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(command: &[&str]) -> RunArgs {
        RunArgs {
            command: command.iter().map(|s| s.to_string()).collect(),
            prefix: None,
            prompt: None,
            selections: Vec::new(),
            region: false,
            arg_required: false,
            panel: false,
            title: None,
            syntax: None,
            cwd: None,
            repeat: 0,
            show_exit_status: false,
            no_output_message: false,
            raw: false,
        }
    }

    #[test]
    fn test_command_words_joined() {
        let config = args(&["ls", "-la", "|", "wc", "-l"]).invocation_config().unwrap();
        assert_eq!(config.command.as_deref(), Some("ls -la | wc -l"));
        assert_eq!(config.target, OutputTarget::NewDocument);
    }

    #[test]
    fn test_no_command_prompts() {
        let config = args(&[]).invocation_config().unwrap();
        assert!(config.command.is_none());
    }

    #[test]
    fn test_arg_required_implies_region() {
        let mut run_args = args(&["grep"]);
        run_args.arg_required = true;
        run_args.panel = true;
        let config = run_args.invocation_config().unwrap();
        assert!(config.region);
        assert!(config.validate().is_ok());
        assert_eq!(config.target, OutputTarget::Panel);
    }

    #[test]
    fn test_relative_cwd_made_absolute() {
        let mut run_args = args(&["ls"]);
        run_args.cwd = Some(PathBuf::from("sub"));
        let config = run_args.invocation_config().unwrap();
        assert!(config.working_dir.unwrap().is_absolute());
    }

    #[test]
    fn test_flags_override_settings() {
        let mut run_args = args(&["ls"]);
        run_args.show_exit_status = true;
        run_args.no_output_message = true;
        run_args.raw = true;

        let mut settings = Settings::default();
        run_args.apply(&mut settings);
        assert_eq!(settings.exit_status, ExitStatusPolicy::Annotate);
        assert!(settings.show_success_but_no_output_message);
        assert!(!settings.strip_ansi);
    }

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(exit_code_for(RunOutcome::Exited(0)), exit_codes::SUCCESS);
        assert_eq!(exit_code_for(RunOutcome::Exited(42)), 42);
        assert_eq!(exit_code_for(RunOutcome::SpawnFailed), exit_codes::SPAWN_FAILED);
    }

    #[test]
    fn test_error_exit_codes() {
        use shellcommand::sink::{DestinationId, SinkError};

        assert_eq!(
            exit_code_for_error(&InvocationError::ParameterRequired),
            exit_codes::INVALID_INPUT
        );
        assert_eq!(
            exit_code_for_error(&InvocationError::Sink(SinkError::NoRuntime)),
            exit_codes::UNEXPECTED_FAILURE
        );
        let unknown: DestinationId = serde_json::from_str("7").unwrap();
        assert_eq!(
            exit_code_for_error(&InvocationError::Sink(SinkError::UnknownDestination(unknown))),
            exit_codes::UNEXPECTED_FAILURE
        );
    }
}
