//! Command Runner
//!
//! Executes shell command lines off the caller's thread and streams their
//! combined stdout/stderr back through a callback.
//! The shell interprets the command, so pipes and redirection are allowed.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::{CommandRequest, OutputEvent, RunOutcome};

/// The interpreter used to run command lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shell {
    /// Program name or path
    pub program: String,
    /// Arguments placed before the command line
    pub args: Vec<String>,
}

impl Shell {
    /// The platform shell: `cmd /C` on Windows, `sh -c` elsewhere
    pub fn system() -> Self {
        if cfg!(target_os = "windows") {
            Self::custom("cmd", ["/C"])
        } else {
            Self::custom("sh", ["-c"])
        }
    }

    pub fn custom<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Locate the shell binary
    fn resolve(&self) -> Result<PathBuf, CommandError> {
        let path = std::path::Path::new(&self.program);
        if path.is_absolute() || path.components().count() > 1 {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(CommandError::ShellNotFound(self.program.clone()));
        }
        CommandRunner::which(&self.program)
            .ok_or_else(|| CommandError::ShellNotFound(self.program.clone()))
    }
}

impl Default for Shell {
    fn default() -> Self {
        Self::system()
    }
}

/// Result of running a command to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Captured output text, in delivery order
    pub text: String,
    /// How the run ended
    pub outcome: RunOutcome,
}

/// Command runner errors
///
/// These never escape [`CommandRunner::execute`]; they become output text.
#[derive(Debug, Clone)]
pub enum CommandError {
    /// Shell binary not found
    ShellNotFound(String),
    /// Working directory does not exist
    WorkingDirMissing(PathBuf),
    /// Failed to launch process
    LaunchFailed(String),
    /// No Tokio runtime to run the worker on
    NoRuntime,
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::ShellNotFound(shell) => {
                write!(f, "Shell '{}' not found. Install it or add to PATH.", shell)
            }
            CommandError::WorkingDirMissing(dir) => {
                write!(f, "Working directory '{}' does not exist", dir.display())
            }
            CommandError::LaunchFailed(msg) => write!(f, "Failed to launch process: {}", msg),
            CommandError::NoRuntime => {
                write!(f, "No async runtime available to run commands")
            }
        }
    }
}

impl std::error::Error for CommandError {}

/// Handle to one in-flight execution
///
/// Dropping it does not stop the process; there is no cancellation.
#[derive(Debug)]
pub struct RunHandle {
    inner: RunState,
}

#[derive(Debug)]
enum RunState {
    Running(JoinHandle<RunOutcome>),
    /// Ended before a worker was started
    Done(RunOutcome),
}

impl RunHandle {
    fn done(outcome: RunOutcome) -> Self {
        Self {
            inner: RunState::Done(outcome),
        }
    }

    /// Wait until the sentinel has been delivered
    pub async fn wait(self) -> RunOutcome {
        let task = match self.inner {
            RunState::Running(task) => task,
            RunState::Done(outcome) => return outcome,
        };
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Command worker ended abnormally: {}", e);
                RunOutcome::Terminated
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        match &self.inner {
            RunState::Running(task) => task.is_finished(),
            RunState::Done(_) => true,
        }
    }
}

/// Command runner for shell command lines
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    /// Environment variables to add
    env_additions: HashMap<String, String>,
    /// Interpreter for command lines
    shell: Shell,
    /// Runtime to spawn workers on; the ambient runtime when `None`
    handle: Option<Handle>,
}

impl CommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_additions.insert(key.into(), value.into());
        self
    }

    /// Use a different interpreter
    pub fn with_shell(mut self, shell: Shell) -> Self {
        self.shell = shell;
        self
    }

    /// Spawn workers on `handle`, so `execute` can be called from threads
    /// outside any runtime
    pub fn with_handle(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn shell(&self) -> &Shell {
        &self.shell
    }

    /// The runtime workers will be spawned on
    pub fn runtime(&self) -> Result<Handle, CommandError> {
        match &self.handle {
            Some(handle) => Ok(handle.clone()),
            None => Handle::try_current().map_err(|_| CommandError::NoRuntime),
        }
    }

    /// Find a binary in PATH
    pub fn which(binary: &str) -> Option<PathBuf> {
        which::which(binary).ok()
    }

    /// Start `request` on a background worker and return immediately
    ///
    /// `on_output` receives every chunk in the order the process produced
    /// it on its stream, then exactly one [`OutputEvent::Finished`]. Spawn
    /// failures arrive as a single chunk holding the error message.
    ///
    /// Without an explicit runtime handle the ambient runtime is used. With
    /// neither, the error is delivered inline before this returns.
    pub fn execute<F>(&self, request: &CommandRequest, mut on_output: F) -> RunHandle
    where
        F: FnMut(OutputEvent) + Send + 'static,
    {
        let runtime = match self.runtime() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::warn!("Cannot run '{}': {}", request.command(), e);
                on_output(OutputEvent::Chunk(format!("{}\n", e)));
                on_output(OutputEvent::Finished(RunOutcome::SpawnFailed));
                return RunHandle::done(RunOutcome::SpawnFailed);
            }
        };

        let request = request.clone();
        let shell = self.shell.clone();
        let env = self.env_additions.clone();

        let task = async move {
            let outcome = match spawn_shell(&shell, &env, &request) {
                Ok(child) => {
                    tracing::debug!("Running: {}", request);
                    stream_output(child, &mut on_output).await
                }
                Err(e) => {
                    tracing::warn!("Failed to start '{}': {}", request.command(), e);
                    on_output(OutputEvent::Chunk(format!("{}\n", e)));
                    RunOutcome::SpawnFailed
                }
            };

            tracing::debug!("Finished: {} ({:?})", request.command(), outcome);
            on_output(OutputEvent::Finished(outcome));
            outcome
        };

        RunHandle {
            inner: RunState::Running(runtime.spawn(task)),
        }
    }

    /// Start `request` and deliver its events over a channel instead of a
    /// callback
    pub fn execute_channel(
        &self,
        request: &CommandRequest,
    ) -> (RunHandle, mpsc::UnboundedReceiver<OutputEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.execute(request, move |event| {
            let _ = tx.send(event);
        });
        (handle, rx)
    }

    /// Run `request` to completion and collect its output
    pub async fn run(&self, request: &CommandRequest) -> CommandResult {
        let (handle, mut rx) = self.execute_channel(request);

        let mut text = String::new();
        let mut outcome = RunOutcome::Terminated;
        while let Some(event) = rx.recv().await {
            match event {
                OutputEvent::Chunk(chunk) => text.push_str(&chunk),
                OutputEvent::Finished(o) => outcome = o,
            }
        }
        let _ = handle.wait().await;

        CommandResult { text, outcome }
    }
}

/// Launch the shell with stdout and stderr piped
fn spawn_shell(
    shell: &Shell,
    env: &HashMap<String, String>,
    request: &CommandRequest,
) -> Result<Child, CommandError> {
    let program = shell.resolve()?;

    let mut cmd = Command::new(&program);
    cmd.args(&shell.args);
    cmd.arg(request.command());

    if let Some(dir) = request.working_dir() {
        if !dir.is_dir() {
            return Err(CommandError::WorkingDirMissing(dir.to_path_buf()));
        }
        cmd.current_dir(dir);
    }

    for (k, v) in env {
        cmd.env(k, v);
    }

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    cmd.spawn()
        .map_err(|e| CommandError::LaunchFailed(e.to_string()))
}

/// Forward both pipes to `on_output` until they close, then reap the child
async fn stream_output<F>(mut child: Child, on_output: &mut F) -> RunOutcome
where
    F: FnMut(OutputEvent),
{
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let readers = {
        let tx_err = tx.clone();
        async move {
            tokio::join!(forward_lines(stdout, tx), forward_lines(stderr, tx_err));
        }
    };

    let consumer = async {
        while let Some(chunk) = rx.recv().await {
            on_output(OutputEvent::Chunk(chunk));
        }
    };

    tokio::join!(readers, consumer);

    match child.wait().await {
        Ok(status) => match status.code() {
            Some(code) => RunOutcome::Exited(code),
            None => RunOutcome::Terminated,
        },
        Err(e) => {
            tracing::warn!("Failed to wait for process: {}", e);
            RunOutcome::Terminated
        }
    }
}

/// Read `reader` line by line, keeping line endings
async fn forward_lines<R>(reader: Option<R>, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return;
    };

    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if tx.send(String::from_utf8_lossy(&buf).into_owned()).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!("Output pipe read failed: {}", e);
                break;
            }
        }
    }
}
