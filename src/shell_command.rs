//! Shell command controller
//!
//! Turns an [`InvocationConfig`] into a running command whose output lands in
//! an output destination, and re-runs destinations on refresh.

use std::sync::Arc;

use tokio::runtime::Handle;

use crate::core::{
    join_selections, CommandRequest, InvocationConfig, InvocationError, OutputTarget,
    RequestError,
};
use crate::host::{CommandRunner, EditorContext, RunHandle};
use crate::settings::Settings;
use crate::sink::{DestinationId, DestinationKind, OutputSinks, SinkError, SurfaceFactory};

/// A started command
#[derive(Debug)]
pub struct Invocation {
    /// Where the output goes
    pub destination: DestinationId,
    /// What was run, as stored for refresh
    pub request: CommandRequest,
    /// Completes after the sentinel has been applied
    pub handle: RunHandle,
}

/// Runs shell commands into output destinations
#[derive(Debug, Clone)]
pub struct ShellCommand {
    runner: CommandRunner,
    sinks: OutputSinks,
    settings: Settings,
}

impl ShellCommand {
    /// Build a controller from settings
    ///
    /// When called inside a Tokio runtime, the runner is bound to it so
    /// `start` and `refresh` also work from the host's own threads.
    pub fn new(settings: Settings, factory: Arc<dyn SurfaceFactory>) -> Self {
        let runner = match Handle::try_current() {
            Ok(handle) => settings.runner().with_handle(handle),
            Err(_) => settings.runner(),
        };
        Self {
            runner,
            sinks: OutputSinks::new(factory).with_options(settings.delivery_options()),
            settings,
        }
    }

    /// Replace the runner (e.g. to bind it to a specific runtime)
    pub fn with_runner(mut self, runner: CommandRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn runner(&self) -> &CommandRunner {
        &self.runner
    }

    pub fn sinks(&self) -> &OutputSinks {
        &self.sinks
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run a command as configured
    ///
    /// Missing input is reported through `editor.message_dialog` and
    /// returned as an error before anything is spawned. A cancelled prompt
    /// returns `Ok(None)`. `origin` is the destination the command was
    /// invoked from; it is refreshed afterwards when `config.refresh` is set.
    pub async fn run(
        &self,
        config: &InvocationConfig,
        editor: &dyn EditorContext,
        origin: Option<DestinationId>,
    ) -> Result<Option<Invocation>, InvocationError> {
        let result = self.prepare(config, editor).await;

        let request = match result {
            Ok(Some(request)) => request,
            Ok(None) => {
                tracing::debug!("Command prompt cancelled");
                return Ok(None);
            }
            Err(e) => {
                editor.message_dialog(&e.to_string());
                return Err(e);
            }
        };

        match self.start(config, request, origin) {
            Ok(invocation) => {
                editor.status_message(&format!("Running: {}", invocation.request.command()));
                Ok(Some(invocation))
            }
            Err(e) => {
                editor.message_dialog(&e.to_string());
                Err(e)
            }
        }
    }

    /// Run with the selection appended and required
    pub async fn run_on_region(
        &self,
        config: &InvocationConfig,
        editor: &dyn EditorContext,
        origin: Option<DestinationId>,
    ) -> Result<Option<Invocation>, InvocationError> {
        let config = config.clone().on_region();
        self.run(&config, editor, origin).await
    }

    /// Validate the config and build the request, prompting if needed
    async fn prepare(
        &self,
        config: &InvocationConfig,
        editor: &dyn EditorContext,
    ) -> Result<Option<CommandRequest>, InvocationError> {
        config.validate()?;

        let arg = config.region_argument(&join_selections(&editor.selections()))?;

        let command = match &config.command {
            Some(command) => command.clone(),
            None => {
                let label = config
                    .prompt
                    .as_deref()
                    .unwrap_or(&self.settings.default_prompt);
                match editor.prompt(label, "").await {
                    Some(typed) if typed.trim().is_empty() => {
                        return Err(InvocationError::MissingCommand)
                    }
                    Some(typed) => typed,
                    None => return Ok(None),
                }
            }
        };

        let line = config.compose(&command, arg.as_deref());
        let working_dir = config.working_dir.clone().or_else(|| editor.working_dir());

        CommandRequest::in_dir(line, working_dir.as_deref())
            .map(Some)
            .map_err(|e| match e {
                RequestError::EmptyCommand => InvocationError::MissingCommand,
                RequestError::RelativeWorkingDir(dir) => InvocationError::RelativeWorkingDir(dir),
            })
    }

    /// Attach a destination for `request` and start it
    pub fn start(
        &self,
        config: &InvocationConfig,
        request: CommandRequest,
        origin: Option<DestinationId>,
    ) -> Result<Invocation, InvocationError> {
        if self.runner.runtime().is_err() {
            return Err(SinkError::NoRuntime.into());
        }

        let destination = match config.target {
            OutputTarget::NewDocument => self.sinks.create(
                DestinationKind::Document,
                Some(config.title.as_deref().unwrap_or(&self.settings.default_title)),
                config.syntax.as_deref(),
                request.clone(),
            )?,
            OutputTarget::Panel => self.sinks.create(
                DestinationKind::Panel(self.settings.panel_name.clone()),
                None,
                config.syntax.as_deref(),
                request.clone(),
            )?,
            OutputTarget::Existing(id) => {
                if !self.sinks.contains(id) {
                    return Err(SinkError::UnknownDestination(id).into());
                }
                id
            }
        };

        let generation = self.sinks.begin_run(destination)?;
        let mut deliver = self.sinks.output_callback(destination, generation);

        let dependent = if config.refresh { origin } else { None };
        let sinks = self.sinks.clone();
        let runner = self.runner.clone();

        tracing::info!("Running '{}' into {}", request.command(), destination);

        let handle = self.runner.execute(&request, move |event| {
            let finished = event.is_sentinel();
            deliver(event);

            if let (true, Some(origin)) = (finished, dependent) {
                if let Err(e) = sinks.refresh(origin, &runner) {
                    tracing::warn!("Could not refresh {}: {}", origin, e);
                }
            }
        });

        Ok(Invocation {
            destination,
            request,
            handle,
        })
    }

    /// Re-run a destination's stored command in place
    pub fn refresh(&self, id: DestinationId) -> Result<Option<RunHandle>, SinkError> {
        self.sinks.refresh(id, &self.runner)
    }

    /// Close a destination, dropping its stored command
    pub fn close(&self, id: DestinationId) -> Result<(), SinkError> {
        self.sinks.close(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RunOutcome, PARAMETER_REQUIRED_MESSAGE};
    use crate::host::Shell;
    use crate::sink::{DestinationState, MemorySurfaceFactory};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeEditor {
        selections: Vec<String>,
        working_dir: Option<PathBuf>,
        answer: Option<String>,
        prompts: Mutex<Vec<String>>,
        dialogs: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EditorContext for FakeEditor {
        fn selections(&self) -> Vec<String> {
            self.selections.clone()
        }

        fn working_dir(&self) -> Option<PathBuf> {
            self.working_dir.clone()
        }

        async fn prompt(&self, label: &str, _initial: &str) -> Option<String> {
            self.prompts.lock().unwrap().push(label.to_string());
            self.answer.clone()
        }

        fn message_dialog(&self, message: &str) {
            self.dialogs.lock().unwrap().push(message.to_string());
        }
    }

    fn shell_command() -> ShellCommand {
        ShellCommand::new(Settings::default(), Arc::new(MemorySurfaceFactory::new()))
    }

    async fn wait_for_content(sc: &ShellCommand, id: DestinationId, expected: &str) -> bool {
        for _ in 0..100 {
            if sc.sinks().content(id).as_deref() == Some(expected) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_required_parameter_blocks_spawn() {
        let sc = shell_command();
        let editor = FakeEditor {
            selections: vec!["   ".to_string()],
            ..FakeEditor::default()
        };
        let config = InvocationConfig::command("grep -rn");

        let result = sc.run_on_region(&config, &editor, None).await;
        assert_eq!(result.unwrap_err(), InvocationError::ParameterRequired);
        assert_eq!(
            *editor.dialogs.lock().unwrap(),
            vec![PARAMETER_REQUIRED_MESSAGE.to_string()]
        );
        assert!(sc.sinks().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_prompt_does_nothing() {
        let sc = shell_command();
        let editor = FakeEditor::default();

        let result = sc.run(&InvocationConfig::default(), &editor, None).await;
        assert!(result.unwrap().is_none());
        assert_eq!(*editor.prompts.lock().unwrap(), vec!["Shell Command".to_string()]);
        assert!(editor.dialogs.lock().unwrap().is_empty());
        assert!(sc.sinks().is_empty());
    }

    #[tokio::test]
    async fn test_blank_prompt_answer_reports_missing_command() {
        let sc = shell_command();
        let editor = FakeEditor {
            answer: Some("  ".to_string()),
            ..FakeEditor::default()
        };
        let mut config = InvocationConfig::default();
        config.prompt = Some("Git".to_string());

        let result = sc.run(&config, &editor, None).await;
        assert_eq!(result.unwrap_err(), InvocationError::MissingCommand);
        assert_eq!(*editor.prompts.lock().unwrap(), vec!["Git".to_string()]);
        assert_eq!(
            *editor.dialogs.lock().unwrap(),
            vec!["No command provided.".to_string()]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_prompted_command_with_prefix_and_region() {
        let sc = shell_command();
        let dir = tempfile::tempdir().unwrap();
        let editor = FakeEditor {
            selections: vec!["world".to_string()],
            working_dir: Some(dir.path().to_path_buf()),
            answer: Some("hello".to_string()),
            ..FakeEditor::default()
        };
        let mut config = InvocationConfig::default().with_prefix("echo");
        config.region = true;

        let invocation = sc.run(&config, &editor, None).await.unwrap().unwrap();
        assert_eq!(invocation.request.command(), "echo hello world");
        assert_eq!(invocation.request.working_dir(), Some(dir.path()));

        let outcome = invocation.handle.wait().await;
        assert_eq!(outcome, RunOutcome::Exited(0));

        let id = invocation.destination;
        assert_eq!(sc.sinks().content(id).unwrap(), "hello world\n");
        assert_eq!(sc.sinks().request(id), Some(invocation.request));
        assert!(sc.sinks().has_marker(id));
        assert_eq!(sc.sinks().is_read_only(id), Some(true));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_panel_target_reuses_panel() {
        let sc = shell_command();
        let editor = FakeEditor::default();

        let first = sc
            .run(&InvocationConfig::command("echo one").in_panel(), &editor, None)
            .await
            .unwrap()
            .unwrap();
        first.handle.wait().await;

        let second = sc
            .run(&InvocationConfig::command("echo two").in_panel(), &editor, None)
            .await
            .unwrap()
            .unwrap();
        second.handle.wait().await;

        assert_eq!(first.destination, second.destination);
        assert_eq!(sc.sinks().content(second.destination).unwrap(), "two\n");
        assert_eq!(sc.sinks().len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_refresh_flag_refreshes_origin() {
        let sc = shell_command();
        let editor = FakeEditor::default();
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("state");

        let origin_cmd = format!("cat {}", marker.display());
        let origin = sc
            .run(&InvocationConfig::command(origin_cmd), &editor, None)
            .await
            .unwrap()
            .unwrap();
        origin.handle.wait().await;

        let write_cmd = format!("echo updated > {}", marker.display());
        let config = InvocationConfig::command(write_cmd).with_refresh(true);
        let writer = sc
            .run(&config, &editor, Some(origin.destination))
            .await
            .unwrap()
            .unwrap();
        writer.handle.wait().await;

        assert!(wait_for_content(&sc, origin.destination, "updated\n").await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_existing_target_appends_to_destination() {
        let sc = shell_command();
        let editor = FakeEditor::default();

        let first = sc
            .run(&InvocationConfig::command("echo first"), &editor, None)
            .await
            .unwrap()
            .unwrap();
        first.handle.wait().await;

        let config = InvocationConfig::command("echo second")
            .with_target(OutputTarget::Existing(first.destination));
        let second = sc.run(&config, &editor, None).await.unwrap().unwrap();
        second.handle.wait().await;

        assert_eq!(second.destination, first.destination);
        assert_eq!(
            sc.sinks().content(first.destination).unwrap(),
            "first\nsecond\n"
        );
        // The stored request is the original one
        assert_eq!(
            sc.sinks().request(first.destination).unwrap().command(),
            "echo first"
        );
    }

    #[tokio::test]
    async fn test_unknown_existing_target() {
        let sc = shell_command();
        let other = shell_command();
        let editor = FakeEditor::default();

        let foreign = other
            .sinks()
            .create(
                DestinationKind::Document,
                None,
                None,
                CommandRequest::inherit("ls").unwrap(),
            )
            .unwrap();
        other.close(foreign).unwrap();

        let config = InvocationConfig::command("ls").with_target(OutputTarget::Existing(foreign));
        let err = sc.run(&config, &editor, None).await.unwrap_err();
        assert_eq!(
            err,
            InvocationError::Sink(SinkError::UnknownDestination(foreign))
        );
        assert_eq!(editor.dialogs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_spawn_failure_lands_in_destination() {
        let sc = shell_command().with_runner(
            CommandRunner::new().with_shell(Shell::custom("/nonexistent/interpreter", ["-c"])),
        );
        let editor = FakeEditor::default();

        let invocation = sc
            .run(&InvocationConfig::command("echo hi"), &editor, None)
            .await
            .unwrap()
            .unwrap();
        let id = invocation.destination;

        assert_eq!(invocation.handle.wait().await, RunOutcome::SpawnFailed);
        let content = sc.sinks().content(id).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("/nonexistent/interpreter"));
        assert_eq!(sc.sinks().is_read_only(id), Some(true));
        assert_eq!(sc.sinks().state(id), Some(DestinationState::ReadOnly));
        assert!(editor.dialogs.lock().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_refresh_is_idempotent_for_pure_command() {
        let sc = shell_command();
        let editor = FakeEditor::default();

        let invocation = sc
            .run(&InvocationConfig::command("echo hi"), &editor, None)
            .await
            .unwrap()
            .unwrap();
        let id = invocation.destination;
        invocation.handle.wait().await;
        let first = sc.sinks().content(id).unwrap();

        sc.refresh(id).unwrap().unwrap().wait().await;
        assert_eq!(sc.sinks().content(id).unwrap().trim_end(), first.trim_end());
    }

    #[tokio::test]
    async fn test_relative_working_dir_override_rejected() {
        let sc = shell_command();
        let editor = FakeEditor::default();
        let err = sc
            .run(
                &InvocationConfig::command("ls").with_working_dir("relative"),
                &editor,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, InvocationError::RelativeWorkingDir(_)));
    }

    #[test]
    fn test_start_without_runtime_touches_nothing() {
        let sc = shell_command();
        let request = CommandRequest::inherit("echo hi").unwrap();

        let err = sc
            .start(&InvocationConfig::command("echo hi").in_panel(), request, None)
            .unwrap_err();
        assert_eq!(err, InvocationError::Sink(SinkError::NoRuntime));
        assert!(sc.sinks().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn test_refresh_from_host_thread() {
        let sc = shell_command();
        let editor = FakeEditor::default();

        let invocation = sc
            .run(&InvocationConfig::command("echo hi"), &editor, None)
            .await
            .unwrap()
            .unwrap();
        let id = invocation.destination;
        invocation.handle.wait().await;

        let host = sc.clone();
        let handle = std::thread::spawn(move || host.refresh(id))
            .join()
            .unwrap()
            .unwrap()
            .unwrap();

        assert_eq!(handle.wait().await, RunOutcome::Exited(0));
        assert_eq!(sc.sinks().content(id).unwrap(), "hi\n");
    }
}
