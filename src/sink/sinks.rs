//! Output Sink registry
//!
//! Owns every output destination, the command request each one can replay,
//! and the generation counter that keeps superseded runs from writing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::surface::{Surface, SurfaceError, SurfaceFactory};
use crate::core::{
    strip_ansi, CommandRequest, ExitStatusPolicy, NoOutputPolicy, OutputEvent, RunOutcome,
};
use crate::host::{CommandRunner, RunHandle};

/// Marker that identifies command-output surfaces to key bindings
pub const MARKER_KEY: &str = "ShellCommand";

/// Name of the reusable output panel
pub const DEFAULT_PANEL_NAME: &str = "ShellCommand";

/// Handle to an output destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DestinationId(u64);

impl std::fmt::Display for DestinationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of surface to allocate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationKind {
    /// A new scratch document
    Document,
    /// A reusable panel, shared by name
    Panel(String),
}

/// Lifecycle of a destination's content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationState {
    Created,
    Writable,
    ReadOnly,
    Cleared,
}

/// Result of delivering text to a destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// Nothing needed writing
    Unchanged,
    /// The writer's generation is stale; the text was dropped
    Discarded,
}

/// Output sink errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("Unknown destination: {0}")]
    UnknownDestination(DestinationId),

    #[error("Surface error: {0}")]
    Surface(#[from] SurfaceError),

    #[error("No async runtime available to run commands")]
    NoRuntime,
}

/// How run output is turned into destination text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOptions {
    /// Remove ANSI escape sequences from chunks
    pub strip_ansi: bool,
    /// Placeholder for runs that print nothing
    pub no_output: NoOutputPolicy,
    /// Whether exit status shows up in the text
    pub exit_status: ExitStatusPolicy,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            strip_ansi: true,
            no_output: NoOutputPolicy::default(),
            exit_status: ExitStatusPolicy::default(),
        }
    }
}

struct Destination {
    kind: DestinationKind,
    surface: Box<dyn Surface>,
    state: DestinationState,
    generation: u64,
    /// Whether the current generation has appended anything
    written: bool,
    marked: bool,
}

impl Destination {
    fn new(kind: DestinationKind, surface: Box<dyn Surface>) -> Self {
        Self {
            kind,
            surface,
            state: DestinationState::Created,
            generation: 0,
            written: false,
            marked: false,
        }
    }

    fn append(&mut self, text: &str) -> Result<(), SurfaceError> {
        self.surface.set_read_only(false);
        self.state = DestinationState::Writable;

        let end = self.surface.len();
        let result = self.surface.insert(end, text);

        self.surface.set_read_only(true);
        self.state = DestinationState::ReadOnly;
        result
    }

    fn clear(&mut self) -> Result<(), SurfaceError> {
        self.surface.set_read_only(false);
        self.state = DestinationState::Writable;

        let result = self.surface.clear();

        self.surface.set_read_only(true);
        self.state = DestinationState::Cleared;
        result
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    destinations: HashMap<DestinationId, Destination>,
    /// Replay metadata, kept beside the destinations and dropped with them
    requests: HashMap<DestinationId, CommandRequest>,
    panels: HashMap<String, DestinationId>,
}

impl Registry {
    fn allocate(&mut self) -> DestinationId {
        self.next_id += 1;
        DestinationId(self.next_id)
    }

    fn get_mut(&mut self, id: DestinationId) -> Result<&mut Destination, SinkError> {
        self.destinations
            .get_mut(&id)
            .ok_or(SinkError::UnknownDestination(id))
    }
}

/// Thread-safe registry of output destinations
///
/// Cloning is cheap and every clone sees the same destinations.
#[derive(Clone)]
pub struct OutputSinks {
    factory: Arc<dyn SurfaceFactory>,
    options: DeliveryOptions,
    inner: Arc<Mutex<Registry>>,
}

impl OutputSinks {
    pub fn new(factory: Arc<dyn SurfaceFactory>) -> Self {
        Self {
            factory,
            options: DeliveryOptions::default(),
            inner: Arc::new(Mutex::new(Registry::default())),
        }
    }

    pub fn with_options(mut self, options: DeliveryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &DeliveryOptions {
        &self.options
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate (or, for a named panel, reuse) a destination
    ///
    /// The surface is made a read-only scratch surface, titled, given a
    /// syntax, marked as command output, and `request` is stored for replay.
    pub fn create(
        &self,
        kind: DestinationKind,
        title: Option<&str>,
        syntax: Option<&str>,
        request: CommandRequest,
    ) -> Result<DestinationId, SinkError> {
        let resolved_syntax = syntax.and_then(|hint| {
            let found = self.factory.find_syntax(hint);
            if found.is_none() {
                tracing::warn!("No syntax definition found for '{}'", hint);
            }
            found
        });

        let mut registry = self.registry();

        let reused = match &kind {
            DestinationKind::Panel(name) => registry
                .panels
                .get(name)
                .copied()
                .filter(|id| registry.destinations.contains_key(id)),
            DestinationKind::Document => None,
        };

        let id = match reused {
            Some(id) => {
                let destination = registry.get_mut(id)?;
                destination.generation += 1;
                destination.written = false;
                destination.clear()?;
                id
            }
            None => {
                let id = registry.allocate();
                let surface = match &kind {
                    DestinationKind::Document => self.factory.new_document(),
                    DestinationKind::Panel(name) => {
                        registry.panels.insert(name.clone(), id);
                        self.factory.panel(name)
                    }
                };
                registry
                    .destinations
                    .insert(id, Destination::new(kind.clone(), surface));
                id
            }
        };

        let destination = registry.get_mut(id)?;
        if let (DestinationKind::Document, Some(title)) = (&destination.kind, title) {
            destination.surface.set_title(title);
        }
        destination.surface.set_scratch(true);
        destination.surface.set_read_only(true);
        destination.marked = true;
        if resolved_syntax.is_some() {
            destination.surface.set_syntax(resolved_syntax.as_deref());
        }

        tracing::debug!("Destination {} ({:?}) for: {}", id, kind, request);
        registry.requests.insert(id, request);
        drop(registry);

        if let DestinationKind::Panel(name) = &kind {
            self.factory.show_panel(name);
        }

        Ok(id)
    }

    /// Register a surface the host already owns
    ///
    /// It is used as-is: no title, syntax, marker or replay request.
    pub fn adopt(&self, surface: Box<dyn Surface>) -> DestinationId {
        let mut registry = self.registry();
        let id = registry.allocate();
        registry
            .destinations
            .insert(id, Destination::new(DestinationKind::Document, surface));
        id
    }

    /// Start a new generation; writers holding older generations are ignored
    /// from now on
    pub fn begin_run(&self, id: DestinationId) -> Result<u64, SinkError> {
        let mut registry = self.registry();
        let destination = registry.get_mut(id)?;
        destination.generation += 1;
        destination.written = false;
        Ok(destination.generation)
    }

    /// Append `text` at the end of the destination's content
    pub fn append(
        &self,
        id: DestinationId,
        generation: u64,
        text: &str,
    ) -> Result<AppendOutcome, SinkError> {
        let mut registry = self.registry();
        let destination = registry.get_mut(id)?;

        if destination.generation != generation {
            tracing::debug!(
                "Discarding stale output for {} (generation {} != {})",
                id,
                generation,
                destination.generation
            );
            return Ok(AppendOutcome::Discarded);
        }

        destination.append(text)?;
        destination.written = true;
        Ok(AppendOutcome::Appended)
    }

    /// Apply one output event for the writer holding `generation`
    pub fn deliver(
        &self,
        id: DestinationId,
        generation: u64,
        event: OutputEvent,
    ) -> Result<AppendOutcome, SinkError> {
        match event {
            OutputEvent::Chunk(chunk) => {
                let text = strip_ansi(&chunk, self.options.strip_ansi);
                self.append(id, generation, &text)
            }
            OutputEvent::Finished(outcome) => self.finish(id, generation, outcome),
        }
    }

    fn finish(
        &self,
        id: DestinationId,
        generation: u64,
        outcome: RunOutcome,
    ) -> Result<AppendOutcome, SinkError> {
        let written = {
            let mut registry = self.registry();
            let destination = registry.get_mut(id)?;
            if destination.generation != generation {
                return Ok(AppendOutcome::Discarded);
            }
            destination.state = DestinationState::ReadOnly;
            destination.written
        };

        let mut result = AppendOutcome::Unchanged;

        if !written && outcome.is_success() {
            if let Some(message) = self.options.no_output.placeholder() {
                result = self.append(id, generation, message)?;
            }
        }

        if let Some(annotation) = self.options.exit_status.annotation(outcome) {
            result = self.append(id, generation, &annotation)?;
        }

        Ok(result)
    }

    /// A callback that feeds run output into `id` for `generation`
    ///
    /// Failures are logged and absorbed; they never reach the runner.
    pub fn output_callback(
        &self,
        id: DestinationId,
        generation: u64,
    ) -> impl FnMut(OutputEvent) + Send + 'static {
        let sinks = self.clone();
        move |event| {
            if let Err(e) = sinks.deliver(id, generation, event) {
                tracing::warn!("Could not write output to {}: {}", id, e);
            }
        }
    }

    /// Re-run the destination's stored request, replacing its content
    ///
    /// Returns `Ok(None)` without running anything when no request is stored.
    /// The content is left alone when `runner` has no runtime to run on.
    pub fn refresh(
        &self,
        id: DestinationId,
        runner: &CommandRunner,
    ) -> Result<Option<RunHandle>, SinkError> {
        self.refresh_with(id, runner, |_| {})
    }

    /// Like [`refresh`](Self::refresh), calling `on_finished` after the
    /// sentinel has been applied
    pub fn refresh_with<F>(
        &self,
        id: DestinationId,
        runner: &CommandRunner,
        on_finished: F,
    ) -> Result<Option<RunHandle>, SinkError>
    where
        F: FnOnce(RunOutcome) + Send + 'static,
    {
        let (request, generation) = {
            let mut registry = self.registry();
            let Some(request) = registry.requests.get(&id).cloned() else {
                if registry.destinations.contains_key(&id) {
                    tracing::debug!("Nothing to refresh for {}", id);
                    return Ok(None);
                }
                return Err(SinkError::UnknownDestination(id));
            };

            if runner.runtime().is_err() {
                tracing::warn!("Not refreshing {}: no runtime to run on", id);
                return Err(SinkError::NoRuntime);
            }

            let destination = registry.get_mut(id)?;
            destination.generation += 1;
            destination.written = false;
            destination.clear()?;
            (request, destination.generation)
        };

        tracing::debug!("Refreshing {} with: {}", id, request);

        let mut deliver = self.output_callback(id, generation);
        let mut on_finished = Some(on_finished);
        let handle = runner.execute(&request, move |event| {
            let finished = match &event {
                OutputEvent::Finished(outcome) => Some(*outcome),
                OutputEvent::Chunk(_) => None,
            };
            deliver(event);
            if let (Some(outcome), Some(callback)) = (finished, on_finished.take()) {
                callback(outcome);
            }
        });

        Ok(Some(handle))
    }

    /// Forget a destination and its stored request
    pub fn close(&self, id: DestinationId) -> Result<(), SinkError> {
        let mut registry = self.registry();
        let destination = registry
            .destinations
            .remove(&id)
            .ok_or(SinkError::UnknownDestination(id))?;
        registry.requests.remove(&id);
        if let DestinationKind::Panel(name) = &destination.kind {
            registry.panels.remove(name);
        }
        Ok(())
    }

    /// Number of live destinations
    pub fn len(&self) -> usize {
        self.registry().destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: DestinationId) -> bool {
        self.registry().destinations.contains_key(&id)
    }

    /// Whether `id` is a command-output surface (carries [`MARKER_KEY`])
    pub fn has_marker(&self, id: DestinationId) -> bool {
        self.registry()
            .destinations
            .get(&id)
            .is_some_and(|d| d.marked)
    }

    pub fn content(&self, id: DestinationId) -> Option<String> {
        self.registry()
            .destinations
            .get(&id)
            .map(|d| d.surface.text())
    }

    pub fn state(&self, id: DestinationId) -> Option<DestinationState> {
        self.registry().destinations.get(&id).map(|d| d.state)
    }

    pub fn is_read_only(&self, id: DestinationId) -> Option<bool> {
        self.registry()
            .destinations
            .get(&id)
            .map(|d| d.surface.is_read_only())
    }

    pub fn generation(&self, id: DestinationId) -> Option<u64> {
        self.registry().destinations.get(&id).map(|d| d.generation)
    }

    /// The request a refresh of `id` would replay
    pub fn request(&self, id: DestinationId) -> Option<CommandRequest> {
        self.registry().requests.get(&id).cloned()
    }

    /// Drop the stored request so the destination can no longer refresh
    pub fn forget_request(&self, id: DestinationId) -> Option<CommandRequest> {
        self.registry().requests.remove(&id)
    }

    pub fn panel(&self, name: &str) -> Option<DestinationId> {
        self.registry().panels.get(name).copied()
    }
}

impl std::fmt::Debug for OutputSinks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry();
        f.debug_struct("OutputSinks")
            .field("destinations", &registry.destinations.len())
            .field("options", &self.options)
            .finish()
    }
}
