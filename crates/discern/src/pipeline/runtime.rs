//! One pipeline's lifecycle: `idle -> loading -> success | error`.
//!
//! Every run captures the runtime's generation when it starts. `reset`,
//! `bind` and the next run all bump the generation, so a request that
//! resolves after any of those finds a mismatch and is dropped instead of
//! writing into state that now belongs to something else.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::backend::{AnalysisBackend, CacheRecord, ResultCache};
use crate::config::Config;
use crate::content::ContentItem;
use crate::error::AnalysisError;

use super::definition::{AnalysisOptions, PipelineDefinition};
use super::events::{EventBroadcaster, OrchestratorEvent, PipelineEvent};
use super::kind::PipelineKind;
use super::progress::{ProgressEmitter, ProgressHandle, ProgressScript, ProgressUpdate};
use super::state::{PipelineError, PipelineSnapshot, PipelineState, PipelineStatus};

/// Timing knobs shared by all runtimes of one orchestrator.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeSettings {
    pub progress_interval: Duration,
    pub stall_ceiling: u8,
    pub event_capacity: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        let emitter = ProgressEmitter::default();
        Self {
            progress_interval: emitter.interval(),
            stall_ceiling: emitter.ceiling(),
            event_capacity: 256,
        }
    }
}

impl RuntimeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            progress_interval: config.progress.tick_interval(),
            stall_ceiling: config.progress.stall_ceiling,
            event_capacity: config.events.capacity,
        }
    }

    pub fn emitter(&self) -> ProgressEmitter {
        ProgressEmitter::new(self.progress_interval, self.stall_ceiling)
    }
}

/// How a run was requested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRequest {
    /// Re-run even if a result is already available.
    pub force: bool,
    pub options: AnalysisOptions,
}

impl RunRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }

    pub fn with_options(mut self, options: AnalysisOptions) -> Self {
        self.options = options;
        self
    }
}

/// What a call to `run` did.
#[derive(Debug)]
pub enum RunOutcome {
    /// A request is in flight.
    Started(RunHandle),
    /// A run was already loading; nothing new was started.
    AlreadyLoading,
    /// A result exists and the run was not forced.
    AlreadyAvailable,
    /// The request could not be built. The pipeline is now in `error`.
    Rejected(AnalysisError),
    /// No pipeline is displayed.
    NothingSelected,
    /// No content item is set.
    NoContentItem,
    /// The pipeline does not apply to the current content item.
    Unavailable(PipelineKind),
    /// Called outside a Tokio runtime; nothing was started.
    NoAsyncRuntime,
}

impl RunOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, RunOutcome::Started(_))
    }

    pub fn into_handle(self) -> Option<RunHandle> {
        match self {
            RunOutcome::Started(handle) => Some(handle),
            _ => None,
        }
    }
}

/// How an in-flight run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunResolution {
    /// The result was applied. `persisted` is false if the cache write failed.
    Succeeded { persisted: bool },
    /// The remote call failed; the error was applied.
    Failed(AnalysisError),
    /// The runtime was reset or re-run before this run resolved.
    StaleDiscarded,
    /// The task was cancelled or panicked.
    Aborted,
}

/// Handle to a started run.
#[derive(Debug)]
pub struct RunHandle {
    kind: PipelineKind,
    run_id: Uuid,
    handle: JoinHandle<RunResolution>,
}

impl RunHandle {
    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the run to resolve.
    pub async fn wait(self) -> RunResolution {
        match self.handle.await {
            Ok(resolution) => resolution,
            Err(e) => {
                warn!(kind = %self.kind.as_str(), run_id = %self.run_id, error = %e, "Run task did not complete");
                RunResolution::Aborted
            }
        }
    }
}

/// Result of applying a cache record to one runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrateOutcome {
    Hydrated,
    /// The record has nothing for this pipeline.
    NotCached,
    /// The runtime was not idle; the cached result was ignored.
    Skipped(PipelineStatus),
}

struct RuntimeCell<T> {
    state: PipelineState<T>,
    generation: u64,
    content_id: Option<String>,
    ticker: Option<ProgressHandle>,
}

impl<T> RuntimeCell<T> {
    fn restart(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.state = PipelineState::default();
        self.ticker = None;
    }
}

struct RuntimeShared<D: PipelineDefinition> {
    cell: Mutex<RuntimeCell<D::Output>>,
    backend: Arc<dyn AnalysisBackend>,
    cache: Arc<dyn ResultCache>,
    events: EventBroadcaster,
    emitter: ProgressEmitter,
    _definition: PhantomData<fn() -> D>,
}

impl<D: PipelineDefinition> RuntimeShared<D> {
    fn lock(&self) -> MutexGuard<'_, RuntimeCell<D::Output>> {
        match self.cell.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("{} runtime lock was poisoned, recovering", D::KIND);
                poisoned.into_inner()
            }
        }
    }

    fn publish(&self, cell: &RuntimeCell<D::Output>) {
        let Some(content_id) = cell.content_id.clone() else {
            return;
        };
        self.events.send(OrchestratorEvent::Pipeline(PipelineEvent {
            content_id,
            kind: D::KIND,
            status: cell.state.status,
            progress: cell.state.progress.clone(),
            error: cell.state.error.clone(),
            is_from_cache: cell.state.is_from_cache,
            timestamp: Utc::now(),
        }));
    }

    /// Applies a ticker update. Returns false once the run it belongs to
    /// is no longer loading, which stops the ticker.
    fn apply_progress(&self, generation: u64, update: ProgressUpdate) -> bool {
        let mut cell = self.lock();
        if cell.generation != generation || !cell.state.is_loading() {
            return false;
        }
        cell.state.progress = Some(update);
        self.publish(&cell);
        true
    }
}

/// Runtime for one pipeline definition.
pub struct PipelineRuntime<D: PipelineDefinition> {
    shared: Arc<RuntimeShared<D>>,
}

impl<D: PipelineDefinition> Clone for PipelineRuntime<D> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<D: PipelineDefinition> PipelineRuntime<D> {
    pub fn new(
        backend: Arc<dyn AnalysisBackend>,
        cache: Arc<dyn ResultCache>,
        events: EventBroadcaster,
        emitter: ProgressEmitter,
    ) -> Self {
        Self {
            shared: Arc::new(RuntimeShared {
                cell: Mutex::new(RuntimeCell {
                    state: PipelineState::default(),
                    generation: 0,
                    content_id: None,
                    ticker: None,
                }),
                backend,
                cache,
                events,
                emitter,
                _definition: PhantomData,
            }),
        }
    }

    pub fn kind(&self) -> PipelineKind {
        D::KIND
    }

    /// A copy of the current state.
    pub fn state(&self) -> PipelineState<D::Output> {
        self.shared.lock().state.clone()
    }

    pub fn status(&self) -> PipelineStatus {
        self.shared.lock().state.status
    }

    pub fn result(&self) -> Option<D::Output> {
        self.shared.lock().state.result.clone()
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        self.shared.lock().state.snapshot(D::KIND)
    }

    /// Content id this runtime's state belongs to.
    pub fn content_id(&self) -> Option<String> {
        self.shared.lock().content_id.clone()
    }

    /// True while the progress ticker of the current run is alive.
    pub fn is_ticking(&self) -> bool {
        self.shared
            .lock()
            .ticker
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// Returns to `idle` with no result, error or progress. Any in-flight
    /// run will be discarded when it resolves.
    pub fn reset(&self) {
        let mut cell = self.shared.lock();
        cell.restart();
        self.shared.publish(&cell);
    }

    /// Resets and attaches the runtime to another content item.
    pub fn bind(&self, content_id: Option<&str>) {
        let mut cell = self.shared.lock();
        cell.restart();
        cell.content_id = content_id.map(str::to_string);
        self.shared.publish(&cell);
    }

    /// Shows a cached result. Only applies to an idle runtime; a loading or
    /// already successful runtime holds fresher data and is left alone.
    pub fn hydrate_from_cache(
        &self,
        output: D::Output,
        cached_at: Option<DateTime<Utc>>,
    ) -> HydrateOutcome {
        let mut cell = self.shared.lock();
        if !cell.state.is_idle() {
            warn!(
                kind = %D::KIND.as_str(),
                status = %cell.state.status,
                "Ignoring cached result for a pipeline that is not idle"
            );
            return HydrateOutcome::Skipped(cell.state.status);
        }

        cell.state = PipelineState {
            status: PipelineStatus::Success,
            result: Some(output),
            is_from_cache: true,
            cached_at,
            ..PipelineState::default()
        };
        self.shared.publish(&cell);
        HydrateOutcome::Hydrated
    }

    pub fn hydrate_from_record(&self, record: &CacheRecord) -> HydrateOutcome {
        match D::read_cached(record) {
            Some((output, cached_at)) => self.hydrate_from_cache(output, cached_at),
            None => HydrateOutcome::NotCached,
        }
    }

    /// Starts a run against `item`.
    ///
    /// A no-op while loading, and while a result exists unless
    /// `request.force` is set. Running against an item other than the
    /// bound one resets the runtime first. Outside a Tokio runtime the
    /// run is refused with [`RunOutcome::NoAsyncRuntime`].
    pub fn run(&self, item: &ContentItem, request: &RunRequest) -> RunOutcome {
        let kind = D::KIND;
        let mut cell = self.shared.lock();

        if cell.content_id.as_deref() != Some(item.id.as_str()) {
            cell.restart();
            cell.content_id = Some(item.id.clone());
        }

        match cell.state.status {
            PipelineStatus::Loading => {
                debug!(kind = %kind.as_str(), content_id = %item.id, "Run already in flight");
                return RunOutcome::AlreadyLoading;
            }
            PipelineStatus::Success if !request.force => return RunOutcome::AlreadyAvailable,
            _ => {}
        }

        let body = D::build_request(item, &request.options).and_then(|req| {
            serde_json::to_value(req).map_err(|e| {
                AnalysisError::validation(format!("Failed to encode {} request: {}", kind, e))
            })
        });
        let body = match body {
            Ok(body) => body,
            Err(err) => {
                warn!(kind = %kind.as_str(), content_id = %item.id, error = %err, "Rejected run");
                cell.state.status = PipelineStatus::Error;
                cell.state.error = Some(PipelineError::from(&err));
                cell.state.progress = None;
                self.shared.publish(&cell);
                return RunOutcome::Rejected(err);
            }
        };

        let spawner = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                warn!(kind = %kind.as_str(), content_id = %item.id, error = %e, "No async runtime to run on");
                return RunOutcome::NoAsyncRuntime;
            }
        };

        cell.generation = cell.generation.wrapping_add(1);
        let generation = cell.generation;
        let mode = D::mode(&request.options);

        // The previous result stays visible until this run supersedes it.
        cell.state.status = PipelineStatus::Loading;
        cell.state.error = None;
        cell.state.mode = mode;

        let script = ProgressScript::for_run(kind, mode);
        cell.state.progress = script.as_ref().map(|s| self.shared.emitter.initial(s));
        cell.ticker = script.map(|s| self.start_ticker(&spawner, s, generation));
        self.shared.publish(&cell);
        drop(cell);

        let run_id = Uuid::new_v4();
        let span = info_span!(
            "pipeline_run",
            kind = %kind.as_str(),
            content_id = %item.id,
            run_id = %run_id,
        );
        let runtime = self.clone();
        let content_id = item.id.clone();

        let handle = spawner.spawn(
            async move {
                debug!("Analysis request started");
                let outcome = match runtime.shared.backend.analyze(kind, body).await {
                    Ok(payload) => D::decode(&payload).map(|output| (output, payload)),
                    Err(e) => Err(e),
                };
                runtime.resolve(generation, &content_id, outcome).await
            }
            .instrument(span),
        );

        RunOutcome::Started(RunHandle {
            kind,
            run_id,
            handle,
        })
    }

    fn start_ticker(
        &self,
        spawner: &Handle,
        script: ProgressScript,
        generation: u64,
    ) -> ProgressHandle {
        let shared: Weak<RuntimeShared<D>> = Arc::downgrade(&self.shared);
        self.shared.emitter.start(spawner, script, move |update| match shared.upgrade() {
            Some(shared) => shared.apply_progress(generation, update),
            None => false,
        })
    }

    async fn resolve(
        &self,
        generation: u64,
        content_id: &str,
        outcome: Result<(D::Output, Value), AnalysisError>,
    ) -> RunResolution {
        let payload = {
            let mut cell = self.shared.lock();
            if cell.generation != generation || !cell.state.is_loading() {
                debug!(
                    current_generation = cell.generation,
                    run_generation = generation,
                    "Discarding stale result"
                );
                return RunResolution::StaleDiscarded;
            }

            cell.ticker = None;
            cell.state.progress = None;

            match outcome {
                Ok((output, payload)) => {
                    cell.state.status = PipelineStatus::Success;
                    cell.state.result = Some(output);
                    cell.state.error = None;
                    cell.state.is_from_cache = false;
                    cell.state.cached_at = None;
                    cell.state.completed_at = Some(Utc::now());
                    self.shared.publish(&cell);
                    info!("Analysis completed");
                    payload
                }
                Err(err) => {
                    cell.state.status = PipelineStatus::Error;
                    cell.state.error = Some(PipelineError::from(&err));
                    self.shared.publish(&cell);
                    warn!(error = %err, "Analysis failed");
                    return RunResolution::Failed(err);
                }
            }
        };

        let persisted = match self.shared.cache.write(content_id, D::KIND, payload).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to persist result to cache");
                false
            }
        };

        RunResolution::Succeeded { persisted }
    }
}

/// Kind-independent view of a runtime, used by the orchestrator.
pub trait ErasedRuntime: Send + Sync {
    fn kind(&self) -> PipelineKind;
    fn status(&self) -> PipelineStatus;
    fn snapshot(&self) -> PipelineSnapshot;
    fn run(&self, item: &ContentItem, request: &RunRequest) -> RunOutcome;
    fn hydrate_from_record(&self, record: &CacheRecord) -> HydrateOutcome;
    fn reset(&self);
    fn bind(&self, content_id: Option<&str>);
}

impl<D: PipelineDefinition> ErasedRuntime for PipelineRuntime<D> {
    fn kind(&self) -> PipelineKind {
        D::KIND
    }

    fn status(&self) -> PipelineStatus {
        PipelineRuntime::status(self)
    }

    fn snapshot(&self) -> PipelineSnapshot {
        PipelineRuntime::snapshot(self)
    }

    fn run(&self, item: &ContentItem, request: &RunRequest) -> RunOutcome {
        PipelineRuntime::run(self, item, request)
    }

    fn hydrate_from_record(&self, record: &CacheRecord) -> HydrateOutcome {
        PipelineRuntime::hydrate_from_record(self, record)
    }

    fn reset(&self) {
        PipelineRuntime::reset(self)
    }

    fn bind(&self, content_id: Option<&str>) {
        PipelineRuntime::bind(self, content_id)
    }
}
