//! Owns the six pipeline runtimes for the current content item and decides
//! which one is displayed.
//!
//! Lock order is orchestrator, then runtime. Runtimes never reach back into
//! the orchestrator, so holding the orchestrator lock while calling into a
//! runtime cannot deadlock.

pub mod loader;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::backend::{self, AnalysisBackend, CacheRecord, ResultCache};
use crate::config::Config;
use crate::content::ContentItem;
use crate::error::DiscernError;
use crate::pipeline::{
    Discovery, ErasedRuntime, EventBroadcaster, Health, HydrateOutcome, Manipulation,
    OrchestratorEvent, PipelineKind, PipelineRuntime, PipelineSnapshot, Prompts, Rhetorical,
    RunOutcome, RunRequest, RuntimeSettings, Summary,
};

pub use loader::ContentLoader;

/// The six runtimes, with typed access to each.
pub struct PipelineSet {
    pub rhetorical: PipelineRuntime<Rhetorical>,
    pub manipulation: PipelineRuntime<Manipulation>,
    pub summary: PipelineRuntime<Summary>,
    pub discovery: PipelineRuntime<Discovery>,
    pub health: PipelineRuntime<Health>,
    pub prompts: PipelineRuntime<Prompts>,
}

impl PipelineSet {
    fn new(
        backend: Arc<dyn AnalysisBackend>,
        cache: Arc<dyn ResultCache>,
        events: &EventBroadcaster,
        settings: &RuntimeSettings,
    ) -> Self {
        let emitter = settings.emitter();
        Self {
            rhetorical: PipelineRuntime::new(
                Arc::clone(&backend),
                Arc::clone(&cache),
                events.clone(),
                emitter,
            ),
            manipulation: PipelineRuntime::new(
                Arc::clone(&backend),
                Arc::clone(&cache),
                events.clone(),
                emitter,
            ),
            summary: PipelineRuntime::new(
                Arc::clone(&backend),
                Arc::clone(&cache),
                events.clone(),
                emitter,
            ),
            discovery: PipelineRuntime::new(
                Arc::clone(&backend),
                Arc::clone(&cache),
                events.clone(),
                emitter,
            ),
            health: PipelineRuntime::new(
                Arc::clone(&backend),
                Arc::clone(&cache),
                events.clone(),
                emitter,
            ),
            prompts: PipelineRuntime::new(backend, cache, events.clone(), emitter),
        }
    }

    pub fn get(&self, kind: PipelineKind) -> &dyn ErasedRuntime {
        match kind {
            PipelineKind::Rhetorical => &self.rhetorical,
            PipelineKind::Manipulation => &self.manipulation,
            PipelineKind::Summary => &self.summary,
            PipelineKind::Discovery => &self.discovery,
            PipelineKind::Health => &self.health,
            PipelineKind::Prompts => &self.prompts,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn ErasedRuntime> + '_ {
        PipelineKind::ALL.into_iter().map(move |kind| self.get(kind))
    }
}

/// Identifies one `set_content_item` call. Cache records delivered with a
/// token from an earlier call are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemToken {
    generation: u64,
    content_id: String,
}

impl ItemToken {
    pub fn content_id(&self) -> &str {
        &self.content_id
    }
}

/// What a cache record did to the runtimes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HydrationReport {
    /// Kinds now showing a cached result.
    pub hydrated: Vec<PipelineKind>,
    /// Kinds with a cached result that were already loading or successful.
    pub skipped: Vec<PipelineKind>,
    /// The record was for an item that is no longer current.
    pub stale: bool,
}

impl HydrationReport {
    fn stale() -> Self {
        Self {
            stale: true,
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct OrchestratorState {
    current_item: Option<ContentItem>,
    displayed: Option<PipelineKind>,
    generation: u64,
}

impl OrchestratorState {
    fn content_id(&self) -> Option<&str> {
        self.current_item.as_ref().map(|i| i.id.as_str())
    }

    fn is_available(&self, kind: PipelineKind) -> bool {
        self.current_item
            .as_ref()
            .is_some_and(|item| kind.is_available_for(item.source_type))
    }
}

pub struct Orchestrator {
    state: Mutex<OrchestratorState>,
    pipelines: PipelineSet,
    events: EventBroadcaster,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn AnalysisBackend>,
        cache: Arc<dyn ResultCache>,
        settings: RuntimeSettings,
    ) -> Self {
        let events = EventBroadcaster::new(settings.event_capacity);
        Self {
            state: Mutex::new(OrchestratorState::default()),
            pipelines: PipelineSet::new(backend, cache, &events, &settings),
            events,
        }
    }

    /// Builds the HTTP or in-memory backends described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, DiscernError> {
        let (backend, cache) = backend::from_config(config)?;
        Ok(Self::new(
            backend,
            cache,
            RuntimeSettings::from_config(config),
        ))
    }

    fn lock(&self) -> MutexGuard<'_, OrchestratorState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Orchestrator lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Makes `item` current.
    ///
    /// A different id resets every runtime and clears the display. The same
    /// id only refreshes the item's data (title, transcript) and keeps all
    /// pipeline state.
    pub fn set_content_item(&self, item: ContentItem) -> ItemToken {
        let mut state = self.lock();

        if state.content_id() == Some(item.id.as_str()) {
            debug!(content_id = %item.id, "Refreshing current content item");
            let token = ItemToken {
                generation: state.generation,
                content_id: item.id.clone(),
            };
            state.current_item = Some(item);
            return token;
        }

        state.generation = state.generation.wrapping_add(1);
        for runtime in self.pipelines.iter() {
            runtime.bind(Some(item.id.as_str()));
        }

        info!(
            content_id = %item.id,
            source_type = ?item.source_type,
            "Content item changed"
        );

        let token = ItemToken {
            generation: state.generation,
            content_id: item.id.clone(),
        };
        let was_displayed = state.displayed.take();
        state.current_item = Some(item);

        self.events.send(OrchestratorEvent::ContentChanged {
            content_id: Some(token.content_id.clone()),
        });
        if was_displayed.is_some() {
            self.events
                .send(OrchestratorEvent::DisplayChanged { displayed: None });
        }
        token
    }

    /// Replaces the current item's data while `token` is still current.
    /// Pipeline state is kept. Returns false if the item has been replaced.
    pub fn refresh_content_item(&self, token: &ItemToken, item: ContentItem) -> bool {
        let mut state = self.lock();
        if token.generation != state.generation
            || state.content_id() != Some(token.content_id.as_str())
            || item.id != token.content_id
        {
            return false;
        }
        state.current_item = Some(item);
        true
    }

    /// Drops the current item and resets every runtime.
    pub fn clear_content_item(&self) {
        let mut state = self.lock();
        if state.current_item.is_none() {
            return;
        }

        state.generation = state.generation.wrapping_add(1);
        for runtime in self.pipelines.iter() {
            runtime.bind(None);
        }
        state.current_item = None;
        let was_displayed = state.displayed.take();

        info!("Content item cleared");
        self.events
            .send(OrchestratorEvent::ContentChanged { content_id: None });
        if was_displayed.is_some() {
            self.events
                .send(OrchestratorEvent::DisplayChanged { displayed: None });
        }
    }

    /// Hydrates idle runtimes from `record` if it belongs to the current item.
    pub fn on_cache_loaded(&self, record: &CacheRecord) -> HydrationReport {
        let state = self.lock();
        if state.content_id() != Some(record.content_id.as_str()) {
            debug!(content_id = %record.content_id, "Ignoring cache record for another item");
            return HydrationReport::stale();
        }
        self.hydrate(&state, record)
    }

    /// Like [`Self::on_cache_loaded`], but also rejects the record if the
    /// item was replaced since `token` was issued, even by the same id.
    pub fn on_cache_loaded_for(&self, token: &ItemToken, record: &CacheRecord) -> HydrationReport {
        let state = self.lock();
        if token.generation != state.generation
            || state.content_id() != Some(token.content_id.as_str())
            || record.content_id != token.content_id
        {
            debug!(
                content_id = %record.content_id,
                "Ignoring cache record for a superseded item"
            );
            return HydrationReport::stale();
        }
        self.hydrate(&state, record)
    }

    fn hydrate(&self, state: &OrchestratorState, record: &CacheRecord) -> HydrationReport {
        let mut report = HydrationReport::default();
        for kind in PipelineKind::ALL {
            if !state.is_available(kind) {
                continue;
            }
            match self.pipelines.get(kind).hydrate_from_record(record) {
                HydrateOutcome::Hydrated => report.hydrated.push(kind),
                HydrateOutcome::Skipped(_) => report.skipped.push(kind),
                HydrateOutcome::NotCached => {}
            }
        }

        debug!(
            content_id = %record.content_id,
            hydrated = report.hydrated.len(),
            skipped = report.skipped.len(),
            "Applied cache record"
        );
        report
    }

    /// Displays `kind`. Never starts a run. Returns false if there is no
    /// item or the pipeline does not apply to it.
    pub fn select(&self, kind: PipelineKind) -> bool {
        let mut state = self.lock();
        if !state.is_available(kind) {
            return false;
        }
        if state.displayed != Some(kind) {
            state.displayed = Some(kind);
            self.events
                .send(OrchestratorEvent::DisplayChanged { displayed: Some(kind) });
        }
        true
    }

    /// Hides the displayed pipeline. Its state is kept.
    pub fn close_display(&self) {
        let mut state = self.lock();
        if state.displayed.take().is_some() {
            self.events
                .send(OrchestratorEvent::DisplayChanged { displayed: None });
        }
    }

    pub fn displayed(&self) -> Option<PipelineKind> {
        self.lock().displayed
    }

    /// Runs the displayed pipeline.
    pub fn run_selected(&self, request: RunRequest) -> RunOutcome {
        let state = self.lock();
        match state.displayed {
            Some(kind) => self.run_locked(&state, kind, &request),
            None => RunOutcome::NothingSelected,
        }
    }

    /// Runs `kind` against the current item whether or not it is displayed.
    pub fn run(&self, kind: PipelineKind, request: RunRequest) -> RunOutcome {
        let state = self.lock();
        self.run_locked(&state, kind, &request)
    }

    fn run_locked(
        &self,
        state: &OrchestratorState,
        kind: PipelineKind,
        request: &RunRequest,
    ) -> RunOutcome {
        let Some(item) = state.current_item.as_ref() else {
            return RunOutcome::NoContentItem;
        };
        if !kind.is_available_for(item.source_type) {
            return RunOutcome::Unavailable(kind);
        }
        self.pipelines.get(kind).run(item, request)
    }

    pub fn current_item(&self) -> Option<ContentItem> {
        self.lock().current_item.clone()
    }

    pub fn content_id(&self) -> Option<String> {
        self.lock().content_id().map(str::to_string)
    }

    /// Pipelines that apply to the current item, in display order.
    pub fn available_pipelines(&self) -> Vec<PipelineKind> {
        let state = self.lock();
        PipelineKind::ALL
            .into_iter()
            .filter(|kind| state.is_available(*kind))
            .collect()
    }

    pub fn snapshot(&self, kind: PipelineKind) -> PipelineSnapshot {
        self.pipelines.get(kind).snapshot()
    }

    pub fn snapshots(&self) -> BTreeMap<PipelineKind, PipelineSnapshot> {
        self.pipelines
            .iter()
            .map(|runtime| (runtime.kind(), runtime.snapshot()))
            .collect()
    }

    /// Snapshot of the displayed pipeline, if any.
    pub fn displayed_snapshot(&self) -> Option<PipelineSnapshot> {
        self.displayed().map(|kind| self.snapshot(kind))
    }

    /// Typed access to each runtime.
    pub fn pipelines(&self) -> &PipelineSet {
        &self.pipelines
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryCache;
    use crate::content::SourceType;
    use crate::error::AnalysisError;
    use crate::pipeline::PipelineStatus;
    use async_trait::async_trait;
    use serde_json::Value;

    struct Unreachable;

    #[async_trait]
    impl AnalysisBackend for Unreachable {
        async fn analyze(&self, kind: PipelineKind, _: Value) -> Result<Value, AnalysisError> {
            Err(AnalysisError::request(format!("{} is offline", kind)))
        }
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(
            Arc::new(Unreachable),
            Arc::new(MemoryCache::default()),
            RuntimeSettings::default(),
        )
    }

    #[test]
    fn test_available_pipelines_by_source() {
        let orch = orchestrator();
        assert!(orch.available_pipelines().is_empty());

        orch.set_content_item(ContentItem::document("doc", SourceType::Pdf, "text"));
        let available = orch.available_pipelines();
        assert_eq!(available.len(), 5);
        assert!(!available.contains(&PipelineKind::Health));

        orch.set_content_item(ContentItem::youtube("dQw4w9WgXcQ", "text").unwrap());
        assert_eq!(orch.available_pipelines().len(), 6);
    }

    #[test]
    fn test_select_requires_item() {
        let orch = orchestrator();
        assert!(!orch.select(PipelineKind::Summary));
        assert_eq!(orch.displayed(), None);
        assert!(matches!(
            orch.run_selected(RunRequest::new()),
            RunOutcome::NothingSelected
        ));
        assert!(matches!(
            orch.run(PipelineKind::Summary, RunRequest::new()),
            RunOutcome::NoContentItem
        ));
    }

    #[test]
    fn test_same_id_keeps_display() {
        let orch = orchestrator();
        let first = orch.set_content_item(ContentItem::document("doc", SourceType::Text, ""));
        assert!(orch.select(PipelineKind::Rhetorical));

        let second = orch.set_content_item(
            ContentItem::document("doc", SourceType::Text, "now with text").with_title("Doc"),
        );
        assert_eq!(first, second);
        assert_eq!(orch.displayed(), Some(PipelineKind::Rhetorical));
        assert_eq!(
            orch.current_item().and_then(|i| i.title),
            Some("Doc".to_string())
        );
    }

    #[test]
    fn test_validation_failure_never_loads() {
        let orch = orchestrator();
        orch.set_content_item(ContentItem::document("doc", SourceType::Text, ""));
        orch.select(PipelineKind::Summary);

        let outcome = orch.run_selected(RunRequest::new());
        assert!(matches!(outcome, RunOutcome::Rejected(AnalysisError::Validation(_))));
        let snapshot = orch.snapshot(PipelineKind::Summary);
        assert_eq!(snapshot.status, PipelineStatus::Error);
        assert!(snapshot.error.is_some());
    }

    #[test]
    fn test_run_without_async_runtime_does_not_panic() {
        let orch = orchestrator();
        orch.set_content_item(ContentItem::document("doc", SourceType::Text, "text"));
        orch.select(PipelineKind::Discovery);

        assert!(matches!(
            orch.run_selected(RunRequest::new()),
            RunOutcome::NoAsyncRuntime
        ));
        assert_eq!(
            orch.snapshot(PipelineKind::Discovery).status,
            PipelineStatus::Idle
        );
    }

    #[test]
    fn test_clear_content_item() {
        let orch = orchestrator();
        orch.set_content_item(ContentItem::document("doc", SourceType::Web, "text"));
        orch.select(PipelineKind::Prompts);

        orch.clear_content_item();
        assert_eq!(orch.current_item(), None);
        assert_eq!(orch.displayed(), None);
        assert!(orch
            .snapshots()
            .values()
            .all(|s| s.status == PipelineStatus::Idle));
    }
}
