//! Builders for content items, cache records and orchestrators.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use discern::backend::{AnalysisBackend, CacheRecord, ResultCache};
use discern::pipeline::progress::DEFAULT_STALL_CEILING;
use discern::{ContentItem, Orchestrator, RuntimeSettings, SourceType};

use super::harness::{MockBackend, RecordingCache};

/// Tick interval used by tests; tests that care run with paused time.
pub const TEST_TICK: Duration = Duration::from_millis(2500);

pub fn settings() -> RuntimeSettings {
    RuntimeSettings {
        progress_interval: TEST_TICK,
        stall_ceiling: DEFAULT_STALL_CEILING,
        event_capacity: 1024,
    }
}

/// A YouTube item with a transcript. `id` must be an 11-character video id.
pub fn video(id: &str) -> ContentItem {
    ContentItem::youtube(id, format!("transcript of {}", id))
        .unwrap()
        .with_title(format!("Video {}", id))
}

pub fn document(id: &str, source_type: SourceType) -> ContentItem {
    ContentItem::document(id, source_type, format!("text of {}", id))
}

pub fn record(content_id: &str, wire: Value) -> CacheRecord {
    CacheRecord::from_wire(content_id, wire).unwrap()
}

/// An orchestrator wired to the given mocks.
pub fn orchestrator(backend: &Arc<MockBackend>, cache: &Arc<RecordingCache>) -> Arc<Orchestrator> {
    let backend: Arc<dyn AnalysisBackend> = backend.clone();
    let cache: Arc<dyn ResultCache> = cache.clone();
    Arc::new(Orchestrator::new(backend, cache, settings()))
}
