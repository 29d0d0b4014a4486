//! State-change events for whatever renders pipeline state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::kind::PipelineKind;
use super::progress::ProgressUpdate;
use super::state::{PipelineError, PipelineStatus};

/// A pipeline changed status or progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineEvent {
    pub content_id: String,
    pub kind: PipelineKind,
    pub status: PipelineStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressUpdate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PipelineError>,
    pub is_from_cache: bool,
    pub timestamp: DateTime<Utc>,
}

/// Everything the orchestrator announces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    /// The current content item changed or was cleared.
    ContentChanged { content_id: Option<String> },
    /// The displayed pipeline changed.
    DisplayChanged { displayed: Option<PipelineKind> },
    Pipeline(PipelineEvent),
}

impl OrchestratorEvent {
    pub fn pipeline(&self) -> Option<&PipelineEvent> {
        match self {
            OrchestratorEvent::Pipeline(event) => Some(event),
            _ => None,
        }
    }
}

/// Broadcasts orchestrator events to any number of subscribers.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: Arc<broadcast::Sender<OrchestratorEvent>>,
}

impl EventBroadcaster {
    /// Creates a broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends an event to all subscribers.
    pub fn send(&self, event: OrchestratorEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
