use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AnalysisError, ErrorKind};

use super::kind::{ManipulationMode, PipelineKind};
use super::progress::ProgressUpdate;

/// Lifecycle status of one pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStatus::Idle => write!(f, "Idle"),
            PipelineStatus::Loading => write!(f, "Loading"),
            PipelineStatus::Success => write!(f, "Success"),
            PipelineStatus::Error => write!(f, "Error"),
        }
    }
}

/// User-visible failure attached to a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&AnalysisError> for PipelineError {
    fn from(err: &AnalysisError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Mutable state of one pipeline for the current content item.
///
/// `result` is kept while a forced re-run is loading and after that run
/// fails, so the last good result stays available.
#[derive(Debug, Clone)]
pub struct PipelineState<T> {
    pub status: PipelineStatus,
    pub result: Option<T>,
    pub error: Option<PipelineError>,
    pub is_from_cache: bool,
    /// Timestamp the cache reported for a hydrated result.
    pub cached_at: Option<DateTime<Utc>>,
    /// When the last fresh run in this session succeeded.
    pub completed_at: Option<DateTime<Utc>>,
    /// Present only while loading, and only for multi-phase runs.
    pub progress: Option<ProgressUpdate>,
    /// Manipulation only.
    pub mode: Option<ManipulationMode>,
}

impl<T> Default for PipelineState<T> {
    fn default() -> Self {
        Self {
            status: PipelineStatus::Idle,
            result: None,
            error: None,
            is_from_cache: false,
            cached_at: None,
            completed_at: None,
            progress: None,
            mode: None,
        }
    }
}

impl<T> PipelineState<T> {
    pub fn is_idle(&self) -> bool {
        self.status == PipelineStatus::Idle
    }

    pub fn is_loading(&self) -> bool {
        self.status == PipelineStatus::Loading
    }
}

impl<T: Serialize> PipelineState<T> {
    /// Type-erased view for renderers.
    pub fn snapshot(&self, kind: PipelineKind) -> PipelineSnapshot {
        let result = self.result.as_ref().and_then(|r| match serde_json::to_value(r) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(kind = %kind.as_str(), error = %e, "Failed to serialize result");
                None
            }
        });

        PipelineSnapshot {
            kind,
            status: self.status,
            result,
            error: self.error.clone(),
            is_from_cache: self.is_from_cache,
            cached_at: self.cached_at,
            completed_at: self.completed_at,
            progress: self.progress.clone(),
            mode: self.mode,
        }
    }
}

/// Serializable snapshot of a pipeline, with the result as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSnapshot {
    pub kind: PipelineKind,
    pub status: PipelineStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PipelineError>,
    pub is_from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressUpdate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ManipulationMode>,
}

impl PipelineSnapshot {
    pub fn idle(kind: PipelineKind) -> Self {
        PipelineState::<Value>::default().snapshot(kind)
    }
}
