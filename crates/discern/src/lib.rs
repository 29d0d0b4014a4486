//! Orchestrates six concurrent AI analysis pipelines over one content item.
//!
//! The [`Orchestrator`] owns a runtime per pipeline, hydrates them from the
//! result cache, and tracks which one is displayed. Each runtime moves
//! through `idle -> loading -> success | error` on its own; results from
//! runs that were superseded by a reset or an item change are discarded.

pub mod backend;
pub mod config;
pub mod content;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod sanitize;
pub mod secrets;
pub mod telemetry;

pub use backend::{AnalysisBackend, CacheRecord, CachedEntry, MemoryCache, ResultCache};
pub use config::{load_config, Config};
pub use content::{ContentItem, SourceType, TranscriptSegment};
pub use error::{AnalysisError, CacheError, ConfigError, DiscernError, ErrorKind, Result};
pub use orchestrator::{ContentLoader, HydrationReport, ItemToken, Orchestrator, PipelineSet};
pub use pipeline::{
    AnalysisOptions, ManipulationMode, OrchestratorEvent, PipelineKind, PipelineSnapshot,
    PipelineStatus, RunOutcome, RunRequest, RunResolution, RuntimeSettings,
};
pub use secrets::SecretError;
