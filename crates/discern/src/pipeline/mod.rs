pub mod definition;
pub mod events;
pub mod kind;
pub mod progress;
pub mod results;
pub mod runtime;
pub mod state;

pub use definition::{
    AnalysisOptions, Discovery, Health, Manipulation, PipelineDefinition, Prompts, Rhetorical,
    Summary,
};
pub use events::{EventBroadcaster, OrchestratorEvent, PipelineEvent};
pub use kind::{ManipulationMode, PipelineKind};
pub use progress::{ProgressEmitter, ProgressHandle, ProgressPhase, ProgressScript, ProgressUpdate};
pub use runtime::{
    ErasedRuntime, HydrateOutcome, PipelineRuntime, RunHandle, RunOutcome, RunRequest,
    RunResolution, RuntimeSettings,
};
pub use state::{PipelineError, PipelineSnapshot, PipelineState, PipelineStatus};
