//! Simulated progress for long-running analyses.
//!
//! The analysis service does not stream progress, so each multi-phase
//! pipeline gets a fixed phase script that is advanced on a timer while
//! the request is outstanding. The script never reaches 100%: completion
//! is signalled only by the run resolving. Once the script runs out the
//! last phase stalls at or below the configured ceiling.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::kind::{ManipulationMode, PipelineKind};

/// Highest percentage the emitter may ever report.
pub const MAX_CEILING: u8 = 99;

/// Default percentage the last phase stalls at.
pub const DEFAULT_STALL_CEILING: u8 = 95;

/// One progress tick as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub phase: String,
    pub phase_label: String,
    pub percent: u8,
    pub message: String,
}

/// A scripted phase: `percent` moves from `start` to `end` over `ticks` ticks.
#[derive(Debug, Clone, Copy)]
pub struct ProgressPhase {
    pub phase: &'static str,
    pub label: &'static str,
    pub message: &'static str,
    pub start: u8,
    pub end: u8,
    pub ticks: u32,
}

impl ProgressPhase {
    fn update(&self, percent: u8) -> ProgressUpdate {
        ProgressUpdate {
            phase: self.phase.to_string(),
            phase_label: self.label.to_string(),
            percent,
            message: self.message.to_string(),
        }
    }
}

const SUMMARY_PHASES: &[ProgressPhase] = &[
    ProgressPhase {
        phase: "extracting",
        label: "Extracting",
        message: "Reading the content and pulling out key points...",
        start: 30,
        end: 70,
        ticks: 1,
    },
    ProgressPhase {
        phase: "generating",
        label: "Generating",
        message: "Writing the summary...",
        start: 70,
        end: 90,
        ticks: 4,
    },
];

const MANIPULATION_DEEP_PHASES: &[ProgressPhase] = &[
    ProgressPhase {
        phase: "extracting",
        label: "Extracting claims",
        message: "Identifying claims and persuasive techniques...",
        start: 5,
        end: 25,
        ticks: 3,
    },
    ProgressPhase {
        phase: "analyzing",
        label: "Analyzing dimensions",
        message: "Scoring the five manipulation dimensions...",
        start: 25,
        end: 55,
        ticks: 6,
    },
    ProgressPhase {
        phase: "verifying",
        label: "Verifying claims",
        message: "Cross-checking factual claims...",
        start: 55,
        end: 80,
        ticks: 8,
    },
    ProgressPhase {
        phase: "scoring",
        label: "Scoring",
        message: "Computing the overall trust score...",
        start: 80,
        end: 92,
        ticks: 6,
    },
];

const DISCOVERY_PHASES: &[ProgressPhase] = &[
    ProgressPhase {
        phase: "extracting",
        label: "Extracting concepts",
        message: "Extracting core concepts...",
        start: 5,
        end: 20,
        ticks: 3,
    },
    ProgressPhase {
        phase: "connecting",
        label: "Finding connections",
        message: "Mapping connections to other domains...",
        start: 20,
        end: 60,
        ticks: 8,
    },
    ProgressPhase {
        phase: "synthesizing",
        label: "Synthesizing",
        message: "Synthesizing cross-domain insights...",
        start: 60,
        end: 90,
        ticks: 8,
    },
];

const HEALTH_PHASES: &[ProgressPhase] = &[
    ProgressPhase {
        phase: "downloading",
        label: "Downloading",
        message: "Downloading the video...",
        start: 5,
        end: 20,
        ticks: 4,
    },
    ProgressPhase {
        phase: "extracting",
        label: "Extracting frames",
        message: "Extracting frames for analysis...",
        start: 20,
        end: 40,
        ticks: 5,
    },
    ProgressPhase {
        phase: "detecting",
        label: "Detecting",
        message: "Detecting faces and posture...",
        start: 40,
        end: 65,
        ticks: 6,
    },
    ProgressPhase {
        phase: "analyzing",
        label: "Analyzing",
        message: "Analyzing visual health observations...",
        start: 65,
        end: 92,
        ticks: 10,
    },
];

const PROMPTS_PHASES: &[ProgressPhase] = &[
    ProgressPhase {
        phase: "analyzing",
        label: "Analyzing content",
        message: "Analyzing the content...",
        start: 5,
        end: 30,
        ticks: 3,
    },
    ProgressPhase {
        phase: "generating",
        label: "Generating prompts",
        message: "Generating prompts...",
        start: 30,
        end: 75,
        ticks: 8,
    },
    ProgressPhase {
        phase: "refining",
        label: "Refining",
        message: "Refining and ranking prompts...",
        start: 75,
        end: 92,
        ticks: 6,
    },
];

/// Ordered phase list for one pipeline run.
#[derive(Debug, Clone, Copy)]
pub struct ProgressScript {
    kind: PipelineKind,
    phases: &'static [ProgressPhase],
}

impl ProgressScript {
    /// Script for a run, or `None` for single-shot runs
    /// (rhetorical, quick manipulation).
    pub fn for_run(kind: PipelineKind, mode: Option<ManipulationMode>) -> Option<Self> {
        let phases = match kind {
            PipelineKind::Rhetorical => return None,
            PipelineKind::Manipulation => match mode.unwrap_or_default() {
                ManipulationMode::Quick => return None,
                ManipulationMode::Deep => MANIPULATION_DEEP_PHASES,
            },
            PipelineKind::Summary => SUMMARY_PHASES,
            PipelineKind::Discovery => DISCOVERY_PHASES,
            PipelineKind::Health => HEALTH_PHASES,
            PipelineKind::Prompts => PROMPTS_PHASES,
        };
        Some(Self { kind, phases })
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    pub fn phases(&self) -> &'static [ProgressPhase] {
        self.phases
    }

    /// Number of ticks before the script stalls.
    pub fn scripted_ticks(&self) -> u32 {
        self.phases.iter().map(|p| p.ticks.max(1)).sum()
    }

    /// Progress after `tick` ticks. Never above `ceiling` (capped at [`MAX_CEILING`]).
    pub fn update_at(&self, tick: u32, ceiling: u8) -> ProgressUpdate {
        let ceiling = ceiling.min(MAX_CEILING);
        let mut remaining = tick;

        for phase in self.phases {
            let ticks = phase.ticks.max(1);
            if remaining < ticks {
                let span = u32::from(phase.end.saturating_sub(phase.start));
                let percent = u32::from(phase.start) + span * remaining / ticks;
                return phase.update(percent.min(u32::from(ceiling)) as u8);
            }
            remaining -= ticks;
        }

        match self.phases.last() {
            Some(last) => last.update(last.end.min(ceiling)),
            None => ProgressUpdate {
                phase: "working".to_string(),
                phase_label: "Working".to_string(),
                percent: 0,
                message: format!("Running {}...", self.kind),
            },
        }
    }
}

/// Drives a [`ProgressScript`] on a fixed interval.
#[derive(Debug, Clone, Copy)]
pub struct ProgressEmitter {
    interval: Duration,
    ceiling: u8,
}

impl Default for ProgressEmitter {
    fn default() -> Self {
        Self::new(Duration::from_millis(2500), DEFAULT_STALL_CEILING)
    }
}

impl ProgressEmitter {
    pub fn new(interval: Duration, ceiling: u8) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            ceiling: ceiling.min(MAX_CEILING),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn ceiling(&self) -> u8 {
        self.ceiling
    }

    /// First update of a run, published synchronously when loading starts.
    pub fn initial(&self, script: &ProgressScript) -> ProgressUpdate {
        script.update_at(0, self.ceiling)
    }

    /// Spawns the ticker on `runtime`. Tick 0 is expected to be published by the caller
    /// via [`Self::initial`]; the ticker starts at tick 1 one interval later.
    ///
    /// `sink` is called only when the update changes. Returning `false`
    /// stops the ticker; dropping the handle aborts it.
    pub fn start<F>(&self, runtime: &Handle, script: ProgressScript, mut sink: F) -> ProgressHandle
    where
        F: FnMut(ProgressUpdate) -> bool + Send + 'static,
    {
        let interval = self.interval;
        let ceiling = self.ceiling;

        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of a tokio interval completes immediately.
            ticker.tick().await;

            let mut last = script.update_at(0, ceiling);
            let mut tick: u32 = 1;
            loop {
                ticker.tick().await;
                let update = script.update_at(tick, ceiling);
                tick = tick.saturating_add(1);

                if update == last {
                    continue;
                }
                if !sink(update.clone()) {
                    break;
                }
                last = update;
            }
        });

        ProgressHandle { task }
    }
}

/// Owner of a running ticker. The ticker is aborted when this is dropped,
/// so a ticker cannot outlive the loading state that holds it.
#[derive(Debug)]
pub struct ProgressHandle {
    task: JoinHandle<()>,
}

impl ProgressHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ProgressHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
