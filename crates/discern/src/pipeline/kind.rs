use serde::{Deserialize, Serialize};

use crate::content::SourceType;

/// The six analysis pipelines that can run against a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    Rhetorical,
    Manipulation,
    Summary,
    Discovery,
    Health,
    Prompts,
}

impl PipelineKind {
    pub const ALL: [PipelineKind; 6] = [
        PipelineKind::Rhetorical,
        PipelineKind::Manipulation,
        PipelineKind::Summary,
        PipelineKind::Discovery,
        PipelineKind::Health,
        PipelineKind::Prompts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::Rhetorical => "rhetorical",
            PipelineKind::Manipulation => "manipulation",
            PipelineKind::Summary => "summary",
            PipelineKind::Discovery => "discovery",
            PipelineKind::Health => "health",
            PipelineKind::Prompts => "prompts",
        }
    }

    /// Field name of this pipeline's result on a cache record.
    pub fn cache_slot(&self) -> &'static str {
        match self {
            PipelineKind::Rhetorical => "rhetorical_analysis",
            PipelineKind::Manipulation => "manipulation_analysis",
            PipelineKind::Summary => "summary",
            PipelineKind::Discovery => "discovery_analysis",
            PipelineKind::Health => "health_analysis",
            PipelineKind::Prompts => "ai_prompts",
        }
    }

    /// Field name of the timestamp stored next to [`Self::cache_slot`].
    pub fn cache_date_key(&self) -> String {
        format!("{}_date", self.cache_slot())
    }

    /// Path segments of the analysis endpoint under the service base URL.
    pub fn endpoint_path(&self) -> [&'static str; 3] {
        ["api", "analyze", self.as_str()]
    }

    /// Static availability predicate over (source type, pipeline kind).
    /// Health analysis inspects video frames, so it needs a YouTube source.
    pub fn is_available_for(&self, source: SourceType) -> bool {
        match self {
            PipelineKind::Health => source == SourceType::Youtube,
            _ => true,
        }
    }
}

impl std::fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineKind::Rhetorical => write!(f, "Rhetorical analysis"),
            PipelineKind::Manipulation => write!(f, "Manipulation analysis"),
            PipelineKind::Summary => write!(f, "Summary"),
            PipelineKind::Discovery => write!(f, "Discovery"),
            PipelineKind::Health => write!(f, "Health observations"),
            PipelineKind::Prompts => write!(f, "AI prompts"),
        }
    }
}

impl std::str::FromStr for PipelineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown pipeline kind '{}'", s))
    }
}

/// Depth of a manipulation analysis. Deep mode runs multi-phase and may
/// take minutes; quick mode is a single call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManipulationMode {
    #[default]
    Quick,
    Deep,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_slots_are_unique() {
        let slots: HashSet<_> = PipelineKind::ALL.iter().map(|k| k.cache_slot()).collect();
        assert_eq!(slots.len(), 6);
    }

    #[test]
    fn test_health_needs_youtube() {
        assert!(PipelineKind::Health.is_available_for(SourceType::Youtube));
        assert!(!PipelineKind::Health.is_available_for(SourceType::Pdf));
        assert!(!PipelineKind::Health.is_available_for(SourceType::Text));
        for source in [SourceType::Pdf, SourceType::Web, SourceType::Text] {
            assert!(PipelineKind::Summary.is_available_for(source));
            assert!(PipelineKind::Manipulation.is_available_for(source));
        }
    }

    #[test]
    fn test_parse_and_serialize() {
        assert_eq!("prompts".parse::<PipelineKind>(), Ok(PipelineKind::Prompts));
        assert!("nope".parse::<PipelineKind>().is_err());
        assert_eq!(
            serde_json::to_value(PipelineKind::Manipulation).unwrap(),
            "manipulation"
        );
        assert_eq!(
            PipelineKind::Discovery.endpoint_path(),
            ["api", "analyze", "discovery"]
        );
        assert_eq!(PipelineKind::Prompts.cache_date_key(), "ai_prompts_date");
    }
}
