//! Result schemas returned by the analysis service, one per pipeline.
//!
//! Every field defaults so partial payloads (and older cache entries)
//! still decode, and a `null` scalar reads as its default. Fields this
//! crate does not model are kept in `extra` at every level. The cache
//! stores the service payload itself, not these re-encoded structs.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::kind::ManipulationMode;

/// Reads `null` as the field's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Score and commentary for one rhetorical pillar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PillarScore {
    #[serde(deserialize_with = "null_as_default")]
    pub score: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub analysis: String,
    #[serde(deserialize_with = "null_as_default")]
    pub examples: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RhetoricalPillars {
    pub logos: Option<PillarScore>,
    pub ethos: Option<PillarScore>,
    pub pathos: Option<PillarScore>,
    pub kairos: Option<PillarScore>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RhetoricalAnalysis {
    pub overall_score: Option<f64>,
    #[serde(deserialize_with = "null_as_default")]
    pub pillars: RhetoricalPillars,
    pub summary: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManipulationDimension {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub score: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub evidence: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimCheck {
    #[serde(deserialize_with = "null_as_default")]
    pub claim: String,
    #[serde(deserialize_with = "null_as_default")]
    pub verdict: String,
    #[serde(deserialize_with = "null_as_default")]
    pub sources: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManipulationAnalysis {
    /// Trust score, 0-100.
    pub overall_score: Option<f64>,
    #[serde(deserialize_with = "null_as_default")]
    pub dimensions: Vec<ManipulationDimension>,
    #[serde(deserialize_with = "null_as_default")]
    pub verified_claims: Vec<ClaimCheck>,
    pub mode: Option<ManipulationMode>,
    pub summary: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarySection {
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    /// Offset in seconds for video sources.
    pub timestamp: Option<f64>,
    #[serde(deserialize_with = "null_as_default")]
    pub summary: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentSummary {
    #[serde(deserialize_with = "null_as_default")]
    pub tldr: String,
    #[serde(deserialize_with = "null_as_default")]
    pub key_points: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub sections: Vec<SummarySection>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryInsight {
    #[serde(deserialize_with = "null_as_default")]
    pub domain: String,
    #[serde(deserialize_with = "null_as_default")]
    pub insight: String,
    pub connection: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryAnalysis {
    #[serde(deserialize_with = "null_as_default")]
    pub insights: Vec<DiscoveryInsight>,
    #[serde(deserialize_with = "null_as_default")]
    pub themes: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthObservation {
    #[serde(deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(deserialize_with = "null_as_default")]
    pub observation: String,
    pub confidence: Option<f64>,
    pub frame_timestamp: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthObservations {
    #[serde(deserialize_with = "null_as_default")]
    pub observations: Vec<HealthObservation>,
    pub frames_analyzed: Option<u32>,
    pub disclaimer: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratedPrompt {
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub prompt: String,
    pub category: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratedPrompts {
    #[serde(deserialize_with = "null_as_default")]
    pub prompts: Vec<GeneratedPrompt>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
