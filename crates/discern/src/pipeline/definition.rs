//! Static per-pipeline descriptors: request shape, result shape, and how a
//! result is read from and written to the cache record.

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::CacheRecord;
use crate::content::{ContentItem, SourceType, TranscriptSegment};
use crate::error::AnalysisError;

use super::kind::{ManipulationMode, PipelineKind};
use super::results::{
    ContentSummary, DiscoveryAnalysis, GeneratedPrompts, HealthObservations, ManipulationAnalysis,
    RhetoricalAnalysis,
};

/// Caller-supplied knobs for a run. Only manipulation reads them today.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOptions {
    #[serde(default)]
    pub manipulation_mode: ManipulationMode,
    #[serde(default)]
    pub verify_claims: bool,
}

impl AnalysisOptions {
    pub fn deep_manipulation(verify_claims: bool) -> Self {
        Self {
            manipulation_mode: ManipulationMode::Deep,
            verify_claims,
        }
    }
}

pub trait PipelineDefinition: Send + Sync + 'static {
    const KIND: PipelineKind;

    /// Request body sent to the analysis endpoint.
    type Request: Serialize + Send + 'static;

    /// Result schema; opaque to the orchestrator.
    type Output: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static;

    /// Builds the request body, or fails validation before any call is made.
    fn build_request(
        item: &ContentItem,
        options: &AnalysisOptions,
    ) -> Result<Self::Request, AnalysisError>;

    /// Manipulation mode the run executes in, if the pipeline has one.
    fn mode(_options: &AnalysisOptions) -> Option<ManipulationMode> {
        None
    }

    /// Reads the service payload. The payload itself is what gets cached.
    fn decode(value: &Value) -> Result<Self::Output, AnalysisError> {
        Self::Output::deserialize(value).map_err(|e| {
            AnalysisError::request(format!("Unexpected {} response: {}", Self::KIND, e))
        })
    }

    /// Reads this pipeline's slot from a cache record.
    ///
    /// `None` when the slot is empty. A slot that fails to decode is
    /// treated as empty and logged.
    fn read_cached(record: &CacheRecord) -> Option<(Self::Output, Option<DateTime<Utc>>)> {
        let entry = record.entry(Self::KIND)?;
        match serde_json::from_value(entry.result.clone()) {
            Ok(output) => Some((output, entry.cached_at)),
            Err(e) => {
                tracing::warn!(
                    kind = %Self::KIND.as_str(),
                    content_id = %record.content_id,
                    error = %e,
                    "Ignoring undecodable cache entry"
                );
                None
            }
        }
    }
}

// ─── Request bodies ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RhetoricalRequest {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub source_type: SourceType,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManipulationRequest {
    pub text: String,
    pub mode: ManipulationMode,
    pub verify_claims: bool,
    pub content_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRequest {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<TranscriptSegment>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRequest {
    pub video_id: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRequest {
    pub video_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptsRequest {
    pub video_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

// ─── Definitions ────────────────────────────────────────────────────────────

pub struct Rhetorical;
pub struct Manipulation;
pub struct Summary;
pub struct Discovery;
pub struct Health;
pub struct Prompts;

impl PipelineDefinition for Rhetorical {
    const KIND: PipelineKind = PipelineKind::Rhetorical;
    type Request = RhetoricalRequest;
    type Output = RhetoricalAnalysis;

    fn build_request(item: &ContentItem, _: &AnalysisOptions) -> Result<Self::Request, AnalysisError> {
        Ok(RhetoricalRequest {
            text: item.require_text()?.to_string(),
            title: item.title.clone(),
            source_type: item.source_type,
        })
    }
}

impl PipelineDefinition for Manipulation {
    const KIND: PipelineKind = PipelineKind::Manipulation;
    type Request = ManipulationRequest;
    type Output = ManipulationAnalysis;

    fn build_request(
        item: &ContentItem,
        options: &AnalysisOptions,
    ) -> Result<Self::Request, AnalysisError> {
        Ok(ManipulationRequest {
            text: item.require_text()?.to_string(),
            mode: options.manipulation_mode,
            // Claim verification is a deep-mode feature.
            verify_claims: options.verify_claims
                && options.manipulation_mode == ManipulationMode::Deep,
            content_id: item.id.clone(),
        })
    }

    fn mode(options: &AnalysisOptions) -> Option<ManipulationMode> {
        Some(options.manipulation_mode)
    }
}

impl PipelineDefinition for Summary {
    const KIND: PipelineKind = PipelineKind::Summary;
    type Request = SummaryRequest;
    type Output = ContentSummary;

    fn build_request(item: &ContentItem, _: &AnalysisOptions) -> Result<Self::Request, AnalysisError> {
        Ok(SummaryRequest {
            text: item.require_text()?.to_string(),
            title: item.title.clone(),
            segments: item.segments.clone(),
        })
    }
}

impl PipelineDefinition for Discovery {
    const KIND: PipelineKind = PipelineKind::Discovery;
    type Request = DiscoveryRequest;
    type Output = DiscoveryAnalysis;

    fn build_request(item: &ContentItem, _: &AnalysisOptions) -> Result<Self::Request, AnalysisError> {
        Ok(DiscoveryRequest {
            video_id: item.id.clone(),
            text: item.require_text()?.to_string(),
        })
    }
}

impl PipelineDefinition for Health {
    const KIND: PipelineKind = PipelineKind::Health;
    type Request = HealthRequest;
    type Output = HealthObservations;

    fn build_request(item: &ContentItem, _: &AnalysisOptions) -> Result<Self::Request, AnalysisError> {
        let video_id = item.video_id().ok_or_else(|| {
            AnalysisError::validation(format!(
                "Health analysis needs a YouTube video, not a {}",
                item.source_type
            ))
        })?;
        Ok(HealthRequest {
            video_id: video_id.to_string(),
        })
    }
}

impl PipelineDefinition for Prompts {
    const KIND: PipelineKind = PipelineKind::Prompts;
    type Request = PromptsRequest;
    type Output = GeneratedPrompts;

    fn build_request(item: &ContentItem, _: &AnalysisOptions) -> Result<Self::Request, AnalysisError> {
        Ok(PromptsRequest {
            video_id: item.id.clone(),
            text: item.require_text()?.to_string(),
            title: item.title.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn video() -> ContentItem {
        ContentItem::youtube("dQw4w9WgXcQ", "transcript text")
            .unwrap()
            .with_title("A talk")
    }

    #[test]
    fn test_health_rejects_documents() {
        let item = ContentItem::document("doc", SourceType::Pdf, "text");
        let err = Health::build_request(&item, &AnalysisOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailure);

        let req = Health::build_request(&video(), &AnalysisOptions::default()).unwrap();
        assert_eq!(req.video_id, "dQw4w9WgXcQ");
    }

    #[test]
    fn test_empty_text_is_validation_failure() {
        let item = ContentItem::document("doc", SourceType::Text, "");
        for result in [
            Rhetorical::build_request(&item, &AnalysisOptions::default()).map(|_| ()),
            Summary::build_request(&item, &AnalysisOptions::default()).map(|_| ()),
            Manipulation::build_request(&item, &AnalysisOptions::default()).map(|_| ()),
        ] {
            assert_eq!(result.unwrap_err().kind(), ErrorKind::ValidationFailure);
        }
    }

    #[test]
    fn test_manipulation_request_shape() {
        let quick = Manipulation::build_request(
            &video(),
            &AnalysisOptions {
                manipulation_mode: ManipulationMode::Quick,
                verify_claims: true,
            },
        )
        .unwrap();
        assert!(!quick.verify_claims);

        let deep =
            Manipulation::build_request(&video(), &AnalysisOptions::deep_manipulation(true)).unwrap();
        let body = serde_json::to_value(&deep).unwrap();
        assert_eq!(body["mode"], "deep");
        assert_eq!(body["verifyClaims"], true);
        assert_eq!(body["contentId"], "dQw4w9WgXcQ");
    }

    #[test]
    fn test_mode_only_for_manipulation() {
        let options = AnalysisOptions::deep_manipulation(false);
        assert_eq!(Manipulation::mode(&options), Some(ManipulationMode::Deep));
        assert_eq!(Summary::mode(&options), None);
    }

    #[test]
    fn test_read_cached_slot() {
        let record = CacheRecord::from_wire(
            "v2",
            json!({
                "manipulation_analysis": { "overall_score": 72 },
                "manipulation_analysis_date": "2026-10-17T12:00:00Z",
                "summary": null
            }),
        )
        .unwrap();

        let (result, cached_at) = Manipulation::read_cached(&record).unwrap();
        assert_eq!(result.overall_score, Some(72.0));
        assert!(cached_at.is_some());
        assert!(Summary::read_cached(&record).is_none());
    }

    #[test]
    fn test_undecodable_cache_entry_is_ignored() {
        let record =
            CacheRecord::from_wire("v3", json!({ "summary": { "tldr": 12 } })).unwrap();
        assert!(Summary::read_cached(&record).is_none());
    }

    #[test]
    fn test_decode_error_is_request_failure() {
        let err = Summary::decode(&json!("not an object")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RequestFailure);
    }
}
