//! The content item every analysis pipeline runs against.

pub mod youtube;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Where a content item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Youtube,
    Pdf,
    Web,
    Text,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::Youtube => write!(f, "YouTube video"),
            SourceType::Pdf => write!(f, "PDF"),
            SourceType::Web => write!(f, "web article"),
            SourceType::Text => write!(f, "pasted text"),
        }
    }
}

/// A time-coded span of a video transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Start offset in seconds.
    pub start: f64,
    /// Duration in seconds.
    #[serde(default)]
    pub duration: f64,
    pub text: String,
}

/// The subject being analyzed. `id` is the cache key for every pipeline result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    /// Video id for YouTube sources, upload id otherwise.
    pub id: String,
    pub source_type: SourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Extracted transcript or document text.
    #[serde(default)]
    pub raw_text: String,
    /// Only present for YouTube sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<TranscriptSegment>>,
}

impl ContentItem {
    /// Creates a non-video item (PDF, web article, pasted text).
    pub fn document(id: impl Into<String>, source_type: SourceType, raw_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_type,
            title: None,
            source_url: None,
            raw_text: raw_text.into(),
            segments: None,
        }
    }

    /// Creates a YouTube item from a video id or URL.
    pub fn youtube(url_or_id: &str, raw_text: impl Into<String>) -> Result<Self, AnalysisError> {
        let video_id = youtube::extract_video_id(url_or_id).ok_or_else(|| {
            AnalysisError::validation(format!("'{}' is not a YouTube video URL or id", url_or_id))
        })?;

        Ok(Self {
            source_url: Some(youtube::watch_url(&video_id)),
            id: video_id,
            source_type: SourceType::Youtube,
            title: None,
            raw_text: raw_text.into(),
            segments: None,
        })
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Attaches transcript segments; ignored for non-video sources.
    pub fn with_segments(mut self, segments: Vec<TranscriptSegment>) -> Self {
        if self.is_video() {
            if self.raw_text.trim().is_empty() {
                self.raw_text = join_segments(&segments);
            }
            self.segments = Some(segments);
        }
        self
    }

    pub fn is_video(&self) -> bool {
        self.source_type == SourceType::Youtube
    }

    pub fn has_text(&self) -> bool {
        !self.raw_text.trim().is_empty()
    }

    /// The video id, if this item is a YouTube video.
    pub fn video_id(&self) -> Option<&str> {
        self.is_video().then_some(self.id.as_str())
    }

    /// Text to analyze, or a validation error naming what is missing.
    pub fn require_text(&self) -> Result<&str, AnalysisError> {
        if self.has_text() {
            Ok(self.raw_text.as_str())
        } else {
            Err(AnalysisError::validation(format!(
                "No transcript or text is available for this {}",
                self.source_type
            )))
        }
    }
}

/// Joins segment texts into a single transcript string.
pub fn join_segments(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
