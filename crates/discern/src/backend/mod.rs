//! Boundaries to the remote analysis service and the result cache.

pub mod http;
pub mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{CacheBackend, Config};
use crate::content::TranscriptSegment;
use crate::error::{AnalysisError, CacheError, DiscernError};
use crate::pipeline::PipelineKind;

pub use http::{HttpAnalysisClient, HttpResultCache};
pub use memory::MemoryCache;

/// One remote analysis call per pipeline kind.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Sends `body` to the analysis endpoint for `kind` and returns the raw
    /// result payload.
    async fn analyze(&self, kind: PipelineKind, body: Value) -> Result<Value, AnalysisError>;
}

/// Key-value store of pipeline results, keyed by content id.
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Fetches everything cached for `content_id`. A missing record is an
    /// empty [`CacheRecord`], not an error.
    async fn read(&self, content_id: &str) -> Result<CacheRecord, CacheError>;

    /// Persists one freshly computed result.
    async fn write(
        &self,
        content_id: &str,
        kind: PipelineKind,
        result: Value,
    ) -> Result<(), CacheError>;
}

/// A cached result plus the timestamp the cache stored with it.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEntry {
    pub result: Value,
    pub cached_at: Option<DateTime<Utc>>,
}

/// Everything cached for one content item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheRecord {
    pub content_id: String,
    pub entries: HashMap<PipelineKind, CachedEntry>,
    pub transcript: Option<String>,
    pub segments: Option<Vec<TranscriptSegment>>,
}

/// Transcript fields of the wire record.
#[derive(Debug, Default, Deserialize, Serialize)]
struct WireTranscript {
    #[serde(default)]
    transcript: Option<String>,
    #[serde(default)]
    segments: Option<Vec<TranscriptSegment>>,
}

impl CacheRecord {
    pub fn empty(content_id: impl Into<String>) -> Self {
        Self {
            content_id: content_id.into(),
            ..Default::default()
        }
    }

    /// Parses the cache service's record format: one slot per pipeline,
    /// each with an optional `<slot>_date` timestamp. Null slots are treated
    /// as not cached.
    pub fn from_wire(content_id: impl Into<String>, value: Value) -> Result<Self, CacheError> {
        let content_id = content_id.into();
        let object = match value {
            Value::Object(map) => map,
            Value::Null => return Ok(Self::empty(content_id)),
            other => {
                return Err(CacheError::Decode(format!(
                    "expected an object for '{}', got {}",
                    content_id,
                    json_type(&other)
                )))
            }
        };

        let mut entries = HashMap::new();
        for kind in PipelineKind::ALL {
            let result = match object.get(kind.cache_slot()) {
                Some(Value::Null) | None => continue,
                Some(result) => result.clone(),
            };
            let cached_at = parse_cached_at(&object, kind, &content_id);
            entries.insert(kind, CachedEntry { result, cached_at });
        }

        let wire: WireTranscript = serde_json::from_value(Value::Object(Map::from_iter(
            ["transcript", "segments"]
                .into_iter()
                .filter_map(|key| object.get(key).map(|v| (key.to_string(), v.clone()))),
        )))
        .map_err(|e| CacheError::Decode(format!("transcript fields for '{}': {}", content_id, e)))?;

        Ok(Self {
            content_id,
            entries,
            transcript: wire.transcript.filter(|t| !t.trim().is_empty()),
            segments: wire.segments,
        })
    }

    /// Serialises the record back to the cache service's format.
    pub fn to_wire(&self) -> Value {
        let mut object = Map::new();
        for (kind, entry) in &self.entries {
            object.insert(kind.cache_slot().to_string(), entry.result.clone());
            if let Some(cached_at) = entry.cached_at {
                object.insert(kind.cache_date_key(), Value::String(cached_at.to_rfc3339()));
            }
        }
        if let Some(transcript) = &self.transcript {
            object.insert("transcript".to_string(), Value::String(transcript.clone()));
        }
        if let Some(segments) = &self.segments {
            if let Ok(value) = serde_json::to_value(segments) {
                object.insert("segments".to_string(), value);
            }
        }
        Value::Object(object)
    }

    pub fn entry(&self, kind: PipelineKind) -> Option<&CachedEntry> {
        self.entries.get(&kind)
    }

    pub fn insert(&mut self, kind: PipelineKind, result: Value, cached_at: DateTime<Utc>) {
        self.entries.insert(
            kind,
            CachedEntry {
                result,
                cached_at: Some(cached_at),
            },
        );
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Kinds with a cached result, in [`PipelineKind::ALL`] order.
    pub fn cached_kinds(&self) -> Vec<PipelineKind> {
        PipelineKind::ALL
            .into_iter()
            .filter(|k| self.entries.contains_key(k))
            .collect()
    }
}

fn parse_cached_at(
    object: &Map<String, Value>,
    kind: PipelineKind,
    content_id: &str,
) -> Option<DateTime<Utc>> {
    let raw = object.get(&kind.cache_date_key())?.as_str()?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => {
            tracing::warn!(
                kind = %kind.as_str(),
                content_id = %content_id,
                error = %e,
                "Dropping unparsable cache timestamp"
            );
            None
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Builds the analysis client and result cache described by `config`.
pub fn from_config(
    config: &Config,
) -> Result<(Arc<dyn AnalysisBackend>, Arc<dyn ResultCache>), DiscernError> {
    let api_key = crate::secrets::resolve_api_key(&config.api)?;
    let client = HttpAnalysisClient::new(&config.api, api_key.clone())?;

    let cache: Arc<dyn ResultCache> = match config.cache.backend {
        CacheBackend::Http => Arc::new(HttpResultCache::new(&config.api, api_key)?),
        CacheBackend::Memory => Arc::new(MemoryCache::from_config(&config.cache)),
    };

    Ok((Arc::new(client), cache))
}
