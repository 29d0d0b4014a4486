//! In-process result cache for offline sessions and tests.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use moka::sync::Cache;
use serde_json::Value;

use super::{CacheRecord, ResultCache};
use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::pipeline::PipelineKind;

/// Cache records held in memory with a time-to-live and a record cap.
#[derive(Clone)]
pub struct MemoryCache {
    records: Cache<String, CacheRecord>,
}

impl MemoryCache {
    pub fn new(ttl: Duration, capacity: u64) -> Self {
        Self {
            records: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            Duration::from_secs(config.memory_ttl_secs),
            config.memory_capacity,
        )
    }

    /// Stores a whole record, replacing anything cached for its content id.
    pub fn seed(&self, record: CacheRecord) {
        self.records.insert(record.content_id.clone(), record);
    }

    pub fn invalidate(&self, content_id: &str) {
        self.records.invalidate(content_id);
    }

    pub fn contains(&self, content_id: &str) -> bool {
        self.records.contains_key(content_id)
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

#[async_trait]
impl ResultCache for MemoryCache {
    async fn read(&self, content_id: &str) -> Result<CacheRecord, CacheError> {
        Ok(self
            .records
            .get(content_id)
            .unwrap_or_else(|| CacheRecord::empty(content_id)))
    }

    async fn write(
        &self,
        content_id: &str,
        kind: PipelineKind,
        result: Value,
    ) -> Result<(), CacheError> {
        // Merged under the entry lock so concurrent slot writes don't race.
        self.records
            .entry(content_id.to_string())
            .and_upsert_with(|existing| {
                let mut record = existing
                    .map(|entry| entry.into_value())
                    .unwrap_or_else(|| CacheRecord::empty(content_id));
                record.insert(kind, result, Utc::now());
                record
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_record_is_empty() {
        let cache = MemoryCache::default();
        let record = cache.read("nothing").await.unwrap();
        assert!(record.is_empty());
        assert_eq!(record.content_id, "nothing");
    }

    #[tokio::test]
    async fn test_write_then_read_merges_slots() {
        let cache = MemoryCache::default();
        cache
            .write("v1", PipelineKind::Summary, json!({ "tldr": "x" }))
            .await
            .unwrap();
        cache
            .write("v1", PipelineKind::Rhetorical, json!({ "overall_score": 50 }))
            .await
            .unwrap();

        let record = cache.read("v1").await.unwrap();
        assert_eq!(
            record.cached_kinds(),
            vec![PipelineKind::Rhetorical, PipelineKind::Summary]
        );
        assert!(record.entry(PipelineKind::Summary).unwrap().cached_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_slot_writes_are_all_kept() {
        let cache = MemoryCache::default();
        for round in 0..50 {
            let content_id = format!("v{}", round);
            let writers: Vec<_> = PipelineKind::ALL
                .into_iter()
                .map(|kind| {
                    let cache = cache.clone();
                    let content_id = content_id.clone();
                    tokio::spawn(async move {
                        cache
                            .write(&content_id, kind, json!({ "kind": kind.as_str() }))
                            .await
                    })
                })
                .collect();
            for writer in writers {
                writer.await.unwrap().unwrap();
            }

            let record = cache.read(&content_id).await.unwrap();
            assert_eq!(record.cached_kinds(), PipelineKind::ALL.to_vec());
        }
    }

    #[tokio::test]
    async fn test_seed_and_invalidate() {
        let cache = MemoryCache::new(Duration::from_secs(60), 8);
        let mut record = CacheRecord::empty("v2");
        record.transcript = Some("hello".to_string());
        cache.seed(record);
        assert!(cache.contains("v2"));

        cache.invalidate("v2");
        assert!(!cache.contains("v2"));
    }
}
