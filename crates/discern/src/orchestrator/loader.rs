//! Content Item Loader: makes an item current, then hydrates it from the cache.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{HydrationReport, ItemToken, Orchestrator};
use crate::backend::ResultCache;
use crate::content::ContentItem;
use crate::error::CacheError;
use crate::sanitize::preview_text;

/// What a load did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub token: ItemToken,
    pub hydration: HydrationReport,
    /// The item's empty text was filled from the cached transcript.
    pub transcript_from_cache: bool,
}

pub struct ContentLoader {
    orchestrator: Arc<Orchestrator>,
    cache: Arc<dyn ResultCache>,
}

impl ContentLoader {
    pub fn new(orchestrator: Arc<Orchestrator>, cache: Arc<dyn ResultCache>) -> Self {
        Self {
            orchestrator,
            cache,
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Sets `item` as current, reads its cache record and hydrates the
    /// runtimes that are still idle.
    ///
    /// The item is current as soon as this is called, so runs may start
    /// before the record arrives. If another item is set while the read is
    /// outstanding, the record is discarded.
    pub async fn load(&self, item: ContentItem) -> Result<LoadReport, CacheError> {
        let token = self.orchestrator.set_content_item(item.clone());

        let record = match self.cache.read(token.content_id()).await {
            Ok(record) => record,
            Err(e) => {
                warn!(content_id = %token.content_id(), error = %e, "Failed to read cache record");
                return Err(e);
            }
        };

        let mut transcript_from_cache = false;
        if !item.has_text() {
            if let Some(transcript) = record.transcript.as_deref() {
                debug!(
                    content_id = %token.content_id(),
                    preview = %preview_text(transcript, 60),
                    "Using cached transcript"
                );
                let mut filled = item;
                filled.raw_text = transcript.to_string();
                if filled.segments.is_none() && filled.is_video() {
                    filled.segments = record.segments.clone();
                }
                transcript_from_cache = self.orchestrator.refresh_content_item(&token, filled);
            }
        }

        let hydration = self.orchestrator.on_cache_loaded_for(&token, &record);
        Ok(LoadReport {
            token,
            hydration,
            transcript_from_cache,
        })
    }
}
