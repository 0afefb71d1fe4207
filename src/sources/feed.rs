use super::{episodes_from_feed, DiscoverSource};
use crate::fetcher::Fetcher;
use crate::types::{Episode, PipelineError, Result, SourceDescriptor};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Discovery adapter for plain RSS/Atom feed sources.
pub struct FeedDiscovery {
    fetcher: Arc<Fetcher>,
}

impl FeedDiscovery {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl DiscoverSource for FeedDiscovery {
    async fn discover(&self, descriptor: &SourceDescriptor) -> Result<Vec<Episode>> {
        let content = self
            .fetcher
            .fetch_text(&descriptor.locator)
            .await
            .map_err(|e| {
                PipelineError::Discovery(format!(
                    "cannot fetch feed for '{}': {}",
                    descriptor.name, e
                ))
            })?;

        let episodes = episodes_from_feed(&content, descriptor)?;
        debug!(
            "Feed '{}' yielded {} episode(s)",
            descriptor.name,
            episodes.len()
        );
        Ok(episodes)
    }
}
