use super::{episodes_from_feed, DiscoverSource};
use crate::fetcher::Fetcher;
use crate::types::{Episode, PipelineError, Result, SourceDescriptor};
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

/// Discovery adapter for YouTube channels. A channel's uploads are exposed
/// as an Atom feed at `videos.xml`, so after resolving the @handle to a
/// channel id this reduces to ordinary feed parsing — no API key involved.
pub struct ChannelDiscovery {
    fetcher: Arc<Fetcher>,
    re_channel_id: Regex,
}

impl ChannelDiscovery {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self {
            fetcher,
            re_channel_id: Regex::new(r#""channelId"\s*:\s*"(UC[0-9A-Za-z_-]{22})""#)
                .expect("static regex"),
        }
    }

    /// Accepts a raw `UC…` id directly; otherwise scrapes the channel page
    /// for its id.
    async fn resolve_channel_id(&self, locator: &str, source_name: &str) -> Result<String> {
        let locator = locator.trim();
        if locator.starts_with("UC") && locator.len() == 24 {
            return Ok(locator.to_string());
        }

        let handle = locator.trim_start_matches('@');
        let page_url = format!("https://www.youtube.com/@{}", handle);
        let page = self.fetcher.fetch_text(&page_url).await.map_err(|e| {
            PipelineError::Discovery(format!(
                "cannot fetch channel page for '{}': {}",
                source_name, e
            ))
        })?;

        self.re_channel_id
            .captures(&page)
            .map(|cap| cap[1].to_string())
            .ok_or_else(|| {
                PipelineError::Discovery(format!(
                    "no channel id found for '{}' (handle @{})",
                    source_name, handle
                ))
            })
    }
}

#[async_trait]
impl DiscoverSource for ChannelDiscovery {
    async fn discover(&self, descriptor: &SourceDescriptor) -> Result<Vec<Episode>> {
        let channel_id = self
            .resolve_channel_id(&descriptor.locator, &descriptor.name)
            .await?;
        debug!("Channel '{}' resolved to {}", descriptor.name, channel_id);

        let feed_url = format!(
            "https://www.youtube.com/feeds/videos.xml?channel_id={}",
            channel_id
        );
        let content = self.fetcher.fetch_text(&feed_url).await.map_err(|e| {
            PipelineError::Discovery(format!(
                "cannot fetch uploads feed for '{}': {}",
                descriptor.name, e
            ))
        })?;

        episodes_from_feed(&content, descriptor)
    }
}
