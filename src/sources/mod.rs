pub mod channel;
pub mod feed;

pub use channel::ChannelDiscovery;
pub use feed::FeedDiscovery;

use crate::fetcher::Fetcher;
use crate::types::{Episode, Result, SourceDescriptor, SourceKind};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

/// Capability contract for item discovery: given a source descriptor,
/// produce its newest items, newest first. Finite and restartable — the
/// adapter is re-invoked fresh on every run.
///
/// The descriptor's title filter and max-items cap are applied here, before
/// yielding, so the coordinator never needs adapter-specific knowledge.
#[async_trait]
pub trait DiscoverSource: Send + Sync {
    async fn discover(&self, descriptor: &SourceDescriptor) -> Result<Vec<Episode>>;
}

/// A source descriptor paired with the adapter chosen for its kind. The
/// kind match happens exactly once, here at registration time.
#[derive(Clone)]
pub struct RegisteredSource {
    pub descriptor: SourceDescriptor,
    pub adapter: Arc<dyn DiscoverSource>,
}

/// Bind each descriptor to its discovery adapter.
pub fn register(
    descriptors: Vec<SourceDescriptor>,
    fetcher: Arc<Fetcher>,
) -> Vec<RegisteredSource> {
    let feed = Arc::new(FeedDiscovery::new(fetcher.clone()));
    let channel = Arc::new(ChannelDiscovery::new(fetcher));

    descriptors
        .into_iter()
        .map(|descriptor| {
            let adapter: Arc<dyn DiscoverSource> = match descriptor.kind {
                SourceKind::Feed => feed.clone(),
                SourceKind::Channel => channel.clone(),
            };
            RegisteredSource { descriptor, adapter }
        })
        .collect()
}

/// Shared RSS/Atom handling: both adapters ultimately read a feed document
/// (YouTube channels expose one at `videos.xml`).
pub(crate) fn episodes_from_feed(
    content: &str,
    descriptor: &SourceDescriptor,
) -> Result<Vec<Episode>> {
    let feed = feed_rs::parser::parse(content.as_bytes()).map_err(|e| {
        crate::types::PipelineError::Discovery(format!(
            "cannot parse feed for '{}': {}",
            descriptor.name, e
        ))
    })?;

    let mut episodes = Vec::new();
    for entry in feed.entries {
        let title = match entry.title {
            Some(t) if !t.content.trim().is_empty() => t.content.trim().to_string(),
            _ => continue,
        };
        // RSS 2.0 has a plain link; Atom marks the canonical one "alternate".
        let url = entry
            .links
            .iter()
            .find(|l| l.rel.as_deref() == Some("alternate"))
            .or_else(|| entry.links.first())
            .map(|l| l.href.clone());
        let Some(url) = url else { continue };

        if let Some(filter) = &descriptor.title_filter {
            if !title.to_lowercase().contains(&filter.to_lowercase()) {
                continue;
            }
        }

        episodes.push(Episode {
            title,
            url,
            published: entry
                .published
                .or(entry.updated)
                .map(|dt| dt.with_timezone(&Utc)),
            source: descriptor.name.clone(),
        });

        if episodes.len() >= descriptor.max_items {
            break;
        }
    }

    Ok(episodes)
}
