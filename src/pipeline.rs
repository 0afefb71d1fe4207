//! The pipeline coordinator: sequences discovery → dedup → extraction →
//! classification → summarization → publish per run, isolating every
//! failure to its own item or source.

use crate::classify::Classifier;
use crate::extract::ExtractContent;
use crate::ledger::{Ledger, LedgerOutcome};
use crate::notify::Notify;
use crate::publish::Publish;
use crate::report::{ItemOutcome, PublishStatus, RunReport};
use crate::sources::{DiscoverSource, RegisteredSource};
use crate::store::{slugify, ArtifactStore};
use crate::summarize::Summarize;
use crate::types::{Episode, PipelineError, Result, RunScope, SourceDescriptor, Stage};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

/// How many characters of extracted text the classifier sees, on top of the
/// title. Keyword hits are front-loaded (titles, intros), so the full
/// transcript is unnecessary.
const CLASSIFY_TEXT_HEAD: usize = 2000;

/// Source name stamped on items summarized from the raw-artifact backlog.
pub const BACKLOG_SOURCE: &str = "backlog";

pub struct Pipeline {
    ledger: Ledger,
    store: ArtifactStore,
    classifier: Classifier,
    extractor: Arc<dyn ExtractContent>,
    summarizer: Option<Arc<dyn Summarize>>,
    publisher: Option<Arc<dyn Publish>>,
    notifier: Option<Arc<dyn Notify>>,
    publish_always: bool,
}

impl Pipeline {
    pub fn new(
        ledger: Ledger,
        store: ArtifactStore,
        classifier: Classifier,
        extractor: Arc<dyn ExtractContent>,
    ) -> Self {
        Self {
            ledger,
            store,
            classifier,
            extractor,
            summarizer: None,
            publisher: None,
            notifier: None,
            publish_always: false,
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarize>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn Publish>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notify>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn publish_always(mut self, always: bool) -> Self {
        self.publish_always = always;
        self
    }

    /// Execute one full run over the registered sources. Returns `Ok` even
    /// when individual items or sources failed — only pre-run conditions
    /// (unknown --source name) are fatal here.
    pub async fn run(&self, sources: &[RegisteredSource], scope: &RunScope) -> Result<RunReport> {
        let mut report = RunReport::new(scope.clone());

        let in_scope: Vec<&RegisteredSource> = match &scope.source {
            Some(name) => {
                let matched: Vec<&RegisteredSource> = sources
                    .iter()
                    .filter(|s| &s.descriptor.name == name)
                    .collect();
                if matched.is_empty() {
                    return Err(PipelineError::Config(format!("unknown source: {}", name)));
                }
                matched
            }
            None => sources.iter().collect(),
        };

        // A dry run touches nothing on disk, not even the artifact dirs.
        if !scope.dry_run {
            self.store.ensure_dirs().await?;
        }
        info!(
            "Run {} over {} source(s), {} already in ledger",
            report.run_id,
            in_scope.len(),
            self.ledger.len().await?
        );

        for source in in_scope {
            let descriptor = &source.descriptor;
            let episodes = match source.adapter.discover(descriptor).await {
                Ok(episodes) => episodes,
                Err(e) => {
                    // One broken source never blocks the others.
                    error!("Source '{}' discovery failed: {}", descriptor.name, e);
                    report.push_source_failure(&descriptor.name, e.to_string());
                    continue;
                }
            };
            info!("Source '{}': {} episode(s) discovered", descriptor.name, episodes.len());

            for episode in episodes {
                self.process_item(episode, descriptor, scope, &mut report).await;
            }
        }

        self.finish_run(scope, &mut report).await;
        Ok(report)
    }

    /// Drive one item through the per-item state machine. Every failure is
    /// folded into the report; nothing propagates.
    async fn process_item(
        &self,
        episode: Episode,
        descriptor: &SourceDescriptor,
        scope: &RunScope,
        report: &mut RunReport,
    ) {
        let key = episode.natural_key();

        // Time window: a missing published date is always in-window.
        if let (Some(since), Some(published)) = (scope.since, episode.published) {
            if published < since {
                report.push(episode, None, ItemOutcome::SkippedWindow);
                return;
            }
        }

        match self.ledger.is_new(&key).await {
            Ok(false) => {
                report.push(episode, None, ItemOutcome::SkippedKnown);
                return;
            }
            Ok(true) => {}
            Err(e) => {
                // A failed dedup check must not silently reprocess or drop
                // the item; surface it as a ledger failure.
                error!("Ledger read failed for {}: {}", key, e);
                report.push(
                    episode,
                    None,
                    ItemOutcome::Failed { stage: Stage::Ledger, detail: e.to_string() },
                );
                return;
            }
        }

        if scope.dry_run {
            info!("[dry run] would process: {} ({})", episode.title, episode.url);
            report.push(episode, None, ItemOutcome::WouldProcess);
            return;
        }

        info!("[{} / {}] {}", descriptor.name, descriptor.category, episode.title);
        let slug = slugify(&episode.title);

        let extracted = match self.extractor.extract(&episode.url).await {
            Ok(extracted) => extracted,
            Err(e) => {
                warn!("Extraction failed for {}: {}", episode.url, e);
                self.record_failure(&key, &slug).await;
                report.push(
                    episode,
                    None,
                    ItemOutcome::Failed { stage: Stage::Extraction, detail: e.to_string() },
                );
                return;
            }
        };

        // The feed's date wins; the scraped one is the fallback.
        let published = episode.published.or(extracted.published);

        let category = if descriptor.lock_category {
            descriptor.category.clone()
        } else {
            let head: String = extracted.text.chars().take(CLASSIFY_TEXT_HEAD).collect();
            self.classifier
                .classify(&format!("{}\n{}", episode.title, head), &descriptor.category)
        };

        let site = extracted.site.to_string();
        if let Err(e) = self
            .store
            .write_raw(&slug, &episode, &site, published, &category, &extracted.text)
            .await
        {
            warn!("Cannot persist raw text for {}: {}", slug, e);
            self.record_failure(&key, &slug).await;
            report.push(
                episode,
                Some(category),
                ItemOutcome::Failed { stage: Stage::Extraction, detail: e.to_string() },
            );
            return;
        }

        if scope.scrape_only {
            match self.ledger.record(&key, LedgerOutcome::Scraped, &slug).await {
                Ok(()) => {
                    info!("Scraped {} -> {}", episode.title, self.store.raw_path(&slug).display());
                    report.push(episode, Some(category), ItemOutcome::Scraped { slug });
                }
                Err(e) => {
                    error!("Ledger write failed for {}: {}", key, e);
                    report.push(
                        episode,
                        Some(category),
                        ItemOutcome::Failed { stage: Stage::Ledger, detail: e.to_string() },
                    );
                }
            }
            return;
        }

        let Some(summarizer) = &self.summarizer else {
            report.push(
                episode,
                Some(category),
                ItemOutcome::Failed {
                    stage: Stage::Summarization,
                    detail: "no summarizer configured".to_string(),
                },
            );
            return;
        };

        let body = match summarizer.summarize(&episode, &category, &extracted.text).await {
            Ok(body) => body,
            Err(e) => {
                // The raw text stays on disk; prior-stage output is never
                // discarded on a later-stage failure.
                warn!("Summarization failed for {}: {}", episode.title, e);
                self.record_failure(&key, &slug).await;
                report.push(
                    episode,
                    Some(category),
                    ItemOutcome::Failed { stage: Stage::Summarization, detail: e.to_string() },
                );
                return;
            }
        };

        if let Err(e) = self
            .store
            .write_summary(&slug, &episode, published, &category, &body)
            .await
        {
            warn!("Cannot persist summary for {}: {}", slug, e);
            self.record_failure(&key, &slug).await;
            report.push(
                episode,
                Some(category),
                ItemOutcome::Failed { stage: Stage::Summarization, detail: e.to_string() },
            );
            return;
        }

        match self.ledger.record(&key, LedgerOutcome::Succeeded, &slug).await {
            Ok(()) => {
                info!("Done: {} -> {}", episode.title, self.store.summary_path(&slug).display());
                report.push(episode, Some(category), ItemOutcome::Done { slug });
            }
            Err(e) => {
                // Never mark an item done when the write that makes it
                // skippable next run was lost.
                error!("Ledger write failed for {}: {}", key, e);
                report.push(
                    episode,
                    Some(category),
                    ItemOutcome::Failed { stage: Stage::Ledger, detail: e.to_string() },
                );
            }
        }
    }

    /// Record a failed attempt so the next run retries it. A lost write here
    /// only costs an extra retry, so it is logged and swallowed.
    async fn record_failure(&self, key: &str, slug: &str) {
        if let Err(e) = self.ledger.record(key, LedgerOutcome::Failed, slug).await {
            error!("Ledger write failed for {}: {}", key, e);
        }
    }

    /// Summarize raw artifacts that never made it past scraping: the given
    /// slugs, or every raw file lacking a summary when none are named. On
    /// success the item's ledger entry is upgraded to succeeded, so later
    /// runs keep skipping it.
    pub async fn summarize_pending(&self, slugs: &[String], force: bool) -> Result<RunReport> {
        let summarizer = self
            .summarizer
            .as_ref()
            .ok_or_else(|| PipelineError::Config("no summarizer configured".to_string()))?;

        let scope = RunScope::default();
        let mut report = RunReport::new(scope.clone());

        self.store.ensure_dirs().await?;
        let targets = if slugs.is_empty() {
            self.store.pending_slugs().await?
        } else {
            slugs.to_vec()
        };
        info!("Backlog: {} raw artifact(s) to summarize", targets.len());

        for slug in targets {
            let raw = match self.store.read_raw(&slug).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Cannot read raw artifact '{}': {}", slug, e);
                    let episode = Episode {
                        title: slug.clone(),
                        url: self.store.raw_path(&slug).display().to_string(),
                        published: None,
                        source: BACKLOG_SOURCE.to_string(),
                    };
                    report.push(
                        episode,
                        None,
                        ItemOutcome::Failed { stage: Stage::Extraction, detail: e.to_string() },
                    );
                    continue;
                }
            };

            let episode = Episode {
                title: raw.title,
                url: raw.url,
                published: raw.published,
                source: BACKLOG_SOURCE.to_string(),
            };

            if !force && self.store.summary_path(&slug).exists() {
                report.push(episode, Some(raw.category), ItemOutcome::SkippedKnown);
                continue;
            }

            info!("[{}] {}", BACKLOG_SOURCE, episode.title);
            let body = match summarizer.summarize(&episode, &raw.category, &raw.text).await {
                Ok(body) => body,
                Err(e) => {
                    // The ledger entry stays scraped; another summarize pass
                    // can retry.
                    warn!("Summarization failed for {}: {}", episode.title, e);
                    report.push(
                        episode,
                        Some(raw.category),
                        ItemOutcome::Failed { stage: Stage::Summarization, detail: e.to_string() },
                    );
                    continue;
                }
            };

            if let Err(e) = self
                .store
                .write_summary(&slug, &episode, episode.published, &raw.category, &body)
                .await
            {
                warn!("Cannot persist summary for {}: {}", slug, e);
                report.push(
                    episode,
                    Some(raw.category),
                    ItemOutcome::Failed { stage: Stage::Summarization, detail: e.to_string() },
                );
                continue;
            }

            // The scraped entry was recorded under the item's natural key;
            // prefer it so the upgrade lands on the same row.
            let key = match self.ledger.find_by_slug(&slug).await {
                Ok(Some(entry)) => entry.key,
                Ok(None) => episode.natural_key(),
                Err(e) => {
                    error!("Ledger read failed for slug {}: {}", slug, e);
                    episode.natural_key()
                }
            };
            match self.ledger.record(&key, LedgerOutcome::Succeeded, &slug).await {
                Ok(()) => {
                    info!("Done: {} -> {}", episode.title, self.store.summary_path(&slug).display());
                    report.push(episode, Some(raw.category), ItemOutcome::Done { slug });
                }
                Err(e) => {
                    error!("Ledger write failed for {}: {}", key, e);
                    report.push(
                        episode,
                        Some(raw.category),
                        ItemOutcome::Failed { stage: Stage::Ledger, detail: e.to_string() },
                    );
                }
            }
        }

        self.finish_run(&scope, &mut report).await;
        Ok(report)
    }

    /// Publish at most once for the whole run, then hand the report to the
    /// notifier exactly once.
    async fn finish_run(&self, scope: &RunScope, report: &mut RunReport) {
        let should_publish = !scope.dry_run
            && !scope.scrape_only
            && (report.succeeded() > 0 || self.publish_always);

        if should_publish {
            if let Some(publisher) = &self.publisher {
                report.publish = match publisher.publish().await {
                    Ok(detail) => {
                        info!("Publish trigger succeeded: {}", detail);
                        PublishStatus::Succeeded(detail)
                    }
                    Err(e) => {
                        // Items already summarized stay succeeded; only the
                        // compilation step failed.
                        error!("Publish trigger failed: {}", e);
                        PublishStatus::Failed(e.to_string())
                    }
                };
            }
        }

        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.notify(report).await {
                warn!("Notifier failed (run unaffected): {}", e);
            }
        }
    }
}

/// Ad-hoc discovery for the single-URL entry point: yields exactly the one
/// episode handed to it, so an explicit URL flows through the same
/// pipeline, ledger, and scope semantics as a discovered item.
pub struct AdHocDiscovery {
    episode: Episode,
}

impl AdHocDiscovery {
    pub const SOURCE_NAME: &'static str = "ad-hoc";

    pub fn register(episode: Episode, default_category: &str) -> RegisteredSource {
        RegisteredSource {
            descriptor: SourceDescriptor {
                name: Self::SOURCE_NAME.to_string(),
                kind: crate::types::SourceKind::Feed,
                locator: episode.url.clone(),
                title_filter: None,
                max_items: 1,
                category: default_category.to_string(),
                lock_category: false,
            },
            adapter: Arc::new(Self { episode }),
        }
    }
}

#[async_trait]
impl DiscoverSource for AdHocDiscovery {
    async fn discover(&self, _descriptor: &SourceDescriptor) -> Result<Vec<Episode>> {
        Ok(vec![self.episode.clone()])
    }
}
