use async_trait::async_trait;
use chrono::{Duration, Utc};
use episode_monitor::{
    ArtifactStore, Classifier, DiscoverSource, Episode, ExtractContent, Extracted, ItemOutcome,
    Ledger, LedgerOutcome, Notify, Pipeline, PipelineError, Publish, PublishStatus,
    RegisteredSource, Result, RunReport, RunScope, SiteKind, SourceDescriptor, SourceKind,
    Summarize,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tracing::info;

struct StaticDiscovery {
    episodes: Vec<Episode>,
}

#[async_trait]
impl DiscoverSource for StaticDiscovery {
    async fn discover(&self, _descriptor: &SourceDescriptor) -> Result<Vec<Episode>> {
        Ok(self.episodes.clone())
    }
}

struct BrokenDiscovery;

#[async_trait]
impl DiscoverSource for BrokenDiscovery {
    async fn discover(&self, _descriptor: &SourceDescriptor) -> Result<Vec<Episode>> {
        Err(PipelineError::Discovery("feed unreachable".to_string()))
    }
}

struct MockExtractor {
    calls: AtomicUsize,
    fail_url: Option<String>,
}

impl MockExtractor {
    fn new() -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0), fail_url: None })
    }

    fn failing_on(url: &str) -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0), fail_url: Some(url.to_string()) })
    }
}

#[async_trait]
impl ExtractContent for MockExtractor {
    async fn extract(&self, url: &str) -> Result<Extracted> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_url.as_deref() == Some(url) {
            return Err(PipelineError::Extraction(format!("no content at {}", url)));
        }
        Ok(Extracted {
            text: format!("transcript for {}", url),
            published: None,
            site: SiteKind::Generic,
        })
    }

    async fn resolve_title(&self, _url: &str) -> Result<String> {
        Ok("resolved".to_string())
    }
}

struct MockSummarizer {
    calls: AtomicUsize,
    fail_title: Option<String>,
}

impl MockSummarizer {
    fn new() -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0), fail_title: None })
    }

    fn failing_on(title: &str) -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0), fail_title: Some(title.to_string()) })
    }
}

#[async_trait]
impl Summarize for MockSummarizer {
    async fn summarize(&self, episode: &Episode, category: &str, _raw_text: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_title.as_deref() == Some(episode.title.as_str()) {
            return Err(PipelineError::Summarization("model timed out".to_string()));
        }
        Ok(format!("## {}\n\nSummary in category {}.", episode.title, category))
    }
}

struct CountingPublisher {
    calls: AtomicUsize,
}

impl CountingPublisher {
    fn new() -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0) })
    }
}

#[async_trait]
impl Publish for CountingPublisher {
    async fn publish(&self) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("site rebuilt".to_string())
    }
}

struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    fn new() -> Arc<Self> {
        Arc::new(Self { messages: Mutex::new(Vec::new()) })
    }
}

#[async_trait]
impl Notify for RecordingNotifier {
    async fn notify(&self, report: &RunReport) -> Result<()> {
        self.messages.lock().unwrap().push(report.render(None));
        Ok(())
    }
}

fn episode(title: &str) -> Episode {
    Episode {
        title: title.to_string(),
        url: format!("https://example.com/{}", title.to_lowercase()),
        published: Some(Utc::now()),
        source: "Test Source".to_string(),
    }
}

fn registered(name: &str, episodes: Vec<Episode>) -> RegisteredSource {
    RegisteredSource {
        descriptor: SourceDescriptor {
            name: name.to_string(),
            kind: SourceKind::Feed,
            locator: "https://example.com/feed".to_string(),
            title_filter: None,
            max_items: 10,
            category: "Uncategorized".to_string(),
            lock_category: false,
        },
        adapter: Arc::new(StaticDiscovery { episodes }),
    }
}

async fn harness(dir: &TempDir) -> (Ledger, ArtifactStore) {
    let ledger = Ledger::open(&dir.path().join("ledger.db")).await.unwrap();
    let store = ArtifactStore::new(dir.path().join("raw"), dir.path().join("summaries"));
    (ledger, store)
}

fn classifier() -> Classifier {
    Classifier::new(Classifier::default_rules())
}

#[tokio::test]
async fn dry_run_touches_nothing() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();
    info!("Testing dry run purity");

    let dir = TempDir::new()?;
    let (ledger, store) = harness(&dir).await;
    let extractor = MockExtractor::new();
    let publisher = CountingPublisher::new();

    let pipeline = Pipeline::new(ledger, store, classifier(), extractor.clone())
        .with_summarizer(MockSummarizer::new())
        .with_publisher(publisher.clone())
        .publish_always(true);

    let sources = vec![registered("Test Source", vec![episode("Alpha"), episode("Beta")])];
    let scope = RunScope { dry_run: true, ..RunScope::default() };
    let report = pipeline.run(&sources, &scope).await?;

    assert_eq!(report.discovered(), 2);
    assert!(report.items.iter().all(|i| i.outcome == ItemOutcome::WouldProcess));
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    assert_eq!(publisher.calls.load(Ordering::SeqCst), 0);
    assert_eq!(report.publish, PublishStatus::Skipped);

    // No ledger writes in a dry run: everything is still new afterwards.
    let ledger = Ledger::open(&dir.path().join("ledger.db")).await?;
    assert_eq!(ledger.len().await?, 0);

    // Not even the artifact directories get created.
    assert!(!dir.path().join("raw").exists());
    assert!(!dir.path().join("summaries").exists());
    Ok(())
}

#[tokio::test]
async fn one_failing_item_never_blocks_the_rest() -> Result<()> {
    let dir = TempDir::new()?;
    let (ledger, store) = harness(&dir).await;

    let pipeline = Pipeline::new(ledger, store, classifier(), MockExtractor::new())
        .with_summarizer(MockSummarizer::failing_on("Beta"));

    let sources = vec![registered(
        "Test Source",
        vec![episode("Alpha"), episode("Beta"), episode("Gamma")],
    )];
    let report = pipeline.run(&sources, &RunScope::default()).await?;

    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);

    // The failure is recorded non-terminally, so the next run retries it
    // while the succeeded items are skipped.
    let ledger = Ledger::open(&dir.path().join("ledger.db")).await?;
    let failed_key = episode("Beta").natural_key();
    assert!(ledger.is_new(&failed_key).await?);

    let (ledger, store) = harness(&dir).await;
    let extractor = MockExtractor::new();
    let pipeline = Pipeline::new(ledger, store, classifier(), extractor.clone())
        .with_summarizer(MockSummarizer::new());
    let report = pipeline.run(&sources, &RunScope::default()).await?;

    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.skipped(), 2);
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn extraction_failure_is_retried_next_run() -> Result<()> {
    let dir = TempDir::new()?;
    let (ledger, store) = harness(&dir).await;

    let extractor = MockExtractor::failing_on("https://example.com/alpha");
    let pipeline = Pipeline::new(ledger, store, classifier(), extractor)
        .with_summarizer(MockSummarizer::new());

    let sources = vec![registered("Test Source", vec![episode("Alpha")])];
    let report = pipeline.run(&sources, &RunScope::default()).await?;
    assert_eq!(report.failed(), 1);

    let ledger = Ledger::open(&dir.path().join("ledger.db")).await?;
    assert!(ledger.is_new(&episode("Alpha").natural_key()).await?);
    Ok(())
}

#[tokio::test]
async fn publish_fires_at_most_once_per_run() -> Result<()> {
    let dir = TempDir::new()?;
    let (ledger, store) = harness(&dir).await;
    let publisher = CountingPublisher::new();

    let pipeline = Pipeline::new(ledger, store, classifier(), MockExtractor::new())
        .with_summarizer(MockSummarizer::new())
        .with_publisher(publisher.clone());

    let sources = vec![registered(
        "Test Source",
        vec![episode("A1"), episode("A2"), episode("A3"), episode("A4"), episode("A5")],
    )];
    let report = pipeline.run(&sources, &RunScope::default()).await?;

    assert_eq!(report.succeeded(), 5);
    assert_eq!(publisher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.publish, PublishStatus::Succeeded("site rebuilt".to_string()));
    Ok(())
}

#[tokio::test]
async fn publish_skipped_when_nothing_succeeded_unless_always() -> Result<()> {
    let dir = TempDir::new()?;
    let (ledger, store) = harness(&dir).await;
    ledger
        .record(&episode("Alpha").natural_key(), LedgerOutcome::Succeeded, "alpha")
        .await?;

    let publisher = CountingPublisher::new();
    let pipeline = Pipeline::new(ledger, store, classifier(), MockExtractor::new())
        .with_summarizer(MockSummarizer::new())
        .with_publisher(publisher.clone());

    let sources = vec![registered("Test Source", vec![episode("Alpha")])];
    pipeline.run(&sources, &RunScope::default()).await?;
    assert_eq!(publisher.calls.load(Ordering::SeqCst), 0);

    let (ledger, store) = harness(&dir).await;
    let pipeline = Pipeline::new(ledger, store, classifier(), MockExtractor::new())
        .with_summarizer(MockSummarizer::new())
        .with_publisher(publisher.clone())
        .publish_always(true);
    pipeline.run(&sources, &RunScope::default()).await?;
    assert_eq!(publisher.calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn known_items_never_reach_the_extractor() -> Result<()> {
    let dir = TempDir::new()?;
    let (ledger, store) = harness(&dir).await;
    ledger
        .record(&episode("Alpha").natural_key(), LedgerOutcome::Succeeded, "alpha")
        .await?;

    let extractor = MockExtractor::new();
    let pipeline = Pipeline::new(ledger, store, classifier(), extractor.clone())
        .with_summarizer(MockSummarizer::new());

    let sources = vec![registered("Test Source", vec![episode("Alpha")])];
    let report = pipeline.run(&sources, &RunScope::default()).await?;

    assert_eq!(report.skipped(), 1);
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn scrape_only_persists_raw_and_is_terminal() -> Result<()> {
    let dir = TempDir::new()?;
    let (ledger, store) = harness(&dir).await;
    let raw_path = store.raw_path("alpha");

    let summarizer = MockSummarizer::new();
    let pipeline = Pipeline::new(ledger, store, classifier(), MockExtractor::new())
        .with_summarizer(summarizer.clone());

    let sources = vec![registered("Test Source", vec![episode("Alpha")])];
    let scope = RunScope { scrape_only: true, ..RunScope::default() };
    let report = pipeline.run(&sources, &scope).await?;

    assert_eq!(report.scraped(), 1);
    assert_eq!(summarizer.calls.load(Ordering::SeqCst), 0);
    assert!(raw_path.exists());

    // A later full run does not re-process a scraped item.
    let (ledger, store) = harness(&dir).await;
    let pipeline = Pipeline::new(ledger, store, classifier(), MockExtractor::new())
        .with_summarizer(summarizer.clone());
    let report = pipeline.run(&sources, &RunScope::default()).await?;
    assert_eq!(report.skipped(), 1);
    assert_eq!(summarizer.calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn scraped_items_can_be_summarized_from_the_backlog() -> Result<()> {
    let dir = TempDir::new()?;
    let (ledger, store) = harness(&dir).await;
    let summary_path = store.summary_path("alpha");

    let pipeline = Pipeline::new(ledger, store, classifier(), MockExtractor::new());
    let sources = vec![registered("Test Source", vec![episode("Alpha")])];
    let scope = RunScope { scrape_only: true, ..RunScope::default() };
    pipeline.run(&sources, &scope).await?;

    // The backlog pass picks the raw artifact up, writes the summary, and
    // upgrades the ledger entry in place.
    let (ledger, store) = harness(&dir).await;
    let summarizer = MockSummarizer::new();
    let pipeline = Pipeline::new(ledger, store, classifier(), MockExtractor::new())
        .with_summarizer(summarizer.clone());
    let report = pipeline.summarize_pending(&[], false).await?;

    assert_eq!(report.succeeded(), 1);
    assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);
    assert!(summary_path.exists());

    let ledger = Ledger::open(&dir.path().join("ledger.db")).await?;
    let entry = ledger.get(&episode("Alpha").natural_key()).await?.unwrap();
    assert_eq!(entry.outcome, LedgerOutcome::Succeeded);
    assert_eq!(ledger.len().await?, 1);

    // Nothing pending afterwards, and an explicit slug needs --force to
    // overwrite the existing summary.
    let (ledger, store) = harness(&dir).await;
    let pipeline = Pipeline::new(ledger, store, classifier(), MockExtractor::new())
        .with_summarizer(summarizer.clone());
    let report = pipeline.summarize_pending(&[], false).await?;
    assert_eq!(report.discovered(), 0);

    let report = pipeline.summarize_pending(&["alpha".to_string()], false).await?;
    assert_eq!(report.skipped(), 1);
    assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);

    let report = pipeline.summarize_pending(&["alpha".to_string()], true).await?;
    assert_eq!(report.succeeded(), 1);
    assert_eq!(summarizer.calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn backlog_summarization_failure_leaves_the_item_pending() -> Result<()> {
    let dir = TempDir::new()?;
    let (ledger, store) = harness(&dir).await;

    let pipeline = Pipeline::new(ledger, store, classifier(), MockExtractor::new());
    let sources = vec![registered("Test Source", vec![episode("Alpha")])];
    let scope = RunScope { scrape_only: true, ..RunScope::default() };
    pipeline.run(&sources, &scope).await?;

    let (ledger, store) = harness(&dir).await;
    let pipeline = Pipeline::new(ledger, store, classifier(), MockExtractor::new())
        .with_summarizer(MockSummarizer::failing_on("Alpha"));
    let report = pipeline.summarize_pending(&[], false).await?;
    assert_eq!(report.failed(), 1);

    // Still scraped, still pending for the next pass.
    let ledger = Ledger::open(&dir.path().join("ledger.db")).await?;
    let entry = ledger.get(&episode("Alpha").natural_key()).await?.unwrap();
    assert_eq!(entry.outcome, LedgerOutcome::Scraped);
    Ok(())
}

#[tokio::test]
async fn time_window_skips_old_but_keeps_undated() -> Result<()> {
    let dir = TempDir::new()?;
    let (ledger, store) = harness(&dir).await;

    let old = Episode {
        published: Some(Utc::now() - Duration::days(30)),
        ..episode("Old")
    };
    let undated = Episode { published: None, ..episode("Undated") };

    let pipeline = Pipeline::new(ledger, store, classifier(), MockExtractor::new())
        .with_summarizer(MockSummarizer::new());

    let sources = vec![registered("Test Source", vec![old, episode("Fresh"), undated])];
    let scope = RunScope {
        since: Some(Utc::now() - Duration::days(7)),
        ..RunScope::default()
    };
    let report = pipeline.run(&sources, &scope).await?;

    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.skipped(), 1);
    assert!(report
        .items
        .iter()
        .any(|i| i.episode.title == "Old" && i.outcome == ItemOutcome::SkippedWindow));
    Ok(())
}

#[tokio::test]
async fn unknown_source_name_is_fatal() -> Result<()> {
    let dir = TempDir::new()?;
    let (ledger, store) = harness(&dir).await;

    let pipeline = Pipeline::new(ledger, store, classifier(), MockExtractor::new());
    let sources = vec![registered("Test Source", vec![])];
    let scope = RunScope { source: Some("No Such Source".to_string()), ..RunScope::default() };

    let err = pipeline.run(&sources, &scope).await.unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
    Ok(())
}

#[tokio::test]
async fn broken_source_is_reported_and_skipped() -> Result<()> {
    let dir = TempDir::new()?;
    let (ledger, store) = harness(&dir).await;

    let broken = RegisteredSource {
        descriptor: SourceDescriptor {
            name: "Broken".to_string(),
            kind: SourceKind::Feed,
            locator: "https://down.example.com/feed".to_string(),
            title_filter: None,
            max_items: 10,
            category: "Uncategorized".to_string(),
            lock_category: false,
        },
        adapter: Arc::new(BrokenDiscovery),
    };
    let healthy = registered("Healthy", vec![episode("Alpha")]);

    let pipeline = Pipeline::new(ledger, store, classifier(), MockExtractor::new())
        .with_summarizer(MockSummarizer::new());
    let report = pipeline.run(&[broken, healthy], &RunScope::default()).await?;

    assert_eq!(report.source_failures.len(), 1);
    assert_eq!(report.source_failures[0].source, "Broken");
    assert_eq!(report.succeeded(), 1);
    Ok(())
}

#[tokio::test]
async fn notifier_runs_exactly_once_even_for_dry_runs() -> Result<()> {
    let dir = TempDir::new()?;
    let (ledger, store) = harness(&dir).await;
    let notifier = RecordingNotifier::new();

    let pipeline = Pipeline::new(ledger, store, classifier(), MockExtractor::new())
        .with_summarizer(MockSummarizer::new())
        .with_notifier(notifier.clone());

    let sources = vec![registered("Test Source", vec![episode("Alpha")])];
    let scope = RunScope { dry_run: true, ..RunScope::default() };
    pipeline.run(&sources, &scope).await?;

    let messages = notifier.messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("dry run"));
    Ok(())
}

#[tokio::test]
async fn locked_category_bypasses_the_classifier() -> Result<()> {
    let dir = TempDir::new()?;
    let (ledger, store) = harness(&dir).await;

    let mut source = registered("Locked", vec![episode("Claude opus deep dive")]);
    source.descriptor.category = "Archive".to_string();
    source.descriptor.lock_category = true;

    let pipeline = Pipeline::new(ledger, store, classifier(), MockExtractor::new())
        .with_summarizer(MockSummarizer::new());
    let report = pipeline.run(&[source], &RunScope::default()).await?;

    // "claude" would match the Anthropic rule, but the lock wins.
    assert_eq!(report.items[0].category.as_deref(), Some("Archive"));
    Ok(())
}
