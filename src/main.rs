use clap::{Parser, Subcommand};
use episode_monitor::config::DEFAULT_CONFIG_PATH;
use episode_monitor::extract::ExtractContent;
use episode_monitor::{
    AdHocDiscovery, ArkSummarizer, ArtifactStore, Classifier, CommandPublisher, Config, Episode,
    FetchConfig, Fetcher, HttpExtractor, Ledger, Pipeline, Result, RunScope, SummarizerConfig,
    WebhookNotifier,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "episode-monitor", version, about = "Episode discovery and summarization pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline over every configured source.
    Run {
        /// Discovery only: list what would be processed, touch nothing.
        #[arg(long)]
        dry_run: bool,
        /// Stop after extraction: persist raw text, call no model.
        #[arg(long)]
        scrape_only: bool,
        /// Only process the source with exactly this name.
        #[arg(long)]
        source: Option<String>,
        /// Only process episodes published since then: 7d, 36h, 90m, or YYYY-MM-DD.
        #[arg(long)]
        since: Option<String>,
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Summarize raw artifacts that were scraped but never summarized.
    Summarize {
        /// Specific artifact slugs; every pending raw artifact when omitted.
        slugs: Vec<String>,
        /// Re-summarize even when a summary document already exists.
        #[arg(long)]
        force: bool,
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Push one explicit URL through the same pipeline and ledger.
    Url {
        url: String,
        /// Title override; resolved from the page when omitted.
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        scrape_only: bool,
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    if let Err(e) = execute(cli).await {
        error!("Fatal: {}", e);
        std::process::exit(1);
    }
}

async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run { dry_run, scrape_only, source, since, config } => {
            let config = Config::load(&config)?;
            let scope = RunScope {
                source,
                since: since.as_deref().map(episode_monitor::types::parse_since).transpose()?,
                dry_run,
                scrape_only,
            };

            let fetcher = Arc::new(Fetcher::new(FetchConfig::default())?);
            let sources = episode_monitor::register(config.descriptors()?, fetcher.clone());
            let pipeline = build_pipeline(&config, &scope, fetcher).await?;

            let report = pipeline.run(&sources, &scope).await?;
            info!(
                "Run {} finished: {} discovered, {} ok, {} failed, {} skipped",
                report.run_id,
                report.discovered(),
                report.succeeded() + report.scraped(),
                report.failed(),
                report.skipped()
            );
            println!("{}", report.render(config.settings.site_url.as_deref()));
            Ok(())
        }
        Command::Summarize { slugs, force, config } => {
            let config = Config::load(&config)?;
            let scope = RunScope::default();

            let fetcher = Arc::new(Fetcher::new(FetchConfig::default())?);
            let pipeline = build_pipeline(&config, &scope, fetcher).await?;

            let report = pipeline.summarize_pending(&slugs, force).await?;
            info!(
                "Backlog pass finished: {} summarized, {} failed, {} skipped",
                report.succeeded(),
                report.failed(),
                report.skipped()
            );
            println!("{}", report.render(config.settings.site_url.as_deref()));
            Ok(())
        }
        Command::Url { url, title, scrape_only, config } => {
            let config = Config::load(&config)?;
            let scope = RunScope { scrape_only, ..RunScope::default() };

            let fetcher = Arc::new(Fetcher::new(FetchConfig::default())?);
            let title = match title {
                Some(title) => title,
                None => {
                    let extractor = HttpExtractor::new(fetcher.clone());
                    match extractor.resolve_title(&url).await {
                        Ok(title) => title,
                        Err(e) => {
                            warn!("Cannot resolve title for {} ({}), deriving from URL", url, e);
                            title_from_url(&url)?
                        }
                    }
                }
            };
            let episode = Episode {
                title,
                url,
                published: None,
                source: AdHocDiscovery::SOURCE_NAME.to_string(),
            };
            let source = AdHocDiscovery::register(episode, &config.settings.default_category);

            let pipeline = build_pipeline(&config, &scope, fetcher).await?;
            let report = pipeline.run(&[source], &scope).await?;
            println!("{}", report.render(config.settings.site_url.as_deref()));
            Ok(())
        }
    }
}

/// Last resort title: the final URL path segment with dashes spaced out.
fn title_from_url(url: &str) -> Result<String> {
    let parsed = url::Url::parse(url)?;
    let segment = parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or_else(|| parsed.host_str().unwrap_or("untitled"));
    Ok(segment.replace(['-', '_'], " "))
}

/// Assemble the pipeline from config. The summarizer and publisher are only
/// wired up when the run will actually reach those stages, so a dry or
/// scrape-only run needs no API key.
async fn build_pipeline(
    config: &Config,
    scope: &RunScope,
    fetcher: Arc<Fetcher>,
) -> Result<Pipeline> {
    let ledger = Ledger::open(Path::new(&config.settings.ledger_path)).await?;
    let store = ArtifactStore::new(&config.settings.raw_dir, &config.settings.summary_dir);
    let classifier = Classifier::new(config.category_rules());

    let mut pipeline = Pipeline::new(ledger, store, classifier, Arc::new(HttpExtractor::new(fetcher)))
        .publish_always(config.settings.publish_always);

    if !scope.dry_run && !scope.scrape_only {
        let mut summarizer = ArkSummarizer::new(SummarizerConfig::from_env()?)?;
        if let Some(template) = &config.settings.prompt_template {
            summarizer = summarizer.with_template_file(Path::new(template));
        }
        pipeline = pipeline.with_summarizer(Arc::new(summarizer));

        if let Some(command) = &config.settings.publish_command {
            pipeline = pipeline.with_publisher(Arc::new(CommandPublisher::new(command.clone())));
        }
    }

    if let Some(notifier) = WebhookNotifier::from_env_or_config(
        config.settings.webhook_url.as_deref(),
        config.settings.site_url.clone(),
    )? {
        pipeline = pipeline.with_notifier(Arc::new(notifier));
    }

    Ok(pipeline)
}
