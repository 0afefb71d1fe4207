//! Episode monitor: discovers new episodes across configured feeds and
//! YouTube channels, deduplicates against a persistent ledger, extracts
//! transcripts or article text, summarizes through an LLM endpoint, and
//! triggers the site publish step.

pub mod classify;
pub mod config;
pub mod extract;
pub mod fetcher;
pub mod ledger;
pub mod notify;
pub mod pipeline;
pub mod publish;
pub mod report;
pub mod sources;
pub mod store;
pub mod summarize;
pub mod types;

pub use classify::{CategoryRule, Classifier};
pub use config::Config;
pub use extract::{ExtractContent, Extracted, HttpExtractor, SiteKind};
pub use fetcher::{FetchConfig, Fetcher};
pub use ledger::{Ledger, LedgerEntry, LedgerOutcome};
pub use notify::{Notify, WebhookNotifier};
pub use pipeline::{AdHocDiscovery, Pipeline};
pub use publish::{CommandPublisher, Publish};
pub use report::{ItemOutcome, PublishStatus, RunReport};
pub use sources::{register, DiscoverSource, RegisteredSource};
pub use store::{ArtifactStore, RawArtifact};
pub use summarize::{ArkSummarizer, Summarize, SummarizerConfig};
pub use types::{Episode, PipelineError, Result, RunScope, SourceDescriptor, SourceKind, Stage};
