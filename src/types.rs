use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a content source. Adapter selection happens once, at registry
/// load time, by matching on this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// RSS or Atom feed.
    Feed,
    /// YouTube channel, addressed by @handle or raw channel id.
    Channel,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Feed => write!(f, "feed"),
            SourceKind::Channel => write!(f, "channel"),
        }
    }
}

/// A normalized content source, loaded from the operator's config at the
/// start of every run and immutable for the run's duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub kind: SourceKind,
    /// Feed URL for `Feed` sources; @handle or UC… channel id for `Channel`.
    pub locator: String,
    /// Case-insensitive substring an episode title must contain to be yielded.
    pub title_filter: Option<String>,
    /// Cap on episodes yielded per run.
    pub max_items: usize,
    /// Category hint, used as classifier fallback (or unconditionally when
    /// `lock_category` is set).
    pub category: String,
    /// Bypass the classifier and always use `category`.
    pub lock_category: bool,
}

/// A single discoverable unit of content: an episode, post, or video.
/// Created fresh by a discovery adapter on every run and never persisted as
/// its own record — only its natural key goes into the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub title: String,
    pub url: String,
    pub published: Option<DateTime<Utc>>,
    /// Name of the source that yielded this episode.
    pub source: String,
}

impl Episode {
    /// Stable dedup key, identical across runs for the same item.
    /// YouTube items key on the video id (the same video is reachable through
    /// several URL shapes); everything else keys on the URL.
    pub fn natural_key(&self) -> String {
        if let Some(id) = crate::extract::youtube_video_id(&self.url) {
            format!("youtube:{}", id)
        } else {
            self.url.trim_end_matches('/').to_string()
        }
    }
}

/// Scope flags for one run, resolved once per invocation and read-only
/// thereafter.
#[derive(Debug, Clone, Default)]
pub struct RunScope {
    /// Only process the source with exactly this name.
    pub source: Option<String>,
    /// Only process episodes published at or after this instant. Episodes
    /// with no published date are always in-window.
    pub since: Option<DateTime<Utc>>,
    /// Discovery only: no extraction, no summarization, no ledger writes.
    pub dry_run: bool,
    /// Extraction only: raw text is persisted but no model is called.
    pub scrape_only: bool,
}

/// Parse a recency filter: either a relative duration (`7d`, `36h`, `90m`)
/// or an absolute `YYYY-MM-DD` date.
pub fn parse_since(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Some((num, unit)) = s
        .char_indices()
        .last()
        .map(|(i, c)| (&s[..i], c))
        .filter(|(num, c)| matches!(c, 'd' | 'h' | 'm') && num.chars().all(|d| d.is_ascii_digit()) && !num.is_empty())
    {
        let n: i64 = num
            .parse()
            .map_err(|_| PipelineError::Config(format!("invalid duration: {}", s)))?;
        let delta = match unit {
            'd' => chrono::Duration::days(n),
            'h' => chrono::Duration::hours(n),
            _ => chrono::Duration::minutes(n),
        };
        return Ok(Utc::now() - delta);
    }
    let date = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
        PipelineError::Config(format!("invalid date (want YYYY-MM-DD or e.g. 7d): {}", s))
    })?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| PipelineError::Config(format!("invalid date: {}", s)))?;
    Ok(DateTime::from_naive_utc_and_offset(midnight, Utc))
}

/// Pipeline stage where an item failed, for report attribution and manual
/// retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Discovery,
    Extraction,
    Summarization,
    Ledger,
    Publish,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Discovery => write!(f, "discovery"),
            Stage::Extraction => write!(f, "extraction"),
            Stage::Summarization => write!(f, "summarization"),
            Stage::Ledger => write!(f, "ledger"),
            Stage::Publish => write!(f, "publish"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("discovery failed: {0}")]
    Discovery(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("summarization failed: {0}")]
    Summarization(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("notification failed: {0}")]
    Notify(String),

    #[error("ledger error: {0}")]
    Ledger(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Stage a non-fatal error is attributed to when folded into the run
    /// report.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Discovery(_) => Stage::Discovery,
            PipelineError::Summarization(_) => Stage::Summarization,
            PipelineError::Publish(_) => Stage::Publish,
            PipelineError::Ledger(_) => Stage::Ledger,
            _ => Stage::Extraction,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
