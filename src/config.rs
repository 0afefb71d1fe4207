use crate::classify::CategoryRule;
use crate::types::{PipelineError, Result, SourceDescriptor, SourceKind};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

pub const DEFAULT_CONFIG_PATH: &str = "sources.yaml";
const DEFAULT_MAX_ITEMS: usize = 5;

/// Top-level operator config. Re-read fresh at the start of every run so
/// edits take effect without a restart.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub sources: Vec<SourceEntry>,
    #[serde(default)]
    pub settings: Settings,
    /// Optional override of the built-in classifier rule table. Order is
    /// significant: the first matching rule wins.
    #[serde(default)]
    pub categories: Vec<CategoryEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceEntry {
    #[serde(default)]
    pub name: String,
    pub kind: SourceKind,
    /// Feed URL (kind: feed).
    pub url: Option<String>,
    /// Channel @handle or UC… id (kind: channel).
    pub handle: Option<String>,
    pub title_filter: Option<String>,
    pub max_items: Option<usize>,
    pub category: Option<String>,
    #[serde(default)]
    pub lock_category: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryEntry {
    pub label: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub default_category: String,
    pub raw_dir: String,
    pub summary_dir: String,
    pub ledger_path: String,
    /// Shell command that compiles the published site; run at most once per
    /// run, after the batch completes.
    pub publish_command: Option<String>,
    /// Always fire the publish trigger, even when nothing was summarized.
    pub publish_always: bool,
    /// Link appended to the notification message.
    pub site_url: Option<String>,
    /// Group webhook for run notifications; the FEISHU_WEBHOOK_URL env var
    /// takes precedence.
    pub webhook_url: Option<String>,
    /// Path to the summary prompt template.
    pub prompt_template: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_category: "Uncategorized".to_string(),
            raw_dir: "raw".to_string(),
            summary_dir: "summaries".to_string(),
            ledger_path: "ledger.db".to_string(),
            publish_command: None,
            publish_always: false,
            site_url: None,
            webhook_url: None,
            prompt_template: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))?;
        debug!("Loaded {} source entries from {}", config.sources.len(), path.display());
        Ok(config)
    }

    /// Normalize and validate the source list into descriptors, preserving
    /// config order for deterministic run ordering.
    pub fn descriptors(&self) -> Result<Vec<SourceDescriptor>> {
        let mut seen = HashSet::new();
        let mut descriptors = Vec::with_capacity(self.sources.len());

        for entry in &self.sources {
            if entry.name.trim().is_empty() {
                return Err(PipelineError::Config("source with empty name".to_string()));
            }
            if !seen.insert(entry.name.clone()) {
                return Err(PipelineError::Config(format!(
                    "duplicate source name: {}",
                    entry.name
                )));
            }

            let locator = match entry.kind {
                SourceKind::Feed => entry.url.clone().ok_or_else(|| {
                    PipelineError::Config(format!("feed source '{}' is missing url", entry.name))
                })?,
                SourceKind::Channel => entry.handle.clone().ok_or_else(|| {
                    PipelineError::Config(format!(
                        "channel source '{}' is missing handle",
                        entry.name
                    ))
                })?,
            };

            descriptors.push(SourceDescriptor {
                name: entry.name.clone(),
                kind: entry.kind,
                locator,
                title_filter: entry.title_filter.clone().filter(|f| !f.is_empty()),
                max_items: entry.max_items.unwrap_or(DEFAULT_MAX_ITEMS),
                category: entry
                    .category
                    .clone()
                    .unwrap_or_else(|| self.settings.default_category.clone()),
                lock_category: entry.lock_category,
            });
        }

        Ok(descriptors)
    }

    /// Classifier rules: the config's `categories` list when present,
    /// otherwise the built-in table.
    pub fn category_rules(&self) -> Vec<CategoryRule> {
        if self.categories.is_empty() {
            crate::classify::Classifier::default_rules()
        } else {
            self.categories
                .iter()
                .map(|c| CategoryRule {
                    label: c.label.clone(),
                    keywords: c.keywords.clone(),
                })
                .collect()
        }
    }
}
