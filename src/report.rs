//! Per-run outcome aggregation. The report decides what the notifier says
//! and lets the operator retry failed items by hand (title + URL + stage).

use crate::types::{Episode, RunScope, Stage};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Terminal outcome of one discovered item within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Summarized and recorded.
    Done { slug: String },
    /// Raw text persisted in a scrape-only run.
    Scraped { slug: String },
    /// Dry run: would have been processed, nothing was touched.
    WouldProcess,
    /// Ledger already holds a terminal outcome for this key.
    SkippedKnown,
    /// Published before the run's time window.
    SkippedWindow,
    Failed { stage: Stage, detail: String },
}

#[derive(Debug, Clone)]
pub struct ItemReport {
    pub episode: Episode,
    pub category: Option<String>,
    pub outcome: ItemOutcome,
}

#[derive(Debug, Clone)]
pub struct SourceFailure {
    pub source: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishStatus {
    Skipped,
    Succeeded(String),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub scope: RunScope,
    pub items: Vec<ItemReport>,
    pub source_failures: Vec<SourceFailure>,
    pub publish: PublishStatus,
}

impl RunReport {
    pub fn new(scope: RunScope) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            scope,
            items: Vec::new(),
            source_failures: Vec::new(),
            publish: PublishStatus::Skipped,
        }
    }

    pub fn push(&mut self, episode: Episode, category: Option<String>, outcome: ItemOutcome) {
        self.items.push(ItemReport { episode, category, outcome });
    }

    pub fn push_source_failure(&mut self, source: &str, detail: String) {
        self.source_failures.push(SourceFailure {
            source: source.to_string(),
            detail,
        });
    }

    /// Every item a discovery adapter yielded this run.
    pub fn discovered(&self) -> usize {
        self.items.len()
    }

    /// Items that survived dedup and the time window.
    pub fn new_items(&self) -> usize {
        self.items
            .iter()
            .filter(|i| {
                !matches!(i.outcome, ItemOutcome::SkippedKnown | ItemOutcome::SkippedWindow)
            })
            .count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Done { .. }))
    }

    pub fn scraped(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Scraped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::SkippedKnown | ItemOutcome::SkippedWindow))
    }

    fn count(&self, pred: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.items.iter().filter(|i| pred(&i.outcome)).count()
    }

    /// Human-readable run summary for the notifier and the log. New items
    /// are listed as `[category] title`; failed items carry enough identity
    /// for a manual retry.
    pub fn render(&self, site_url: Option<&str>) -> String {
        let date = self.started_at.format("%Y-%m-%d");
        let mut lines = Vec::new();

        let mode = if self.scope.dry_run {
            " (dry run)"
        } else if self.scope.scrape_only {
            " (scrape only)"
        } else {
            ""
        };

        if self.new_items() == 0 && self.source_failures.is_empty() {
            lines.push(format!("📬 Episode digest · {}{}: no new episodes", date, mode));
        } else {
            lines.push(format!(
                "📬 Episode digest · {}{}: {} new, {} ok, {} failed",
                date,
                mode,
                self.new_items(),
                self.succeeded() + self.scraped(),
                self.failed()
            ));
            lines.push(String::new());
        }

        // Processed items grouped by category, categories in first-seen order.
        let mut categories: Vec<&str> = Vec::new();
        for item in &self.items {
            if matches!(item.outcome, ItemOutcome::Done { .. } | ItemOutcome::Scraped { .. }) {
                let category = item.category.as_deref().unwrap_or("-");
                if !categories.contains(&category) {
                    categories.push(category);
                }
            }
        }
        for category in categories {
            for item in &self.items {
                if matches!(item.outcome, ItemOutcome::Done { .. } | ItemOutcome::Scraped { .. })
                    && item.category.as_deref().unwrap_or("-") == category
                {
                    lines.push(format!("[{}] {}", category, item.episode.title));
                }
            }
        }
        for item in &self.items {
            if item.outcome == ItemOutcome::WouldProcess {
                lines.push(format!("would process: {}", item.episode.title));
            }
        }

        let failures: Vec<&ItemReport> = self
            .items
            .iter()
            .filter(|i| matches!(i.outcome, ItemOutcome::Failed { .. }))
            .collect();
        if !failures.is_empty() || !self.source_failures.is_empty() {
            lines.push(String::new());
            lines.push("Failures:".to_string());
            for item in failures {
                if let ItemOutcome::Failed { stage, detail } = &item.outcome {
                    lines.push(format!(
                        "- {} ({}) at {}: {}",
                        item.episode.title, item.episode.url, stage, detail
                    ));
                }
            }
            for failure in &self.source_failures {
                lines.push(format!("- source '{}': {}", failure.source, failure.detail));
            }
        }

        match &self.publish {
            PublishStatus::Succeeded(detail) => {
                lines.push(String::new());
                lines.push(format!("Publish: ok ({})", detail));
            }
            PublishStatus::Failed(detail) => {
                lines.push(String::new());
                lines.push(format!("Publish: FAILED ({})", detail));
            }
            PublishStatus::Skipped => {}
        }

        if let Some(site) = site_url {
            lines.push(String::new());
            lines.push(format!("🌐 {}", site));
        }

        lines.join("\n")
    }
}
