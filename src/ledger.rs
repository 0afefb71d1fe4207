//! Durable dedup ledger: one row per natural item key, surviving process
//! restarts. The coordinator is the only writer, and each record is a single
//! upsert statement, so an interrupt never leaves a partially-written entry.

use crate::types::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Terminal outcome recorded for a processed item. `Succeeded` and
/// `Scraped` block automatic reprocessing; `Failed` items are retried on
/// the next run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOutcome {
    Succeeded,
    Scraped,
    Failed,
}

impl LedgerOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerOutcome::Succeeded => "succeeded",
            LedgerOutcome::Scraped => "scraped",
            LedgerOutcome::Failed => "failed",
        }
    }

    /// Whether this outcome makes the key permanently known.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LedgerOutcome::Failed)
    }
}

impl FromStr for LedgerOutcome {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "succeeded" => Ok(LedgerOutcome::Succeeded),
            "scraped" => Ok(LedgerOutcome::Scraped),
            "failed" => Ok(LedgerOutcome::Failed),
            other => Err(format!("unknown ledger outcome: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub key: String,
    pub slug: String,
    pub outcome: LedgerOutcome,
    pub processed_at: DateTime<Utc>,
}

pub struct Ledger {
    pool: SqlitePool,
}

impl Ledger {
    /// Open (or create) the ledger file. Failure here is fatal to the run.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS episodes (
                key TEXT PRIMARY KEY,
                slug TEXT NOT NULL,
                outcome TEXT NOT NULL,
                processed_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        let ledger = Self { pool };
        info!(
            "Ledger open at {} ({} known item(s))",
            path.display(),
            ledger.len().await?
        );
        Ok(ledger)
    }

    /// The authority for "is this new": true when the key is absent or its
    /// last attempt failed. A key that once recorded a terminal outcome is
    /// never reprocessed automatically.
    pub async fn is_new(&self, key: &str) -> Result<bool> {
        match self.get(key).await? {
            Some(entry) => Ok(!entry.outcome.is_terminal()),
            None => Ok(true),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<LedgerEntry>> {
        let row = sqlx::query("SELECT key, slug, outcome, processed_at FROM episodes WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(entry_from_row))
    }

    /// Look an entry up by artifact slug, for operations that start from a
    /// file on disk rather than a discovered item.
    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<LedgerEntry>> {
        let row = sqlx::query("SELECT key, slug, outcome, processed_at FROM episodes WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(entry_from_row))
    }

    /// Idempotent upsert: recording the same key twice overwrites, never
    /// duplicates.
    pub async fn record(&self, key: &str, outcome: LedgerOutcome, slug: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO episodes (key, slug, outcome, processed_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (key) DO UPDATE SET
                slug = excluded.slug,
                outcome = excluded.outcome,
                processed_at = excluded.processed_at
            "#,
        )
        .bind(key)
        .bind(slug)
        .bind(outcome.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        debug!("Ledger: {} -> {}", key, outcome.as_str());
        Ok(())
    }

    /// Full key enumeration, for diagnostics.
    pub async fn all_keys(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT key FROM episodes ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| row.get("key")).collect())
    }

    pub async fn len(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM episodes")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n") as u64)
    }
}

fn entry_from_row(row: sqlx::sqlite::SqliteRow) -> LedgerEntry {
    LedgerEntry {
        key: row.get("key"),
        slug: row.get("slug"),
        outcome: row
            .get::<String, _>("outcome")
            .parse()
            .unwrap_or(LedgerOutcome::Failed),
        processed_at: row.get("processed_at"),
    }
}
