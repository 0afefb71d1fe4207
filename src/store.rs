//! Persisted artifacts: raw extracted text and summary documents, both
//! keyed by slug.

use crate::types::{Episode, PipelineError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::path::{Path, PathBuf};
use tracing::debug;

const SLUG_MAX_LEN: usize = 80;

/// Stable, filename-safe identifier for an item's artifacts.
pub fn slugify(title: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = true; // suppress a leading dash
    for c in title.to_lowercase().chars() {
        if c.is_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if (c.is_whitespace() || c == '_' || c == '-') && !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let trimmed: String = slug.trim_end_matches('-').chars().take(SLUG_MAX_LEN).collect();
    trimmed.trim_end_matches('-').to_string()
}

pub struct ArtifactStore {
    raw_dir: PathBuf,
    summary_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(raw_dir: impl Into<PathBuf>, summary_dir: impl Into<PathBuf>) -> Self {
        Self {
            raw_dir: raw_dir.into(),
            summary_dir: summary_dir.into(),
        }
    }

    pub async fn ensure_dirs(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.raw_dir).await?;
        tokio::fs::create_dir_all(&self.summary_dir).await?;
        Ok(())
    }

    pub fn raw_path(&self, slug: &str) -> PathBuf {
        self.raw_dir.join(format!("{}.txt", slug))
    }

    pub fn summary_path(&self, slug: &str) -> PathBuf {
        self.summary_dir.join(format!("{}.md", slug))
    }

    /// Write the raw text artifact, prefixed with a metadata header so each
    /// file is self-describing.
    pub async fn write_raw(
        &self,
        slug: &str,
        episode: &Episode,
        site: &str,
        published: Option<DateTime<Utc>>,
        category: &str,
        text: &str,
    ) -> Result<usize> {
        let date = published.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default();
        let header = format!(
            "Title: {}\nURL: {}\nType: {}\nPublished: {}\nCategory: {}\n\n{}\n\n",
            episode.title,
            episode.url,
            site,
            date,
            category,
            "=".repeat(60),
        );
        let path = self.raw_path(slug);
        tokio::fs::write(&path, format!("{}{}", header, text)).await?;
        debug!("Wrote raw text to {}", path.display());
        Ok(text.chars().count())
    }

    /// Write the summary document: a fixed metadata block, then the body.
    pub async fn write_summary(
        &self,
        slug: &str,
        episode: &Episode,
        published: Option<DateTime<Utc>>,
        category: &str,
        body: &str,
    ) -> Result<PathBuf> {
        let date = published.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default();
        let doc = format!(
            "---\ntitle: \"{}\"\nsource: \"{}\"\npublished: \"{}\"\ncategory: \"{}\"\nabstract: \"{}\"\n---\n\n{}\n",
            episode.title.replace('"', "'"),
            episode.source.replace('"', "'"),
            date,
            category,
            abstract_line(body).replace('"', "'"),
            body.trim(),
        );
        let path = self.summary_path(slug);
        tokio::fs::write(&path, doc).await?;
        debug!("Wrote summary to {}", path.display());
        Ok(path)
    }

    /// Read a raw artifact back, splitting the metadata header off the text.
    pub async fn read_raw(&self, slug: &str) -> Result<RawArtifact> {
        let path = self.raw_path(slug);
        let content = tokio::fs::read_to_string(&path).await?;
        let separator = "=".repeat(60);
        let (header, text) = content.split_once(&separator).ok_or_else(|| {
            PipelineError::Extraction(format!("malformed raw artifact: {}", path.display()))
        })?;

        let mut artifact = RawArtifact {
            title: slug.to_string(),
            url: String::new(),
            published: None,
            category: String::new(),
            text: text.trim().to_string(),
        };
        for line in header.lines() {
            if let Some(v) = line.strip_prefix("Title: ") {
                artifact.title = v.to_string();
            } else if let Some(v) = line.strip_prefix("URL: ") {
                artifact.url = v.to_string();
            } else if let Some(v) = line.strip_prefix("Published: ") {
                artifact.published = NaiveDate::parse_from_str(v, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc));
            } else if let Some(v) = line.strip_prefix("Category: ") {
                artifact.category = v.to_string();
            }
        }
        Ok(artifact)
    }

    /// Slugs with a raw artifact but no summary document, sorted.
    pub async fn pending_slugs(&self) -> Result<Vec<String>> {
        let mut slugs = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.raw_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }
            let Some(slug) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            if !self.summary_path(slug).exists() {
                slugs.push(slug.to_string());
            }
        }
        slugs.sort();
        Ok(slugs)
    }

    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }

    pub fn summary_dir(&self) -> &Path {
        &self.summary_dir
    }
}

/// A raw artifact read back from disk: the metadata the header preserved at
/// scrape time, plus the extracted text.
#[derive(Debug, Clone)]
pub struct RawArtifact {
    pub title: String,
    pub url: String,
    pub published: Option<DateTime<Utc>>,
    pub category: String,
    pub text: String,
}

/// One-line abstract: the first body line that is neither a heading nor
/// list furniture, capped for the metadata block.
pub fn abstract_line(body: &str) -> String {
    let line = body
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with('-') && !l.starts_with('|'))
        .unwrap_or("");
    let cleaned = line.replace("**", "");
    if cleaned.chars().count() > 160 {
        let mut cut: String = cleaned.chars().take(157).collect();
        cut.push_str("...");
        cut
    } else {
        cleaned
    }
}
