//! Content extraction backends: YouTube transcripts, Substack posts, and a
//! generic HTML fallback. Site detection mirrors the URL heuristics the
//! discovery side uses, so one extractor serves every source kind.

use crate::fetcher::Fetcher;
use crate::types::{PipelineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

const SUBSTACK_DOMAINS: &[&str] = &["substack.com", "dwarkesh.com", "latent.space"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteKind {
    YouTube,
    Substack,
    Generic,
}

impl std::fmt::Display for SiteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SiteKind::YouTube => write!(f, "youtube"),
            SiteKind::Substack => write!(f, "substack"),
            SiteKind::Generic => write!(f, "generic"),
        }
    }
}

pub fn detect_site(url: &str) -> SiteKind {
    if youtube_video_id(url).is_some() || url.contains("youtube.com") || url.contains("youtu.be") {
        return SiteKind::YouTube;
    }
    if SUBSTACK_DOMAINS.iter().any(|d| url.contains(d)) || url.contains("/p/") {
        return SiteKind::Substack;
    }
    SiteKind::Generic
}

/// Extract the video id from the common YouTube URL shapes.
pub fn youtube_video_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    if host.ends_with("youtu.be") {
        return parsed
            .path_segments()
            .and_then(|mut segments| segments.next())
            .filter(|id| !id.is_empty())
            .map(|id| id.to_string());
    }
    if host.ends_with("youtube.com") {
        if parsed.path() == "/watch" {
            return parsed
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.to_string());
        }
        // /shorts/<id> and /live/<id>
        let mut segments = parsed.path_segments()?;
        if let (Some(first), Some(id)) = (segments.next(), segments.next()) {
            if matches!(first, "shorts" | "live" | "embed") && !id.is_empty() {
                return Some(id.to_string());
            }
        }
    }
    None
}

/// Raw text pulled out of an item, plus whatever published date the page
/// itself carries (the feed-provided date takes precedence downstream).
#[derive(Debug, Clone)]
pub struct Extracted {
    pub text: String,
    pub published: Option<DateTime<Utc>>,
    pub site: SiteKind,
}

/// Capability contract: given an item URL, produce raw text or fail.
#[async_trait]
pub trait ExtractContent: Send + Sync {
    async fn extract(&self, url: &str) -> Result<Extracted>;

    /// Best-effort title for the ad-hoc entry point (oembed / og:title).
    async fn resolve_title(&self, url: &str) -> Result<String>;
}

/// Production extractor backed by the shared HTTP fetcher.
pub struct HttpExtractor {
    fetcher: Arc<Fetcher>,
    re_tags: Regex,
    re_blocks: Regex,
    re_caption_tracks: Regex,
    re_transcript_text: Regex,
}

impl HttpExtractor {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self {
            fetcher,
            re_tags: Regex::new(r"(?is)</?[^>]+>").expect("static regex"),
            re_blocks: Regex::new(
                r"(?is)<script\b.*?</script>|<style\b.*?</style>|<nav\b.*?</nav>|<footer\b.*?</footer>|<header\b.*?</header>|<aside\b.*?</aside>|<form\b.*?</form>|<button\b.*?</button>|<iframe\b.*?</iframe>|<noscript\b.*?</noscript>|<svg\b.*?</svg>",
            )
            .expect("static regex"),
            re_caption_tracks: Regex::new(r#""captionTracks"\s*:\s*(\[.*?\])"#)
                .expect("static regex"),
            re_transcript_text: Regex::new(r#"(?s)<text start="([0-9.]+)"[^>]*>(.*?)</text>"#)
                .expect("static regex"),
        }
    }

    async fn extract_youtube(&self, url: &str) -> Result<Extracted> {
        let video_id = youtube_video_id(url)
            .ok_or_else(|| PipelineError::Extraction(format!("no video id in URL: {}", url)))?;

        let watch_url = format!("https://www.youtube.com/watch?v={}", video_id);
        let page = self.fetcher.fetch_text(&watch_url).await?;
        let published = scan_published_date(&page);

        let tracks_json = self
            .re_caption_tracks
            .captures(&page)
            .and_then(|c| c.get(1))
            .ok_or_else(|| {
                PipelineError::Extraction(format!("no caption tracks for video {}", video_id))
            })?;

        let tracks: Vec<CaptionTrack> = serde_json::from_str(tracks_json.as_str())?;
        let track = pick_caption_track(&tracks).ok_or_else(|| {
            PipelineError::Extraction(format!("no usable caption track for video {}", video_id))
        })?;
        debug!(
            "Video {}: using {} captions ({})",
            video_id,
            track.language_code,
            if track.is_generated() { "auto-generated" } else { "manual" }
        );

        let transcript_xml = self.fetcher.fetch_text(&track.base_url).await?;
        let text = self.render_transcript(&transcript_xml)?;
        if text.is_empty() {
            return Err(PipelineError::Extraction(format!(
                "empty transcript for video {}",
                video_id
            )));
        }

        Ok(Extracted { text, published, site: SiteKind::YouTube })
    }

    /// Merge caption cues into paragraphs of roughly 30 seconds, each
    /// prefixed with its start timestamp.
    fn render_transcript(&self, xml: &str) -> Result<String> {
        let mut paragraphs: Vec<String> = Vec::new();
        let mut current_words: Vec<String> = Vec::new();
        let mut paragraph_start = 0.0f64;
        let mut last_break = 0.0f64;

        for cap in self.re_transcript_text.captures_iter(xml) {
            let start: f64 = cap[1].parse().unwrap_or(0.0);
            let raw = self.re_tags.replace_all(&cap[2], " ");
            let cue = html_escape::decode_html_entities(&raw)
                .replace('\n', " ")
                .trim()
                .to_string();
            if cue.is_empty() {
                continue;
            }

            if start - last_break > 30.0 && !current_words.is_empty() {
                paragraphs.push(format!(
                    "[{}] {}",
                    format_timestamp(paragraph_start),
                    current_words.join(" ")
                ));
                current_words.clear();
                paragraph_start = start;
                last_break = start;
            }
            current_words.push(cue);
        }

        if !current_words.is_empty() {
            paragraphs.push(format!(
                "[{}] {}",
                format_timestamp(paragraph_start),
                current_words.join(" ")
            ));
        }

        Ok(paragraphs.join("\n\n"))
    }

    async fn extract_article(&self, url: &str, site: SiteKind) -> Result<Extracted> {
        let html = self.fetcher.fetch_text(url).await?;
        // Date lives in <script> JSON-LD, so scan before stripping blocks.
        let published = scan_published_date(&html);

        let region = main_content_region(&html);
        let stripped = self.re_blocks.replace_all(region, "\n");
        let no_tags = self.re_tags.replace_all(&stripped, "\n");
        let decoded = html_escape::decode_html_entities(&no_tags);

        let lines: Vec<&str> = decoded
            .lines()
            .map(str::trim)
            .filter(|line| line.chars().count() > 5)
            .collect();
        let text = lines.join("\n\n");

        if text.is_empty() {
            return Err(PipelineError::Extraction(format!("no readable content at {}", url)));
        }
        Ok(Extracted { text, published, site })
    }
}

#[async_trait]
impl ExtractContent for HttpExtractor {
    async fn extract(&self, url: &str) -> Result<Extracted> {
        match detect_site(url) {
            SiteKind::YouTube => self.extract_youtube(url).await,
            site => self.extract_article(url, site).await,
        }
    }

    async fn resolve_title(&self, url: &str) -> Result<String> {
        if detect_site(url) == SiteKind::YouTube {
            let oembed = format!(
                "https://www.youtube.com/oembed?url={}&format=json",
                url
            );
            let body = self.fetcher.fetch_text(&oembed).await?;
            #[derive(Deserialize)]
            struct Oembed {
                title: String,
            }
            let parsed: Oembed = serde_json::from_str(&body)?;
            return Ok(parsed.title);
        }

        let html = self.fetcher.fetch_text(url).await?;
        if let Some(title) = scan_og_title(&html) {
            return Ok(title);
        }
        warn!("No og:title or <title> found at {}", url);
        Err(PipelineError::Extraction(format!("no title found at {}", url)))
    }
}

#[derive(Debug, Deserialize)]
struct CaptionTrack {
    #[serde(rename = "baseUrl")]
    base_url: String,
    #[serde(rename = "languageCode", default)]
    language_code: String,
    #[serde(default)]
    kind: Option<String>,
}

impl CaptionTrack {
    fn is_english(&self) -> bool {
        self.language_code.starts_with("en")
    }

    fn is_generated(&self) -> bool {
        self.kind.as_deref() == Some("asr")
    }
}

/// Manually-created English captions first, auto-generated English second,
/// anything else last.
fn pick_caption_track(tracks: &[CaptionTrack]) -> Option<&CaptionTrack> {
    tracks
        .iter()
        .find(|t| t.is_english() && !t.is_generated())
        .or_else(|| tracks.iter().find(|t| t.is_english()))
        .or_else(|| tracks.first())
}

fn format_timestamp(seconds: f64) -> String {
    let total = seconds as u64;
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    if h > 0 {
        format!("{:02}:{:02}:{:02}", h, m, s)
    } else {
        format!("{:02}:{:02}", m, s)
    }
}

/// Narrow a page down to its main content container when one is present.
fn main_content_region(html: &str) -> &str {
    for open in ["<main", "<article", "class=\"available-content\"", "class=\"post-content\""] {
        if let Some(start) = html.find(open) {
            let rest = &html[start..];
            let end = match open {
                "<main" => rest.find("</main>"),
                "<article" => rest.find("</article>"),
                _ => rest.find("</article>").or_else(|| rest.rfind("<footer")),
            };
            return match end {
                Some(e) => &rest[..e],
                None => rest,
            };
        }
    }
    html
}

/// Published date from `article:published_time`, JSON-LD `datePublished`,
/// or YouTube's `publishDate` player field.
fn scan_published_date(html: &str) -> Option<DateTime<Utc>> {
    let patterns = [
        r#"(?s)property="article:published_time"[^>]*content="([^"]+)""#,
        r#"(?s)content="([^"]+)"[^>]*property="article:published_time""#,
        r#""datePublished"\s*:\s*"([^"]+)""#,
        r#""publishDate"\s*:\s*"([^"]+)""#,
    ];
    for pattern in patterns {
        let re = Regex::new(pattern).expect("static regex");
        if let Some(cap) = re.captures(html) {
            if let Some(date) = parse_loose_date(&cap[1]) {
                return Some(date);
            }
        }
    }
    None
}

fn parse_loose_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let head = s.get(..s.len().min(10))?;
    if let Ok(date) = NaiveDate::parse_from_str(head, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc));
    }
    None
}

fn scan_og_title(html: &str) -> Option<String> {
    let patterns = [
        r#"(?is)<meta[^>]+property=["']og:title["'][^>]+content=["'](.*?)["']"#,
        r#"(?is)<meta[^>]+content=["'](.*?)["'][^>]+property=["']og:title["']"#,
        r#"(?is)<title[^>]*>(.*?)</title>"#,
    ];
    for pattern in patterns {
        let re = Regex::new(pattern).expect("static regex");
        if let Some(cap) = re.captures(html) {
            let title = html_escape::decode_html_entities(cap[1].trim()).to_string();
            if !title.is_empty() {
                return Some(title);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_site_kinds() {
        assert_eq!(detect_site("https://youtu.be/abc123"), SiteKind::YouTube);
        assert_eq!(
            detect_site("https://www.dwarkesh.com/p/some-episode"),
            SiteKind::Substack
        );
        assert_eq!(detect_site("https://lexfridman.com/episode"), SiteKind::Generic);
    }

    #[test]
    fn video_id_from_url_shapes() {
        assert_eq!(
            youtube_video_id("https://www.youtube.com/watch?v=abc_123-XY"),
            Some("abc_123-XY".to_string())
        );
        assert_eq!(
            youtube_video_id("https://youtu.be/abc_123-XY?t=12"),
            Some("abc_123-XY".to_string())
        );
        assert_eq!(youtube_video_id("https://example.com/watch?v=x"), None);
    }

    #[test]
    fn timestamps_roll_over_to_hours() {
        assert_eq!(format_timestamp(65.0), "01:05");
        assert_eq!(format_timestamp(3725.0), "01:02:05");
    }

    #[test]
    fn scans_published_dates() {
        let html = r#"<meta property="article:published_time" content="2026-02-13T10:00:00+00:00">"#;
        let date = scan_published_date(html).unwrap();
        assert_eq!(date.to_rfc3339(), "2026-02-13T10:00:00+00:00");

        let jsonld = r#"<script>{"datePublished":"2025-12-26"}</script>"#;
        assert!(scan_published_date(jsonld).is_some());
        assert!(scan_published_date("<p>nothing</p>").is_none());
    }

    #[test]
    fn og_title_beats_title_tag() {
        let html = r#"<title>Site - Post</title><meta property="og:title" content="Post Title">"#;
        assert_eq!(scan_og_title(html), Some("Post Title".to_string()));
        assert_eq!(
            scan_og_title("<title>Only Title</title>"),
            Some("Only Title".to_string())
        );
    }

    #[test]
    fn transcript_paragraphs_break_on_time() {
        let extractor = HttpExtractor::new(Arc::new(
            crate::fetcher::Fetcher::new(crate::fetcher::FetchConfig::default()).unwrap(),
        ));
        let xml = r#"<transcript>
            <text start="0.0" dur="5">hello &amp; welcome</text>
            <text start="10.0" dur="5">to the show</text>
            <text start="45.0" dur="5">second paragraph</text>
        </transcript>"#;
        let text = extractor.render_transcript(xml).unwrap();
        assert!(text.starts_with("[00:00] hello & welcome to the show"));
        assert!(text.contains("\n\n[00:45] second paragraph"));
    }
}
