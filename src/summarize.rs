//! Summarization capability: turn an episode's raw text into a structured
//! summary via an OpenAI-compatible chat-completions endpoint.

use crate::types::{Episode, PipelineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

pub const API_KEY_ENV: &str = "ARK_API_KEY";
const DEFAULT_BASE_URL: &str = "https://ark.cn-beijing.volces.com/api/v3";
const DEFAULT_MODEL: &str = "doubao-seed-2-0-pro-260215";
const DEFAULT_MAX_TOKENS: u32 = 32_000;
// A long transcript can take the model a while.
const REQUEST_TIMEOUT_SECS: u64 = 600;

const DEFAULT_TEMPLATE: &str = "\
Produce a structured summary with these sections:\n\
1. A short overview paragraph.\n\
2. Detailed key points as nested bullets, with claims, data, and reasoning \
preserved (never elide with 'etc.').\n\
3. One or two representative quotes.\n\
4. A glossary table of technical terms used in this episode.\n";

/// Capability contract: given raw text, produce structured summary text or
/// fail. The call applies its own timeout; the coordinator treats a timeout
/// like any other stage failure.
#[async_trait]
pub trait Summarize: Send + Sync {
    async fn summarize(&self, episode: &Episode, category: &str, raw_text: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub api_key: String,
}

impl SummarizerConfig {
    /// Read the API key from the environment; model and endpoint can be
    /// overridden with ARK_BASE_URL / ARK_MODEL.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| PipelineError::Config(format!("{} is not set", API_KEY_ENV)))?;
        Ok(Self {
            base_url: std::env::var("ARK_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            model: std::env::var("ARK_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            max_tokens: DEFAULT_MAX_TOKENS,
            api_key,
        })
    }
}

/// Production summarizer speaking the OpenAI chat-completions protocol.
pub struct ArkSummarizer {
    client: reqwest::Client,
    config: SummarizerConfig,
    template: String,
}

impl ArkSummarizer {
    pub fn new(config: SummarizerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            config,
            template: DEFAULT_TEMPLATE.to_string(),
        })
    }

    /// Load the summary format rules from a template file, falling back to
    /// the built-in template when the file is absent.
    pub fn with_template_file(mut self, path: &std::path::Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(template) => self.template = template,
            Err(e) => debug!("No template at {} ({}), using built-in", path.display(), e),
        }
        self
    }

    fn build_request(&self, episode: &Episode, category: &str, raw_text: &str) -> ChatRequest {
        let today = chrono::Utc::now().format("%Y-%m-%d");
        let system = format!(
            "You are an expert podcast-content editor. Today's date is {}.\n\n\
             Formatting rules for the summary:\n\n{}",
            today, self.template
        );
        let user = format!(
            "Summarize the following episode according to the rules above.\n\n\
             Title: {}\nSource: {}\nCategory: {}\n\nTranscript:\n\n{}",
            episode.title, episode.source, category, raw_text
        );
        ChatRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            messages: vec![
                ChatMessage { role: "system".to_string(), content: system },
                ChatMessage { role: "user".to_string(), content: user },
            ],
        }
    }
}

#[async_trait]
impl Summarize for ArkSummarizer {
    async fn summarize(&self, episode: &Episode, category: &str, raw_text: &str) -> Result<String> {
        info!(
            "Summarizing '{}' with {} ({} chars of input)",
            episode.title,
            self.config.model,
            raw_text.chars().count()
        );

        let request = self.build_request(episode, category, raw_text);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::Summarization(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Summarization(format!(
                "API returned {}: {}",
                status,
                body.chars().take(300).collect::<String>()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Summarization(format!("bad response body: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| PipelineError::Summarization("empty choices in response".to_string()))?;

        Ok(strip_code_fence(&content))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Models sometimes wrap the whole output in a code fence; peel it off.
fn strip_code_fence(text: &str) -> String {
    let mut result = text.trim();
    if let Some(rest) = result.strip_prefix("```") {
        // drop an optional language tag on the fence line
        result = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    }
    if let Some(rest) = result.strip_suffix("```") {
        result = rest;
    }
    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences_with_and_without_language() {
        assert_eq!(strip_code_fence("```markdown\n# Hi\n```"), "# Hi");
        assert_eq!(strip_code_fence("```\nbody\n```"), "body");
        assert_eq!(strip_code_fence("plain text"), "plain text");
    }
}
