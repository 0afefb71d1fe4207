//! Notifier hook: hands the finished run report to an external sink.
//! Fire-and-forget from the coordinator's perspective — a notifier failure
//! is logged and never escalated to fail the run.

use crate::report::RunReport;
use crate::types::{PipelineError, Result};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::info;

pub const WEBHOOK_ENV: &str = "FEISHU_WEBHOOK_URL";
const WEBHOOK_TIMEOUT_SECS: u64 = 10;

#[async_trait]
pub trait Notify: Send + Sync {
    async fn notify(&self, report: &RunReport) -> Result<()>;
}

/// Posts the rendered report as a text message to a Feishu-style group
/// webhook.
pub struct WebhookNotifier {
    webhook_url: String,
    site_url: Option<String>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(webhook_url: String, site_url: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
            .build()?;
        Ok(Self { webhook_url, site_url, client })
    }

    /// Webhook URL from the environment, falling back to the config value.
    /// Returns None when neither is set (notifications silently disabled).
    pub fn from_env_or_config(config_url: Option<&str>, site_url: Option<String>) -> Result<Option<Self>> {
        let url = std::env::var(WEBHOOK_ENV)
            .ok()
            .filter(|u| !u.is_empty())
            .or_else(|| config_url.map(String::from));
        match url {
            Some(url) => Ok(Some(Self::new(url, site_url)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Notify for WebhookNotifier {
    async fn notify(&self, report: &RunReport) -> Result<()> {
        let text = report.render(self.site_url.as_deref());
        let payload = json!({
            "msg_type": "text",
            "content": { "text": text },
        });

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Notify(format!(
                "webhook returned {}",
                status
            )));
        }
        info!("Run report delivered to webhook ({} item(s))", report.discovered());
        Ok(())
    }
}
