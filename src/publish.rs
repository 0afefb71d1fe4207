//! Publish trigger: kicks the external site compilation after a batch
//! completes. Invoked at most once per run; a failure here is reported but
//! never retroactively fails items whose artifacts were already written.

use crate::types::{PipelineError, Result};
use async_trait::async_trait;
use tracing::info;

#[async_trait]
pub trait Publish: Send + Sync {
    /// Run the compilation step once, returning a short human-readable
    /// detail string on success.
    async fn publish(&self) -> Result<String>;
}

/// Runs the operator-configured shell command (typically the static-site
/// generator) as a subprocess.
pub struct CommandPublisher {
    command: String,
}

impl CommandPublisher {
    pub fn new(command: String) -> Self {
        Self { command }
    }
}

#[async_trait]
impl Publish for CommandPublisher {
    async fn publish(&self) -> Result<String> {
        info!("Publishing: {}", self.command);
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .output()
            .await
            .map_err(|e| PipelineError::Publish(format!("cannot spawn '{}': {}", self.command, e)))?;

        if output.status.success() {
            Ok(format!("'{}' completed", self.command))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(PipelineError::Publish(format!(
                "'{}' exited with {}: {}",
                self.command,
                output.status,
                stderr.chars().take(300).collect::<String>().trim()
            )))
        }
    }
}
