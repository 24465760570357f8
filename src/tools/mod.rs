//! Read-only tools: host status and screenshots

pub mod screenshot;
pub mod status;

use crate::error::{Error, Result};
use async_trait::async_trait;

/// Status / screenshot collaborator
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Text status report
    async fn status(&self) -> Result<String>;

    /// Raw image bytes (PNG)
    async fn screenshot(&self) -> Result<Vec<u8>>;
}

/// Tools backed by the local machine
#[derive(Debug, Clone)]
pub struct SystemTools {
    screenshot_command: Vec<String>,
}

impl SystemTools {
    pub fn new(screenshot_command: Vec<String>) -> Self {
        Self { screenshot_command }
    }
}

#[async_trait]
impl ToolProvider for SystemTools {
    async fn status(&self) -> Result<String> {
        tokio::task::spawn_blocking(status::system_report)
            .await
            .map_err(|e| Error::Tool(format!("status task failed: {}", e)))
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let command = self.screenshot_command.clone();
        tokio::task::spawn_blocking(move || screenshot::capture(&command))
            .await
            .map_err(|e| Error::Tool(format!("screenshot task failed: {}", e)))?
    }
}

/// Fixed responses, for tests
#[cfg(test)]
#[derive(Default)]
pub(crate) struct StaticTools {
    pub status: String,
    pub image: Vec<u8>,
    /// Simulated capture time
    pub delay: std::time::Duration,
}

#[cfg(test)]
#[async_trait]
impl ToolProvider for StaticTools {
    async fn status(&self) -> Result<String> {
        Ok(self.status.clone())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        tokio::time::sleep(self.delay).await;
        if self.image.is_empty() {
            return Err(Error::Tool("no display".to_string()));
        }
        Ok(self.image.clone())
    }
}
