//! Fire-and-forget notifications to an external channel.

use std::time::Duration;

use async_trait::async_trait;
use log::info;
use reqwest::Client;
use serde_json::json;

use crate::error::{EarbotError, Result};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str) -> Result<()>;
}

/// Posts `{"text": ...}` to an incoming-webhook URL
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, text: &str) -> Result<()> {
        let response = self.client.post(&self.url).json(&json!({ "text": text })).send().await?;
        if !response.status().is_success() {
            return Err(EarbotError::Collaborator(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Writes notifications to the log when no channel is configured
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, text: &str) -> Result<()> {
        info!("Notification: {}", text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        assert!(LogNotifier.notify("EAR merged").await.is_ok());
    }

    #[tokio::test]
    async fn test_webhook_unreachable_is_collaborator_error() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/hook").unwrap();
        assert!(matches!(
            notifier.notify("hello").await,
            Err(EarbotError::Collaborator(_))
        ));
    }
}
