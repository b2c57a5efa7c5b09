//! Slack incoming-webhook sender.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::SendError;
use crate::traits::Sender;

#[derive(Clone, Default)]
pub struct SlackSender {
    client: Client,
}

impl SlackSender {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

#[async_trait]
impl Sender for SlackSender {
    async fn send(&self, endpoint: &str, text: &str, timeout: Duration) -> Result<(), SendError> {
        let body = serde_json::json!({ "text": text });

        let response = self
            .client
            .post(endpoint)
            .timeout(timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(status = status.as_u16(), chars = text.chars().count(), "slack message delivered");
        Ok(())
    }
}
