use crate::errors::{MonitorError, Result};
use crate::notify::message::Message;
use crate::notify::notifier::Notifier;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    title: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
}

/// Posts messages as JSON to a push relay
pub struct WebhookNotifier {
    http_client: Client,
    url: String,
    token: Option<String>,
}

impl WebhookNotifier {
    pub fn new(url: String, token: Option<String>, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            url,
            token,
        })
    }

    fn payload<'a>(&'a self, message: &'a Message) -> WebhookPayload<'a> {
        WebhookPayload {
            title: &message.title,
            content: &message.content,
            token: self.token.as_deref(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, message: &Message) -> Result<()> {
        debug!("Posting '{}' to relay", message.title);

        let response = self
            .http_client
            .post(&self.url)
            .json(&self.payload(message))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MonitorError::NotificationError(format!(
                "Relay returned {}: {}",
                status, body
            )));
        }

        Ok(())
    }
}
