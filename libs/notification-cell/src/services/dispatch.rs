use anyhow::{anyhow, Result};
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use shared_config::AppConfig;

/// Thin client for the outbound messaging API (email/SMS). Dispatch is
/// best-effort everywhere: callers log failures and move on.
pub struct MessagingClient {
    client: Client,
    base_url: String,
    api_token: String,
    sender: String,
}

impl MessagingClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.messaging_api_base_url.clone(),
            api_token: config.messaging_api_token.clone(),
            sender: config.messaging_sender.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && !self.api_token.is_empty()
    }

    pub async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        if !self.is_configured() {
            debug!("Messaging API not configured, skipping email to {}", to);
            return Ok(());
        }

        let url = format!("{}/v1/messages", self.base_url);
        let payload = json!({
            "channel": "email",
            "from": self.sender,
            "to": to,
            "subject": subject,
            "body": body
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!("Messaging API error ({}): {}", status, error_text);
            return Err(anyhow!("Messaging API error ({})", status));
        }

        debug!("Email dispatched to {}", to);
        Ok(())
    }

    pub async fn send_sms(&self, to: &str, body: &str) -> Result<()> {
        if !self.is_configured() {
            debug!("Messaging API not configured, skipping SMS to {}", to);
            return Ok(());
        }

        let url = format!("{}/v1/messages", self.base_url);
        let payload = json!({
            "channel": "sms",
            "to": to,
            "body": body
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!("Messaging API error ({}) sending SMS", status);
            return Err(anyhow!("Messaging API error ({})", status));
        }

        Ok(())
    }
}
