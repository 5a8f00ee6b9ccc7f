use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use concierge_core::config::WhatsAppConfig;

/// Cloud API rejects text bodies longer than this many characters.
pub const MAX_TEXT_CHARS: usize = 4096;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel client could not be built: {0}")]
    Client(String),
    #[error("channel request failed: {0}")]
    Request(String),
    #[error("channel request timed out")]
    Timeout,
    #[error("channel API returned {status}: {body}")]
    Api { status: u16, body: String },
}

impl ChannelError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request(_) | Self::Timeout => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Client(_) => false,
        }
    }
}

/// Outbound messaging capability.
#[async_trait]
pub trait MessagingChannel: Send + Sync {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), ChannelError>;
    async fn mark_read(&self, message_id: &str) -> Result<(), ChannelError>;
    async fn typing_indicator(&self, message_id: &str) -> Result<(), ChannelError>;
}

#[derive(Default)]
pub struct NoopChannel;

#[async_trait]
impl MessagingChannel for NoopChannel {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), ChannelError> {
        debug!(event_name = "channel.noop.send_text", %to, chars = body.chars().count(), "dropping outbound text");
        Ok(())
    }

    async fn mark_read(&self, _message_id: &str) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn typing_indicator(&self, _message_id: &str) -> Result<(), ChannelError> {
        Ok(())
    }
}

/// WhatsApp Cloud API client for `/{version}/{phone_number_id}/messages`.
pub struct GraphApiClient {
    http: reqwest::Client,
    endpoint: String,
    token: SecretString,
}

impl GraphApiClient {
    pub fn from_config(config: &WhatsAppConfig) -> Result<Self, ChannelError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| ChannelError::Client(error.to_string()))?;
        let endpoint = format!(
            "{}/{}/{}/messages",
            config.base_url.trim_end_matches('/'),
            config.api_version,
            config.phone_number_id
        );
        Ok(Self { http, endpoint, token: config.api_token.clone() })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, body: &Value) -> Result<(), ChannelError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    ChannelError::Timeout
                } else {
                    ChannelError::Request(error.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        warn!(event_name = "channel.api_error", status = status.as_u16(), %body, "WhatsApp API rejected request");
        Err(ChannelError::Api { status: status.as_u16(), body })
    }
}

#[async_trait]
impl MessagingChannel for GraphApiClient {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), ChannelError> {
        for chunk in split_text(body, MAX_TEXT_CHARS) {
            self.post(&text_message(to, &chunk)).await?;
        }
        Ok(())
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), ChannelError> {
        self.post(&read_receipt(message_id, false)).await
    }

    async fn typing_indicator(&self, message_id: &str) -> Result<(), ChannelError> {
        self.post(&read_receipt(message_id, true)).await
    }
}

pub fn text_message(to: &str, body: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "text",
        "text": { "body": body }
    })
}

/// Read receipt; with `typing` it also shows the typing indicator to the sender.
pub fn read_receipt(message_id: &str, typing: bool) -> Value {
    let mut body = json!({
        "messaging_product": "whatsapp",
        "status": "read",
        "message_id": message_id
    });
    if typing {
        body["typing_indicator"] = json!({ "type": "text" });
    }
    body
}

/// Splits `text` into chunks of at most `limit` characters, breaking at the last
/// newline or space inside the window when there is one.
pub fn split_text(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut rest = text.trim();

    while rest.chars().count() > limit {
        let window_end = rest.char_indices().nth(limit).map_or(rest.len(), |(index, _)| index);
        let window = &rest[..window_end];
        let cut = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&index| index > 0)
            .unwrap_or(window_end);
        chunks.push(rest[..cut].trim_end().to_string());
        rest = rest[cut..].trim_start();
    }
    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use concierge_core::config::WhatsAppConfig;

    use super::{read_receipt, split_text, text_message, ChannelError, GraphApiClient};

    #[test]
    fn endpoint_uses_version_and_phone_number_id() {
        let config = WhatsAppConfig {
            api_token: SecretString::from("token".to_string()),
            phone_number_id: "109876543210".to_string(),
            verify_token: SecretString::from("verify".to_string()),
            api_version: "v22.0".to_string(),
            base_url: "https://graph.facebook.com/".to_string(),
            timeout_secs: 5,
        };

        let client = GraphApiClient::from_config(&config).expect("client");
        assert_eq!(client.endpoint(), "https://graph.facebook.com/v22.0/109876543210/messages");
    }

    #[test]
    fn payloads_match_cloud_api_shapes() {
        let text = text_message("525512345678", "Hola");
        assert_eq!(text["type"], "text");
        assert_eq!(text["text"]["body"], "Hola");

        assert!(read_receipt("wamid.1", false).get("typing_indicator").is_none());
        assert_eq!(read_receipt("wamid.1", true)["typing_indicator"]["type"], "text");
    }

    #[test]
    fn long_text_splits_on_word_boundaries() {
        let chunks = split_text("alpha beta gamma delta", 11);
        assert_eq!(chunks, vec!["alpha beta", "gamma delta"]);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 11));

        assert_eq!(split_text("short", 4096), vec!["short"]);
        assert_eq!(split_text("abcdefgh", 3), vec!["abc", "def", "gh"]);
    }

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(ChannelError::Timeout.is_retryable());
        assert!(ChannelError::Api { status: 503, body: String::new() }.is_retryable());
        assert!(!ChannelError::Api { status: 400, body: String::new() }.is_retryable());
    }
}
