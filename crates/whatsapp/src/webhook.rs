use chrono::{DateTime, TimeZone, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

pub const MESSAGES_FIELD: &str = "messages";

#[derive(Clone, Debug, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

/// `value` is decoded lazily: template status updates share the envelope but not the shape.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct MessageValue {
    #[serde(default)]
    pub messaging_product: Option<String>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub display_phone_number: String,
    #[serde(default)]
    pub phone_number_id: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub profile: Option<Profile>,
    #[serde(default)]
    pub wa_id: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<TextBody>,
    #[serde(default)]
    pub button: Option<ButtonReply>,
    #[serde(default)]
    pub interactive: Option<InteractiveReply>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TextBody {
    #[serde(default)]
    pub body: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ButtonReply {
    #[serde(default)]
    pub text: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct InteractiveReply {
    #[serde(default)]
    pub button_reply: Option<ReplyOption>,
    #[serde(default)]
    pub list_reply: Option<ReplyOption>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ReplyOption {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    Unsupported { kind: String },
}

/// One inbound user message, normalized out of the webhook envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: String,
    pub from: String,
    pub contact_name: Option<String>,
    pub phone_number_id: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub content: MessageContent,
}

impl InboundMessage {
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(text) => Some(text),
            MessageContent::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookEvent {
    Message(InboundMessage),
    NonMessage { field: String },
    MissingMessageId,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WebhookError {
    #[error("malformed message change: {0}")]
    Malformed(String),
}

/// Classifies the first change of the first entry, which is the only one the Cloud API
/// populates for message notifications.
pub fn classify(payload: &WebhookPayload) -> Result<WebhookEvent, WebhookError> {
    let Some(change) = payload.entry.first().and_then(|entry| entry.changes.first()) else {
        return Ok(WebhookEvent::NonMessage { field: String::new() });
    };
    if change.field != MESSAGES_FIELD {
        return Ok(WebhookEvent::NonMessage { field: change.field.clone() });
    }

    let value: MessageValue = serde_json::from_value(change.value.clone())
        .map_err(|error| WebhookError::Malformed(error.to_string()))?;
    let Some(message) = value.messages.first() else {
        return Ok(WebhookEvent::MissingMessageId);
    };
    let Some(id) = message.id.as_deref().map(str::trim).filter(|id| !id.is_empty()) else {
        return Ok(WebhookEvent::MissingMessageId);
    };

    let contact = value.contacts.first();
    let sender = contact.map(|contact| contact.wa_id.as_str()).filter(|wa_id| !wa_id.is_empty());
    Ok(WebhookEvent::Message(InboundMessage {
        id: id.to_string(),
        from: normalize_phone(sender.unwrap_or(&message.from)),
        contact_name: contact
            .and_then(|contact| contact.profile.as_ref())
            .map(|profile| profile.name.clone())
            .filter(|name| !name.is_empty()),
        phone_number_id: value.metadata.map(|metadata| metadata.phone_number_id),
        sent_at: message.timestamp.as_deref().and_then(parse_epoch_seconds),
        content: content_of(message),
    }))
}

fn content_of(message: &Message) -> MessageContent {
    let text = match message.kind.as_str() {
        "text" => message.text.as_ref().map(|text| text.body.clone()),
        "button" => message.button.as_ref().map(|button| button.text.clone()),
        "interactive" => message.interactive.as_ref().and_then(|interactive| {
            interactive
                .button_reply
                .as_ref()
                .or(interactive.list_reply.as_ref())
                .map(|reply| reply.title.clone())
        }),
        _ => None,
    };

    match text.filter(|body| !body.trim().is_empty()) {
        Some(body) => MessageContent::Text(body),
        None => MessageContent::Unsupported { kind: message.kind.clone() },
    }
}

fn parse_epoch_seconds(raw: &str) -> Option<DateTime<Utc>> {
    let seconds = raw.trim().parse::<i64>().ok()?;
    Utc.timestamp_opt(seconds, 0).single()
}

/// Digits only. Mexican mobile ids arrive as `521` + ten digits but must be addressed
/// as `52` + ten digits.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    match digits.strip_prefix("521") {
        Some(rest) if rest.len() == 10 => format!("52{rest}"),
        _ => digits,
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode", default)]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token", default)]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge", default)]
    pub challenge: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("Invalid verify token")]
    Forbidden,
}

/// Subscription handshake; returns the challenge to echo back.
pub fn verify_subscription(query: &VerifyQuery, expected: &SecretString) -> Result<String, VerifyError> {
    let token_matches = query.verify_token.as_deref() == Some(expected.expose_secret());
    if query.mode.as_deref() == Some("subscribe") && token_matches {
        Ok(query.challenge.clone().unwrap_or_default())
    } else {
        Err(VerifyError::Forbidden)
    }
}
