use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use thiserror::Error;

use concierge_core::domain::business::{Business, BusinessId, UserProfile};
use concierge_core::domain::conversation::{ConversationHistory, Turn};

pub mod business;
pub mod calendar_service;
pub mod conversation;
pub mod memory;
pub mod message_ledger;

pub use business::{SqlBusinessRepository, SqlUserRepository};
pub use calendar_service::{CalendarServiceRecord, SqlCalendarServiceRepository};
pub use conversation::SqlConversationRepository;
pub use memory::{
    InMemoryBusinessRepository, InMemoryConversationRepository, InMemoryMessageLedger,
    InMemoryUserRepository,
};
pub use message_ledger::SqlMessageLedger;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait BusinessRepository: Send + Sync {
    async fn find_by_id(&self, id: &BusinessId) -> Result<Option<Business>, RepositoryError>;
    async fn save(&self, business: Business) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_phone(
        &self,
        business_id: &BusinessId,
        phone_number: &str,
    ) -> Result<Option<UserProfile>, RepositoryError>;
    async fn save(&self, user: UserProfile) -> Result<(), RepositoryError>;
}

/// Append-only turn storage keyed by conversation (one per sender).
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Loads at most `limit` of the most recent turns, trimmed to start at a user turn.
    async fn load_recent(
        &self,
        conversation_key: &str,
        limit: usize,
    ) -> Result<ConversationHistory, RepositoryError>;

    async fn append(&self, conversation_key: &str, turns: &[Turn]) -> Result<(), RepositoryError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageStatus {
    Processing,
    Completed,
    Skipped,
    /// Failed before any side effect; a redelivery may claim it again.
    Failed,
    /// Failed after the agent ran; never reprocessed.
    Abandoned,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = RepositoryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "skipped" => Ok(Self::Skipped),
            "failed" => Ok(Self::Failed),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(RepositoryError::Decode(format!("unknown message status `{other}`"))),
        }
    }
}

/// Idempotency ledger for inbound messages.
#[async_trait]
pub trait MessageLedger: Send + Sync {
    /// Claims `message_id` for processing. Returns `false` when the message was already
    /// claimed or finished. Only a [`MessageStatus::Failed`] message may be claimed again.
    async fn claim(&self, message_id: &str, sender: &str) -> Result<bool, RepositoryError>;

    async fn finish(
        &self,
        message_id: &str,
        status: MessageStatus,
        error: Option<&str>,
    ) -> Result<(), RepositoryError>;

    async fn status(&self, message_id: &str) -> Result<Option<MessageStatus>, RepositoryError>;
}

pub(crate) fn decode_turn(raw: &str) -> Result<Turn, RepositoryError> {
    serde_json::from_str(raw).map_err(|error| RepositoryError::Decode(error.to_string()))
}

pub(crate) fn encode_turn(turn: &Turn) -> Result<String, RepositoryError> {
    serde_json::to_string(turn).map_err(|error| RepositoryError::Decode(error.to_string()))
}
