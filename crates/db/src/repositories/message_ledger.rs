use chrono::Utc;
use sqlx::Row;

use super::{MessageLedger, MessageStatus, RepositoryError};
use crate::DbPool;

pub struct SqlMessageLedger {
    pool: DbPool,
}

impl SqlMessageLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MessageLedger for SqlMessageLedger {
    async fn claim(&self, message_id: &str, sender: &str) -> Result<bool, RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO processed_messages (message_id, sender, status, error, received_at, updated_at)
             VALUES (?, ?, 'processing', NULL, ?, ?)
             ON CONFLICT(message_id) DO UPDATE SET
                status = 'processing',
                error = NULL,
                updated_at = excluded.updated_at
             WHERE processed_messages.status = 'failed'",
        )
        .bind(message_id)
        .bind(sender)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn finish(
        &self,
        message_id: &str,
        status: MessageStatus,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE processed_messages
             SET status = ?, error = ?, updated_at = ?
             WHERE message_id = ?",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(Utc::now().to_rfc3339())
        .bind(message_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn status(&self, message_id: &str) -> Result<Option<MessageStatus>, RepositoryError> {
        let row = sqlx::query("SELECT status FROM processed_messages WHERE message_id = ?")
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| row.try_get::<String, _>("status")?.parse()).transpose()
    }
}
