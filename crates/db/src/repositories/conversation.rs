use chrono::Utc;
use sqlx::Row;

use concierge_core::domain::conversation::{ConversationHistory, Turn};

use super::{decode_turn, encode_turn, ConversationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn load_recent(
        &self,
        conversation_key: &str,
        limit: usize,
    ) -> Result<ConversationHistory, RepositoryError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            "SELECT turn_json FROM (
                SELECT sequence, turn_json
                FROM conversation_turns
                WHERE conversation_key = ?
                ORDER BY sequence DESC
                LIMIT ?
             )
             ORDER BY sequence ASC",
        )
        .bind(conversation_key)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let turns = rows
            .into_iter()
            .map(|row| decode_turn(&row.try_get::<String, _>("turn_json")?))
            .collect::<Result<Vec<Turn>, RepositoryError>>()?;

        Ok(ConversationHistory::from_tail(turns))
    }

    async fn append(&self, conversation_key: &str, turns: &[Turn]) -> Result<(), RepositoryError> {
        if turns.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        let next: i64 = sqlx::query(
            "SELECT COALESCE(MAX(sequence), -1) + 1 AS next
             FROM conversation_turns
             WHERE conversation_key = ?",
        )
        .bind(conversation_key)
        .fetch_one(&mut *tx)
        .await?
        .try_get("next")?;

        let created_at = Utc::now().to_rfc3339();
        for (offset, turn) in (0_i64..).zip(turns) {
            sqlx::query(
                "INSERT INTO conversation_turns (conversation_key, sequence, role, turn_json, created_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(conversation_key)
            .bind(next + offset)
            .bind(turn.role().as_str())
            .bind(encode_turn(turn)?)
            .bind(&created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
