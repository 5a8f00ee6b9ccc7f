use std::collections::HashMap;

use tokio::sync::RwLock;

use concierge_core::domain::business::{Business, BusinessId, UserProfile};
use concierge_core::domain::conversation::{ConversationHistory, Turn};

use super::{
    BusinessRepository, ConversationRepository, MessageLedger, MessageStatus, RepositoryError,
    UserRepository,
};

#[derive(Default)]
pub struct InMemoryBusinessRepository {
    businesses: RwLock<HashMap<String, Business>>,
}

#[async_trait::async_trait]
impl BusinessRepository for InMemoryBusinessRepository {
    async fn find_by_id(&self, id: &BusinessId) -> Result<Option<Business>, RepositoryError> {
        let businesses = self.businesses.read().await;
        Ok(businesses.get(&id.0).cloned())
    }

    async fn save(&self, business: Business) -> Result<(), RepositoryError> {
        let mut businesses = self.businesses.write().await;
        businesses.insert(business.id.0.clone(), business);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<(String, String), UserProfile>>,
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_phone(
        &self,
        business_id: &BusinessId,
        phone_number: &str,
    ) -> Result<Option<UserProfile>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(&(business_id.0.clone(), phone_number.to_string())).cloned())
    }

    async fn save(&self, user: UserProfile) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        let key = (user.business_id.0.clone(), user.phone_number.clone());
        let merged = match users.remove(&key) {
            Some(existing) => UserProfile {
                display_name: user.display_name.or(existing.display_name),
                notes: user.notes.or(existing.notes),
                ..existing
            },
            None => user,
        };
        users.insert(key, merged);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryConversationRepository {
    conversations: RwLock<HashMap<String, Vec<Turn>>>,
}

#[async_trait::async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn load_recent(
        &self,
        conversation_key: &str,
        limit: usize,
    ) -> Result<ConversationHistory, RepositoryError> {
        let conversations = self.conversations.read().await;
        let turns = conversations.get(conversation_key).map(Vec::as_slice).unwrap_or(&[]);
        let tail = turns[turns.len().saturating_sub(limit)..].to_vec();
        Ok(ConversationHistory::from_tail(tail))
    }

    async fn append(&self, conversation_key: &str, turns: &[Turn]) -> Result<(), RepositoryError> {
        let mut conversations = self.conversations.write().await;
        conversations.entry(conversation_key.to_string()).or_default().extend_from_slice(turns);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryMessageLedger {
    entries: RwLock<HashMap<String, MessageStatus>>,
}

#[async_trait::async_trait]
impl MessageLedger for InMemoryMessageLedger {
    async fn claim(&self, message_id: &str, _sender: &str) -> Result<bool, RepositoryError> {
        let mut entries = self.entries.write().await;
        match entries.get(message_id) {
            Some(MessageStatus::Failed) | None => {
                entries.insert(message_id.to_string(), MessageStatus::Processing);
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    async fn finish(
        &self,
        message_id: &str,
        status: MessageStatus,
        _error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(message_id) {
            *entry = status;
        }
        Ok(())
    }

    async fn status(&self, message_id: &str) -> Result<Option<MessageStatus>, RepositoryError> {
        let entries = self.entries.read().await;
        Ok(entries.get(message_id).copied())
    }
}

#[cfg(test)]
mod tests {
    use concierge_core::domain::business::{BusinessId, UserProfile};
    use concierge_core::domain::conversation::{Turn, TurnRole};

    use crate::repositories::{
        ConversationRepository, InMemoryConversationRepository, InMemoryMessageLedger,
        InMemoryUserRepository, MessageLedger, MessageStatus, UserRepository,
    };

    #[tokio::test]
    async fn in_memory_conversation_keeps_recent_tail() {
        let repo = InMemoryConversationRepository::default();
        repo.append(
            "c-1",
            &[
                Turn::User("hi".to_string()),
                Turn::Model("hello".to_string()),
                Turn::User("book me".to_string()),
                Turn::Model("done".to_string()),
            ],
        )
        .await
        .expect("append");

        let history = repo.load_recent("c-1", 2).await.expect("load");
        assert_eq!(history.roles(), vec![TurnRole::User, TurnRole::Model]);
        assert_eq!(history.turns()[0].text(), Some("book me"));
    }

    #[tokio::test]
    async fn in_memory_ledger_matches_sql_semantics() {
        let ledger = InMemoryMessageLedger::default();

        assert!(ledger.claim("m-1", "s").await.expect("claim"));
        assert!(!ledger.claim("m-1", "s").await.expect("duplicate"));
        ledger.finish("m-1", MessageStatus::Failed, Some("boom")).await.expect("finish");
        assert!(ledger.claim("m-1", "s").await.expect("retry"));
        ledger.finish("m-1", MessageStatus::Abandoned, Some("boom")).await.expect("finish");
        assert!(!ledger.claim("m-1", "s").await.expect("abandoned"));
    }

    #[tokio::test]
    async fn in_memory_user_save_merges_fields() {
        let repo = InMemoryUserRepository::default();
        let business = BusinessId("b".to_string());
        let mut first = UserProfile::new(business.clone(), "1");
        first.notes = Some("VIP".to_string());
        repo.save(first).await.expect("save");
        let mut second = UserProfile::new(business.clone(), "1");
        second.display_name = Some("Luis".to_string());
        repo.save(second).await.expect("save");

        let stored = repo.find_by_phone(&business, "1").await.expect("find").expect("user");
        assert_eq!(stored.notes.as_deref(), Some("VIP"));
        assert_eq!(stored.display_name.as_deref(), Some("Luis"));
    }
}
