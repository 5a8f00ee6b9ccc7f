use concierge_core::domain::conversation::{ConversationHistory, Turn};

/// Caller-owned history for one conversation.
///
/// The runtime appends to it through `&mut`; the caller persists whatever
/// [`ConversationContext::new_turns`] reports and then calls
/// [`ConversationContext::mark_persisted`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConversationContext {
    key: String,
    history: ConversationHistory,
    persisted: usize,
}

impl ConversationContext {
    /// Starts from previously stored turns; all of them count as persisted.
    pub fn new(key: impl Into<String>, history: ConversationHistory) -> Self {
        let persisted = history.len();
        Self { key: key.into(), history, persisted }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn push(&mut self, turn: Turn) {
        self.history.push(turn);
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn turns(&self) -> &[Turn] {
        self.history.turns()
    }

    /// Turns appended since load or the last [`mark_persisted`](Self::mark_persisted).
    pub fn new_turns(&self) -> &[Turn] {
        self.history.since(self.persisted)
    }

    pub fn mark_persisted(&mut self) {
        self.persisted = self.history.len();
    }
}

#[cfg(test)]
mod tests {
    use concierge_core::domain::conversation::{ConversationHistory, Turn};

    use super::ConversationContext;

    #[test]
    fn tracks_turns_added_after_load() {
        let stored = ConversationHistory::from(vec![
            Turn::User("hi".to_string()),
            Turn::Model("hello".to_string()),
        ]);
        let mut context = ConversationContext::new("5215512345678", stored);
        assert!(context.new_turns().is_empty());

        context.push(Turn::User("book a haircut".to_string()));
        context.push(Turn::Model("done".to_string()));
        assert_eq!(context.new_turns().len(), 2);
        assert_eq!(context.turns().len(), 4);

        context.mark_persisted();
        assert!(context.new_turns().is_empty());
        assert_eq!(context.key(), "5215512345678");
    }
}
