use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self { name: name.into(), args }
    }
}

/// Outcome of one tool call. Failures are carried in `error`, never raised.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
    #[serde(default)]
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(call: &ToolCall, result: Value) -> Self {
        Self { name: call.name.clone(), args: call.args.clone(), result, error: None }
    }

    pub fn failure(call: &ToolCall, error: impl Into<String>) -> Self {
        Self {
            name: call.name.clone(),
            args: call.args.clone(),
            result: Value::Null,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Model,
    ToolCall,
    ToolResult,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
        }
    }
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TurnRole {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "model" => Ok(Self::Model),
            "tool_call" => Ok(Self::ToolCall),
            "tool_result" => Ok(Self::ToolResult),
            other => Err(format!("unknown turn role `{other}`")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", content = "content", rename_all = "snake_case")]
pub enum Turn {
    User(String),
    Model(String),
    ToolCall(Vec<ToolCall>),
    ToolResult(Vec<ToolResult>),
}

impl Turn {
    pub fn role(&self) -> TurnRole {
        match self {
            Self::User(_) => TurnRole::User,
            Self::Model(_) => TurnRole::Model,
            Self::ToolCall(_) => TurnRole::ToolCall,
            Self::ToolResult(_) => TurnRole::ToolResult,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::User(text) | Self::Model(text) => Some(text),
            Self::ToolCall(_) | Self::ToolResult(_) => None,
        }
    }
}

/// Ordered, append-only turn log for a single conversation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Turns appended at or after position `index`.
    pub fn since(&self, index: usize) -> &[Turn] {
        self.turns.get(index..).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn roles(&self) -> Vec<TurnRole> {
        self.turns.iter().map(Turn::role).collect()
    }

    /// Builds a history from a tail window of stored turns. Leading turns before the
    /// first user turn are dropped so a window never opens on an orphaned tool exchange.
    pub fn from_tail(turns: Vec<Turn>) -> Self {
        let first_user = turns.iter().position(|turn| turn.role() == TurnRole::User);
        match first_user {
            Some(start) => Self { turns: turns.into_iter().skip(start).collect() },
            None => Self::default(),
        }
    }
}

impl From<Vec<Turn>> for ConversationHistory {
    fn from(turns: Vec<Turn>) -> Self {
        Self { turns }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map};

    use super::{ConversationHistory, ToolCall, ToolResult, Turn, TurnRole};

    #[test]
    fn tail_window_starts_at_a_user_turn() {
        let call = ToolCall::new("delete_event", Map::new());
        let tail = vec![
            Turn::ToolResult(vec![ToolResult::success(&call, json!({"status": "success"}))]),
            Turn::Model("Done.".to_string()),
            Turn::User("thanks".to_string()),
            Turn::Model("You're welcome!".to_string()),
        ];

        let history = ConversationHistory::from_tail(tail);

        assert_eq!(history.roles(), vec![TurnRole::User, TurnRole::Model]);
        assert!(ConversationHistory::from_tail(vec![Turn::Model("hi".to_string())]).is_empty());
    }

    #[test]
    fn turns_serialize_with_role_tag() {
        let call = ToolCall::new("set_thermostat", Map::from_iter([("temperature".to_string(), json!(21))]));
        let turn = Turn::ToolCall(vec![call]);

        let encoded = serde_json::to_value(&turn).unwrap();

        assert_eq!(
            encoded,
            json!({"role": "tool_call", "content": [{"name": "set_thermostat", "args": {"temperature": 21}}]})
        );
    }

    #[test]
    fn failed_results_carry_error_and_null_result() {
        let call = ToolCall::new("missing", Map::new());
        let result = ToolResult::failure(&call, "Function missing not found");

        assert!(result.is_error());
        assert_eq!(result.result, serde_json::Value::Null);
        assert_eq!(result.name, "missing");
    }

    #[test]
    fn history_appends_in_order_and_reports_new_turns() {
        let mut history = ConversationHistory::from(vec![Turn::User("hi".into()), Turn::Model("hello".into())]);
        let mark = history.len();

        history.push(Turn::User("book me".into()));
        history.push(Turn::Model("done".into()));

        assert_eq!(history.since(mark).len(), 2);
        assert!(history.since(10).is_empty());
        assert_eq!(
            history.roles(),
            vec![TurnRole::User, TurnRole::Model, TurnRole::User, TurnRole::Model]
        );
        assert_eq!("tool_result".parse::<TurnRole>(), Ok(TurnRole::ToolResult));
    }
}
