use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use concierge_core::domain::conversation::{ToolCall, Turn};

/// Function declaration advertised to the model.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Copy, Debug)]
pub struct ModelRequest<'a> {
    pub system_instruction: &'a str,
    /// Full history; the latest user input is already its last user turn.
    pub history: &'a [Turn],
    pub tools: &'a [ToolSchema],
}

#[derive(Clone, Debug, PartialEq)]
pub enum ModelResponse {
    Text(String),
    ToolCalls(Vec<ToolCall>),
    Empty,
}

impl ModelResponse {
    /// Normalizes blank text and empty call lists to [`ModelResponse::Empty`].
    pub fn normalized(self) -> Self {
        match self {
            Self::Text(text) if text.trim().is_empty() => Self::Empty,
            Self::ToolCalls(calls) if calls.is_empty() => Self::Empty,
            other => other,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, request: ModelRequest<'_>) -> Result<ModelResponse>;
}
