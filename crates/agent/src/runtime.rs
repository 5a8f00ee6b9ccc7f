use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::{error, info, warn};

use concierge_core::config::{AgentConfig, LlmConfig};
use concierge_core::domain::conversation::{ToolResult, Turn};

use crate::conversation::ConversationContext;
use crate::llm::{LlmClient, ModelRequest, ModelResponse, ToolSchema};
use crate::tools::{ToolContext, ToolExecutor};

pub const DEFAULT_MAX_TURNS: usize = 5;
pub const NO_RESPONSE_MESSAGE: &str = "No response generated";
pub const MAX_TURNS_MESSAGE: &str = "Exceeded maximum function calling turns";
pub const SUMMARY_FALLBACK_MESSAGE: &str = "I have completed the requested actions.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AgentSettings {
    pub max_turns: usize,
    pub summarize_on_exhaustion: bool,
    pub model_timeout: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            summarize_on_exhaustion: false,
            model_timeout: Duration::from_secs(60),
        }
    }
}

impl AgentSettings {
    /// The model timeout covers every retry the client may attempt.
    pub fn from_config(agent: &AgentConfig, llm: &LlmConfig) -> Self {
        let attempts = u64::from(llm.max_retries) + 1;
        Self {
            max_turns: agent.max_turns,
            summarize_on_exhaustion: agent.summarize_on_exhaustion,
            model_timeout: Duration::from_secs(llm.timeout_secs.saturating_mul(attempts)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    Responded,
    NoResponse,
    MaxTurns,
    Failed,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Responded => "responded",
            Self::NoResponse => "no_response",
            Self::MaxTurns => "max_turns",
            Self::Failed => "failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AgentOutcome {
    pub final_text: String,
    /// Every tool result across all turns, in execution order.
    pub tool_results: Vec<ToolResult>,
    /// Set when any single turn executed more than one call.
    pub is_parallel_execution: bool,
    pub termination: Termination,
    pub turns_used: usize,
}

/// Bounded think / act / observe loop over one conversation.
pub struct AgentRuntime {
    model: Arc<dyn LlmClient>,
    executor: ToolExecutor,
    settings: AgentSettings,
}

struct LoopState {
    tool_results: Vec<ToolResult>,
    is_parallel_execution: bool,
    turns_used: usize,
}

impl LoopState {
    fn finish(self, final_text: impl Into<String>, termination: Termination) -> AgentOutcome {
        AgentOutcome {
            final_text: final_text.into(),
            tool_results: self.tool_results,
            is_parallel_execution: self.is_parallel_execution,
            termination,
            turns_used: self.turns_used,
        }
    }
}

impl AgentRuntime {
    pub fn new(model: Arc<dyn LlmClient>, executor: ToolExecutor, settings: AgentSettings) -> Self {
        Self { model, executor, settings }
    }

    pub fn settings(&self) -> AgentSettings {
        self.settings
    }

    /// Appends `input` as a user turn and drives the model until it answers in text,
    /// gives up, or `max_turns` model calls have been spent. Every turn produced on
    /// the way stays in `conversation`, whatever the exit path.
    pub async fn run(
        &self,
        conversation: &mut ConversationContext,
        input: &str,
        system_instruction: &str,
        context: &ToolContext,
    ) -> AgentOutcome {
        conversation.push(Turn::User(input.to_string()));
        let schemas = self.executor.registry().schemas();
        let mut state = LoopState { tool_results: Vec::new(), is_parallel_execution: false, turns_used: 0 };

        while state.turns_used < self.settings.max_turns {
            state.turns_used += 1;
            let response = match self.generate(system_instruction, conversation.turns(), &schemas).await {
                Ok(response) => response,
                Err(failure) => {
                    error!(
                        event_name = "agent.model.failed",
                        correlation_id = %context.correlation_id,
                        turn = state.turns_used,
                        error = %failure,
                        "model call failed"
                    );
                    return state.finish(format!("Error: {failure}"), Termination::Failed);
                }
            };

            match response {
                ModelResponse::Text(text) => {
                    conversation.push(Turn::Model(text.clone()));
                    info!(
                        event_name = "agent.responded",
                        correlation_id = %context.correlation_id,
                        turns = state.turns_used,
                        tool_calls = state.tool_results.len(),
                        "model produced final text"
                    );
                    return state.finish(text, Termination::Responded);
                }
                ModelResponse::Empty => {
                    warn!(
                        event_name = "agent.no_response",
                        correlation_id = %context.correlation_id,
                        turn = state.turns_used,
                        "model returned neither text nor tool calls"
                    );
                    return state.finish(NO_RESPONSE_MESSAGE, Termination::NoResponse);
                }
                ModelResponse::ToolCalls(calls) => {
                    info!(
                        event_name = "agent.turn",
                        correlation_id = %context.correlation_id,
                        turn = state.turns_used,
                        calls = calls.len(),
                        "executing tool calls"
                    );
                    if calls.len() > 1 {
                        state.is_parallel_execution = true;
                    }
                    let results = self.executor.execute_many(&calls, context).await;
                    conversation.push(Turn::ToolCall(calls));
                    conversation.push(Turn::ToolResult(results.clone()));
                    state.tool_results.extend(results);
                }
            }
        }

        warn!(
            event_name = "agent.max_turns",
            correlation_id = %context.correlation_id,
            max_turns = self.settings.max_turns,
            "tool-calling turns exhausted"
        );
        if !self.settings.summarize_on_exhaustion {
            return state.finish(MAX_TURNS_MESSAGE, Termination::MaxTurns);
        }

        let summary = self.summarize(system_instruction, &state.tool_results, context).await;
        conversation.push(Turn::Model(summary.clone()));
        state.finish(summary, Termination::MaxTurns)
    }

    async fn generate(
        &self,
        system_instruction: &str,
        history: &[Turn],
        tools: &[ToolSchema],
    ) -> Result<ModelResponse> {
        let request = ModelRequest { system_instruction, history, tools };
        let timeout = self.settings.model_timeout;
        tokio::time::timeout(timeout, self.model.generate(request))
            .await
            .map_err(|_| anyhow!("language model timed out after {}s", timeout.as_secs()))?
    }

    /// One tool-less model call over the accumulated results.
    async fn summarize(
        &self,
        system_instruction: &str,
        results: &[ToolResult],
        context: &ToolContext,
    ) -> String {
        let prompt = summary_prompt(results);
        let history = [Turn::User(prompt)];

        match self.generate(system_instruction, &history, &[]).await {
            Ok(ModelResponse::Text(text)) => text,
            Ok(_) => SUMMARY_FALLBACK_MESSAGE.to_string(),
            Err(failure) => {
                warn!(
                    event_name = "agent.summary.failed",
                    correlation_id = %context.correlation_id,
                    error = %failure,
                    "summary call failed"
                );
                SUMMARY_FALLBACK_MESSAGE.to_string()
            }
        }
    }
}

fn summary_prompt(results: &[ToolResult]) -> String {
    let rendered: Vec<String> = results
        .iter()
        .map(|result| {
            let payload = match &result.error {
                Some(error) => serde_json::json!({ "error": error }),
                None => result.result.clone(),
            };
            format!("{}: {}", result.name, payload)
        })
        .collect();
    format!("Summarize what was accomplished: {}", rendered.join(", "))
}
