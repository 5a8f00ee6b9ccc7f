//! Agent runtime: the tool-calling loop that turns a user message into a reply.
//!
//! The loop is bounded:
//! 1. **Model call** (`llm`) - full conversation history plus tool schemas
//! 2. **Tool execution** (`tools`) - every requested call runs concurrently, failures
//!    are captured per call as data
//! 3. **Observation** - calls and results are appended to the history and the model is
//!    asked again, up to `max_turns` times
//!
//! # Key Types
//!
//! - `AgentRuntime` - the orchestrator (see `runtime`)
//! - `LlmClient` - pluggable language-model capability, with a Gemini implementation
//! - `ToolRegistry` / `ToolExecutor` - declared tools and their fan-out executor
//! - `ConversationContext` - the explicit, caller-owned history for one conversation

pub mod conversation;
pub mod gemini;
pub mod llm;
pub mod prompts;
pub mod runtime;
pub mod tools;

pub use conversation::ConversationContext;
pub use llm::{LlmClient, ModelRequest, ModelResponse, ToolSchema};
pub use runtime::{AgentOutcome, AgentRuntime, AgentSettings, Termination};
pub use tools::{Tool, ToolContext, ToolError, ToolExecutor, ToolRegistry, ToolRequirement};
