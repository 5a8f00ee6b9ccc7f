use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{info, warn};

use concierge_core::domain::conversation::{ToolCall, ToolResult};

use super::{ToolContext, ToolError, ToolRegistry, ToolRequirement};

/// Runs tool calls against a registry. Every call yields exactly one [`ToolResult`];
/// failures, timeouts and panics are captured as the result's `error`.
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub async fn execute_one(&self, call: &ToolCall, context: &ToolContext) -> ToolResult {
        match run_call(&self.registry, call, context, self.timeout).await {
            Ok(value) => ToolResult::success(call, value),
            Err(error) => {
                warn!(
                    event_name = "agent.tool.failed",
                    correlation_id = %context.correlation_id,
                    tool = %call.name,
                    error = %error,
                    "tool call failed"
                );
                ToolResult::failure(call, error.to_string())
            }
        }
    }

    /// Fans all calls out concurrently and joins them; output order matches `calls`.
    pub async fn execute_many(&self, calls: &[ToolCall], context: &ToolContext) -> Vec<ToolResult> {
        let handles = calls.iter().cloned().map(|call| {
            let executor = self.clone();
            let context = context.clone();
            tokio::spawn(async move { executor.execute_one(&call, &context).await })
        });

        let joined = join_all(handles).await;
        let results: Vec<ToolResult> = joined
            .into_iter()
            .zip(calls)
            .map(|(outcome, call)| {
                outcome.unwrap_or_else(|error| {
                    warn!(
                        event_name = "agent.tool.panicked",
                        correlation_id = %context.correlation_id,
                        tool = %call.name,
                        error = %error,
                        "tool task aborted"
                    );
                    ToolResult::failure(call, format!("tool task aborted: {error}"))
                })
            })
            .collect();

        info!(
            event_name = "agent.tools.executed",
            correlation_id = %context.correlation_id,
            calls = calls.len(),
            failed = results.iter().filter(|result| result.is_error()).count(),
            "tool batch finished"
        );
        results
    }
}

async fn run_call(
    registry: &ToolRegistry,
    call: &ToolCall,
    context: &ToolContext,
    timeout: Duration,
) -> Result<serde_json::Value, ToolError> {
    let tool = registry.get(&call.name)?;
    let context = match tool.requirement() {
        ToolRequirement::Context => Some(context),
        ToolRequirement::Standalone => None,
    };

    tokio::time::timeout(timeout, tool.execute(call.args.clone(), context))
        .await
        .map_err(|_| ToolError::Timeout { tool: call.name.clone(), secs: timeout.as_secs() })?
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Map, Value};
    use tokio::sync::Mutex;

    use concierge_core::domain::conversation::ToolCall;

    use super::ToolExecutor;
    use crate::llm::ToolSchema;
    use crate::tools::{Tool, ToolArgs, ToolContext, ToolError, ToolRegistry, ToolRequirement};

    struct Sleepy {
        name: &'static str,
        delay_ms: u64,
        finished: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Tool for Sleepy {
        fn name(&self) -> &'static str {
            self.name
        }

        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: self.name.to_string(),
                description: String::new(),
                parameters: json!({ "type": "object" }),
            }
        }

        async fn execute(
            &self,
            _args: ToolArgs,
            _context: Option<&ToolContext>,
        ) -> Result<Value, ToolError> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            self.finished.lock().await.push(self.name);
            Ok(json!({ "tool": self.name }))
        }
    }

    struct ContextEcho;

    #[async_trait]
    impl Tool for ContextEcho {
        fn name(&self) -> &'static str {
            "context_echo"
        }

        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "context_echo".to_string(),
                description: String::new(),
                parameters: json!({ "type": "object" }),
            }
        }

        fn requirement(&self) -> ToolRequirement {
            ToolRequirement::Context
        }

        async fn execute(
            &self,
            _args: ToolArgs,
            context: Option<&ToolContext>,
        ) -> Result<Value, ToolError> {
            Ok(json!({ "business": context.map(|context| context.business_id.clone()) }))
        }
    }

    struct Failing;

    #[async_trait]
    impl Tool for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "failing".to_string(),
                description: String::new(),
                parameters: json!({ "type": "object" }),
            }
        }

        async fn execute(
            &self,
            _args: ToolArgs,
            _context: Option<&ToolContext>,
        ) -> Result<Value, ToolError> {
            Err(ToolError::Failed { tool: "failing".to_string(), message: "boom".to_string() })
        }
    }

    fn context() -> ToolContext {
        ToolContext {
            business_id: "clinic-1".to_string(),
            conversation_key: "5215512345678".to_string(),
            correlation_id: "wamid.test".to_string(),
        }
    }

    fn call(name: &str) -> ToolCall {
        ToolCall::new(name, Map::new())
    }

    #[tokio::test]
    async fn results_keep_call_order_and_isolate_failures() {
        let finished = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ToolRegistry::default();
        registry.register(Sleepy { name: "slow", delay_ms: 60, finished: finished.clone() });
        registry.register(Sleepy { name: "fast", delay_ms: 1, finished: finished.clone() });
        registry.register(Failing);
        let executor = ToolExecutor::new(Arc::new(registry), Duration::from_secs(5));

        let results = executor
            .execute_many(&[call("slow"), call("missing"), call("failing"), call("fast")], &context())
            .await;

        let names: Vec<&str> = results.iter().map(|result| result.name.as_str()).collect();
        assert_eq!(names, vec!["slow", "missing", "failing", "fast"]);
        assert_eq!(results[0].result, json!({ "tool": "slow" }));
        assert_eq!(results[1].error.as_deref(), Some("Function 'missing' not found"));
        assert_eq!(results[2].error.as_deref(), Some("`failing` failed: boom"));
        assert!(!results[3].is_error());
        assert_eq!(*finished.lock().await, vec!["fast", "slow"], "calls ran concurrently");
    }

    #[tokio::test]
    async fn context_is_passed_only_to_tools_that_declare_it() {
        let mut registry = ToolRegistry::default();
        registry.register(ContextEcho);
        let executor = ToolExecutor::new(Arc::new(registry), Duration::from_secs(5));

        let result = executor.execute_one(&call("context_echo"), &context()).await;

        assert_eq!(result.result, json!({ "business": "clinic-1" }));
    }

    #[tokio::test]
    async fn slow_tools_time_out_as_data() {
        let mut registry = ToolRegistry::default();
        registry.register(Sleepy {
            name: "glacial",
            delay_ms: 5_000,
            finished: Arc::new(Mutex::new(Vec::new())),
        });
        let executor = ToolExecutor::new(Arc::new(registry), Duration::from_millis(20));

        let result = executor.execute_one(&call("glacial"), &context()).await;

        assert!(result.error.as_deref().is_some_and(|error| error.contains("timed out")));
    }
}
