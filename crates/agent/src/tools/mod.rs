use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::llm::ToolSchema;

pub mod calendar;
pub mod devices;
pub mod executor;
pub mod knowledge;

pub use executor::ToolExecutor;

pub type ToolArgs = Map<String, Value>;

/// Ambient request data handed to tools that declare [`ToolRequirement::Context`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolContext {
    pub business_id: String,
    pub conversation_key: String,
    pub correlation_id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolRequirement {
    Standalone,
    Context,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("Function '{0}' not found")]
    NotFound(String),
    #[error("invalid arguments for `{tool}`: {message}")]
    InvalidArguments { tool: String, message: String },
    #[error("`{0}` requires request context")]
    MissingContext(String),
    #[error("`{tool}` timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },
    #[error("`{tool}` failed: {message}")]
    Failed { tool: String, message: String },
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn schema(&self) -> ToolSchema;

    fn requirement(&self) -> ToolRequirement {
        ToolRequirement::Standalone
    }

    /// `context` is `Some` only for tools declaring [`ToolRequirement::Context`].
    async fn execute(&self, args: ToolArgs, context: Option<&ToolContext>)
        -> Result<Value, ToolError>;
}

/// Name → tool lookup; schemas are reported in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Tool>, ToolError> {
        self.tools.get(name).cloned().ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.order.iter().filter_map(|name| self.tools.get(name)).map(|tool| tool.schema()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

pub(crate) fn parse_args<T: DeserializeOwned>(tool: &str, args: ToolArgs) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(args)).map_err(|error| ToolError::InvalidArguments {
        tool: tool.to_string(),
        message: error.to_string(),
    })
}

pub(crate) fn require_context<'a>(
    tool: &str,
    context: Option<&'a ToolContext>,
) -> Result<&'a ToolContext, ToolError> {
    context.ok_or_else(|| ToolError::MissingContext(tool.to_string()))
}

pub(crate) fn to_value<T: serde::Serialize>(tool: &str, value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value)
        .map_err(|error| ToolError::Failed { tool: tool.to_string(), message: error.to_string() })
}

/// Model-supplied numbers arrive as JSON floats; anything fractional, non-finite or
/// negative is rejected.
pub(crate) fn whole_number(tool: &str, field: &str, value: f64) -> Result<u32, ToolError> {
    if !value.is_finite() || value < 0.0 || value > f64::from(u32::MAX) || value.fract() != 0.0 {
        return Err(ToolError::InvalidArguments {
            tool: tool.to_string(),
            message: format!("`{field}` must be a non-negative whole number"),
        });
    }
    Ok(value as u32)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::{whole_number, Tool, ToolArgs, ToolContext, ToolError, ToolRegistry};
    use crate::llm::ToolSchema;

    struct Named(&'static str);

    #[async_trait]
    impl Tool for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: self.0.to_string(),
                description: String::new(),
                parameters: json!({ "type": "object", "properties": {} }),
            }
        }

        async fn execute(
            &self,
            _args: ToolArgs,
            _context: Option<&ToolContext>,
        ) -> Result<Value, ToolError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn registry_reports_schemas_in_registration_order() {
        let mut registry = ToolRegistry::default();
        registry.register(Named("zeta"));
        registry.register(Named("alpha"));
        registry.register(Named("zeta"));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["zeta", "alpha"]);
        let names: Vec<String> = registry.schemas().into_iter().map(|schema| schema.name).collect();
        assert_eq!(names, vec!["zeta".to_string(), "alpha".to_string()]);
    }

    #[test]
    fn unknown_tool_is_not_found() {
        let registry = ToolRegistry::default();
        let error = registry.get("book_flight").err();
        assert_eq!(error, Some(ToolError::NotFound("book_flight".to_string())));
        assert_eq!(
            ToolError::NotFound("book_flight".to_string()).to_string(),
            "Function 'book_flight' not found"
        );
    }

    #[test]
    fn whole_numbers_reject_fractions() {
        assert_eq!(whole_number("set_light_values", "brightness", 40.0), Ok(40));
        for bad in [1.5, -1.0, f64::NAN] {
            assert!(matches!(
                whole_number("set_light_values", "brightness", bad),
                Err(ToolError::InvalidArguments { .. })
            ));
        }
    }
}
