use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum KnowledgeError {
    #[error("embedding request failed: {0}")]
    Embedding(String),
    #[error("vector query failed: {0}")]
    Query(String),
    #[error("knowledge lookup timed out")]
    Timeout,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeMatch {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl KnowledgeMatch {
    pub fn content(&self) -> Option<&str> {
        self.metadata.get("content").and_then(Value::as_str)
    }
}

/// Embedding model plus vector index used for free-text lookups.
#[async_trait]
pub trait KnowledgeIndex: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, KnowledgeError>;

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<KnowledgeMatch>, KnowledgeError>;
}
