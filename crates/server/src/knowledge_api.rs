//! Knowledge index over HTTP: Gemini `embedContent` for vectors and a vector-query
//! endpoint for nearest matches.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use concierge_core::config::{KnowledgeConfig, LlmConfig};
use concierge_core::knowledge::{KnowledgeError, KnowledgeIndex, KnowledgeMatch};

pub struct GeminiVectorIndex {
    http: reqwest::Client,
    embed_url: String,
    api_key: SecretString,
    query_url: String,
    query_token: SecretString,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    #[serde(default)]
    values: Vec<f32>,
}

/// Accepts both a bare `{matches}` body and one wrapped in `{result: {matches}}`.
#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Option<Vec<KnowledgeMatch>>,
    #[serde(default)]
    result: Option<QueryResult>,
}

#[derive(Debug, Default, Deserialize)]
struct QueryResult {
    #[serde(default)]
    matches: Vec<KnowledgeMatch>,
}

impl QueryResponse {
    fn into_matches(self) -> Vec<KnowledgeMatch> {
        self.matches.or_else(|| self.result.map(|result| result.matches)).unwrap_or_default()
    }
}

impl GeminiVectorIndex {
    /// `None` when knowledge lookups are disabled.
    pub fn from_config(knowledge: &KnowledgeConfig, llm: &LlmConfig) -> Result<Option<Self>, KnowledgeError> {
        if !knowledge.enabled {
            return Ok(None);
        }
        let (Some(query_url), Some(query_token)) = (&knowledge.vector_query_url, &knowledge.api_token) else {
            return Ok(None);
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(knowledge.timeout_secs))
            .build()
            .map_err(|error| KnowledgeError::Query(error.to_string()))?;

        Ok(Some(Self {
            http,
            embed_url: format!(
                "{}/v1beta/models/{}:embedContent",
                llm.base_url.trim_end_matches('/'),
                knowledge.embedding_model
            ),
            api_key: llm.api_key.clone(),
            query_url: query_url.clone(),
            query_token: query_token.clone(),
        }))
    }

    async fn post(
        &self,
        request: reqwest::RequestBuilder,
        body: &Value,
        fail: fn(String) -> KnowledgeError,
    ) -> Result<Value, KnowledgeError> {
        let response = request.json(body).send().await.map_err(|error| {
            if error.is_timeout() {
                KnowledgeError::Timeout
            } else {
                fail(error.to_string())
            }
        })?;
        let status = response.status();
        let text = response.text().await.map_err(|error| fail(error.to_string()))?;
        if !status.is_success() {
            warn!(event_name = "knowledge.api_error", status = status.as_u16(), body = %text, "knowledge request rejected");
            return Err(fail(format!("{status}: {text}")));
        }
        serde_json::from_str(&text).map_err(|error| fail(error.to_string()))
    }
}

#[async_trait]
impl KnowledgeIndex for GeminiVectorIndex {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, KnowledgeError> {
        let body = json!({
            "content": { "parts": [{ "text": text }] },
            "taskType": "SEMANTIC_SIMILARITY"
        });
        let request = self.http.post(&self.embed_url).header("x-goog-api-key", self.api_key.expose_secret());
        let raw = self.post(request, &body, KnowledgeError::Embedding).await?;
        let response: EmbedResponse =
            serde_json::from_value(raw).map_err(|error| KnowledgeError::Embedding(error.to_string()))?;
        if response.embedding.values.is_empty() {
            return Err(KnowledgeError::Embedding("no embedding values returned".to_string()));
        }
        Ok(response.embedding.values)
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<KnowledgeMatch>, KnowledgeError> {
        let body = json!({ "vector": vector, "topK": top_k, "returnMetadata": "all" });
        let request = self.http.post(&self.query_url).bearer_auth(self.query_token.expose_secret());
        let raw = self.post(request, &body, KnowledgeError::Query).await?;
        let response: QueryResponse =
            serde_json::from_value(raw).map_err(|error| KnowledgeError::Query(error.to_string()))?;
        Ok(response.into_matches())
    }
}
