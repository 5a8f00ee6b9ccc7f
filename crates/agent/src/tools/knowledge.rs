use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use concierge_core::knowledge::{KnowledgeError, KnowledgeIndex};

use super::{parse_args, Tool, ToolArgs, ToolContext, ToolError};
use crate::llm::ToolSchema;

#[derive(Debug, Deserialize)]
struct SearchArgs {
    text: String,
}

/// Knowledge-base lookup. Backend failures degrade to `{context: <input>, status: "error"}`
/// so the model can still answer.
pub struct SearchSimilarText {
    index: Arc<dyn KnowledgeIndex>,
    top_k: usize,
}

impl SearchSimilarText {
    pub fn new(index: Arc<dyn KnowledgeIndex>, top_k: usize) -> Self {
        Self { index, top_k: top_k.max(1) }
    }

    async fn lookup(&self, text: &str) -> Result<String, KnowledgeError> {
        let vector = self.index.embed(text).await?;
        let matches = self.index.query(&vector, self.top_k).await?;
        info!(event_name = "tool.knowledge.matches", matches = matches.len(), "knowledge query finished");

        let joined = matches.iter().filter_map(|candidate| candidate.content()).collect::<Vec<_>>().join(" ");
        Ok(joined)
    }
}

#[async_trait]
impl Tool for SearchSimilarText {
    fn name(&self) -> &'static str {
        "search_similar_text"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: "Retrieves specific, up-to-date information from the business knowledge base. \
                Use this tool to answer any user question about the business, including its services, \
                hours, location, appointment policies, staff, and billing."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "text": {
                        "type": "string",
                        "description": "The user's original question or a concise summary of the information they are looking for. Example: 'What do I need to bring for my first appointment?'"
                    }
                },
                "required": ["text"]
            }),
        }
    }

    async fn execute(&self, args: ToolArgs, _context: Option<&ToolContext>) -> Result<Value, ToolError> {
        let args: SearchArgs = parse_args(self.name(), args)?;

        match self.lookup(&args.text).await {
            Ok(context) => Ok(json!({ "context": context, "status": "success" })),
            Err(error) => {
                warn!(event_name = "tool.knowledge.failed", error = %error, "knowledge lookup failed");
                Ok(json!({ "context": args.text, "status": "error" }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{json, Map, Value};

    use concierge_core::knowledge::{KnowledgeError, KnowledgeIndex, KnowledgeMatch};

    use super::SearchSimilarText;
    use crate::tools::Tool;

    struct FixedIndex {
        fail: bool,
    }

    #[async_trait]
    impl KnowledgeIndex for FixedIndex {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, KnowledgeError> {
            if self.fail {
                return Err(KnowledgeError::Embedding("quota exceeded".to_string()));
            }
            Ok(vec![0.1, 0.2, 0.3])
        }

        async fn query(&self, _vector: &[f32], top_k: usize) -> Result<Vec<KnowledgeMatch>, KnowledgeError> {
            let matches = vec![
                KnowledgeMatch {
                    id: Some("a".to_string()),
                    score: Some(0.9),
                    metadata: Map::from_iter([("content".to_string(), json!("Open 9 to 5."))]),
                },
                KnowledgeMatch { id: Some("b".to_string()), score: Some(0.8), metadata: Map::new() },
                KnowledgeMatch {
                    id: Some("c".to_string()),
                    score: Some(0.7),
                    metadata: Map::from_iter([("content".to_string(), json!("Bring your ID."))]),
                },
            ];
            Ok(matches.into_iter().take(top_k).collect())
        }
    }

    fn args(text: &str) -> Map<String, Value> {
        Map::from_iter([("text".to_string(), json!(text))])
    }

    #[tokio::test]
    async fn joins_match_content() {
        let tool = SearchSimilarText::new(Arc::new(FixedIndex { fail: false }), 3);
        let result = tool.execute(args("hours?"), None).await.expect("search");
        assert_eq!(result, json!({ "context": "Open 9 to 5. Bring your ID.", "status": "success" }));
    }

    #[tokio::test]
    async fn failures_echo_the_input() {
        let tool = SearchSimilarText::new(Arc::new(FixedIndex { fail: true }), 2);
        let result = tool.execute(args("hours?"), None).await.expect("search");
        assert_eq!(result, json!({ "context": "hours?", "status": "error" }));
    }
}
