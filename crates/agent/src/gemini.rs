//! Gemini `generateContent` client.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use concierge_core::config::LlmConfig;
use concierge_core::domain::conversation::{ToolCall, ToolResult, Turn};

use crate::llm::{LlmClient, ModelRequest, ModelResponse};

const RETRY_BASE_DELAY_MS: u64 = 250;

pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: SecretString,
    max_retries: u32,
}

impl GeminiClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("building Gemini HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    async fn send_once(&self, body: &Value) -> Result<Value, Attempt> {
        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|error| Attempt::Retryable(anyhow!("Gemini request failed: {error}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|error| Attempt::Retryable(anyhow!("reading Gemini response: {error}")))?;

        if status.as_u16() == 429 || status.is_server_error() {
            return Err(Attempt::Retryable(anyhow!("Gemini API {status}: {text}")));
        }
        if !status.is_success() {
            return Err(Attempt::Fatal(anyhow!("Gemini API {status}: {text}")));
        }

        serde_json::from_str(&text)
            .map_err(|error| Attempt::Fatal(anyhow!("invalid Gemini JSON: {error}")))
    }
}

enum Attempt {
    Retryable(anyhow::Error),
    Fatal(anyhow::Error),
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(&self, request: ModelRequest<'_>) -> Result<ModelResponse> {
        let body = request_body(&request);
        let mut attempt = 0;

        loop {
            match self.send_once(&body).await {
                Ok(raw) => return parse_response(raw),
                Err(Attempt::Fatal(error)) => return Err(error),
                Err(Attempt::Retryable(error)) if attempt >= self.max_retries => return Err(error),
                Err(Attempt::Retryable(error)) => {
                    let delay = Duration::from_millis(RETRY_BASE_DELAY_MS << attempt.min(6));
                    warn!(
                        event_name = "llm.retry",
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying Gemini request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Builds the `generateContent` payload from the typed history.
pub fn request_body(request: &ModelRequest<'_>) -> Value {
    let contents: Vec<Value> = request.history.iter().map(turn_content).collect();
    let mut body = json!({
        "systemInstruction": { "parts": [{ "text": request.system_instruction }] },
        "contents": contents,
    });

    if !request.tools.is_empty() {
        body["tools"] = json!([{ "functionDeclarations": request.tools }]);
        body["toolConfig"] = json!({ "functionCallingConfig": { "mode": "AUTO" } });
    }
    body
}

fn turn_content(turn: &Turn) -> Value {
    match turn {
        Turn::User(text) => json!({ "role": "user", "parts": [{ "text": text }] }),
        Turn::Model(text) => json!({ "role": "model", "parts": [{ "text": text }] }),
        Turn::ToolCall(calls) => json!({
            "role": "model",
            "parts": calls
                .iter()
                .map(|call| json!({ "functionCall": { "name": call.name, "args": call.args } }))
                .collect::<Vec<_>>(),
        }),
        Turn::ToolResult(results) => json!({
            "role": "user",
            "parts": results.iter().map(function_response).collect::<Vec<_>>(),
        }),
    }
}

fn function_response(result: &ToolResult) -> Value {
    // functionResponse.response must be a JSON object.
    let response = match (&result.error, &result.result) {
        (Some(error), _) => json!({ "error": error }),
        (None, Value::Object(map)) => Value::Object(map.clone()),
        (None, other) => json!({ "result": other }),
    };
    json!({ "functionResponse": { "name": result.name, "response": response } })
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Map<String, Value>,
}

/// Function calls win over text when a candidate carries both.
pub fn parse_response(raw: Value) -> Result<ModelResponse> {
    let parsed: GenerateContentResponse =
        serde_json::from_value(raw).context("decoding Gemini candidates")?;
    let Some(parts) = parsed.candidates.into_iter().next().and_then(|candidate| candidate.content)
    else {
        debug!(event_name = "llm.empty_candidates", "Gemini returned no candidates");
        return Ok(ModelResponse::Empty);
    };

    let mut calls = Vec::new();
    let mut text = String::new();
    for part in parts.parts {
        if let Some(call) = part.function_call {
            if call.name.is_empty() {
                bail!("Gemini returned a function call without a name");
            }
            calls.push(ToolCall::new(call.name, call.args));
        } else if let Some(fragment) = part.text {
            text.push_str(&fragment);
        }
    }

    let response =
        if calls.is_empty() { ModelResponse::Text(text) } else { ModelResponse::ToolCalls(calls) };
    Ok(response.normalized())
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map};

    use concierge_core::domain::conversation::{ToolCall, ToolResult, Turn};

    use super::{parse_response, request_body};
    use crate::llm::{ModelRequest, ModelResponse, ToolSchema};

    #[test]
    fn history_maps_to_gemini_contents() {
        let call = ToolCall::new(
            "set_light_values",
            Map::from_iter([("brightness".to_string(), json!(40))]),
        );
        let history = vec![
            Turn::User("dim the lights".to_string()),
            Turn::ToolCall(vec![call.clone()]),
            Turn::ToolResult(vec![
                ToolResult::success(&call, json!({ "brightness": 40 })),
                ToolResult::failure(&call, "device offline"),
            ]),
        ];
        let tools = vec![ToolSchema {
            name: "set_light_values".to_string(),
            description: "Sets light".to_string(),
            parameters: json!({ "type": "object", "properties": {} }),
        }];

        let body = request_body(&ModelRequest {
            system_instruction: "be brief",
            history: &history,
            tools: &tools,
        });

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][1]["parts"][0]["functionCall"]["args"]["brightness"], 40);
        assert_eq!(
            body["contents"][2]["parts"][1]["functionResponse"]["response"]["error"],
            "device offline"
        );
        assert_eq!(body["tools"][0]["functionDeclarations"][0]["name"], "set_light_values");
    }

    #[test]
    fn parses_parallel_function_calls() {
        let raw = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "functionCall": { "name": "set_thermostat", "args": { "temperature": 21, "mode": "heat" } } },
                        { "functionCall": { "name": "control_music", "args": { "action": "play" } } }
                    ]
                }
            }]
        });

        let ModelResponse::ToolCalls(calls) = parse_response(raw).expect("parse") else {
            panic!("expected tool calls");
        };
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].name, "control_music");
    }

    #[test]
    fn blank_or_missing_candidates_are_empty() {
        assert_eq!(parse_response(json!({})).expect("parse"), ModelResponse::Empty);
        let blank = json!({ "candidates": [{ "content": { "parts": [{ "text": "  " }] } }] });
        assert_eq!(parse_response(blank).expect("parse"), ModelResponse::Empty);

        let text = json!({ "candidates": [{ "content": { "parts": [{ "text": "Hi " }, { "text": "there" }] } }] });
        assert_eq!(parse_response(text).expect("parse"), ModelResponse::Text("Hi there".to_string()));
    }
}
