//! Remote reasoning capability, abstracted behind a trait.
//!
//! One conversational exchange per call: the service receives a system
//! instruction, the prior turns, and the declared tool catalogue, and answers
//! either with tool invocations to execute or with final text. The production
//! implementation talks to the Generative Language API over reqwest with an
//! explicit per-call deadline, so a hung remote call cannot hang the request.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

const REMOTE_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// A tool the model may request during a run.
#[derive(Debug, Clone)]
pub struct ToolDeclaration {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// One tool invocation requested by the model. The `id` is assigned at parse
/// time and is how results are re-associated after concurrent dispatch.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// Result of one executed tool invocation, fed back to the model.
#[derive(Debug, Clone)]
pub struct ToolReply {
    pub id: String,
    pub name: String,
    pub payload: Value,
}

/// What the model did with its turn.
#[derive(Debug, Clone)]
pub enum ModelReply {
    ToolCalls(Vec<ToolInvocation>),
    Final(String),
}

/// One turn of the conversation so far.
#[derive(Debug, Clone)]
pub enum ChatTurn {
    User(String),
    ModelText(String),
    ModelToolCalls(Vec<ToolInvocation>),
    ToolReplies(Vec<ToolReply>),
}

#[derive(Debug, thiserror::Error)]
pub enum ReasoningError {
    #[error("remote service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("empty response from model")]
    EmptyResponse,
}

impl ReasoningError {
    /// Rate-limit signals degrade to the fallback generator instead of
    /// surfacing as failures.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            ReasoningError::Status { status: 429, .. } => true,
            ReasoningError::Status { body, .. } => super::quota::is_rate_limit_message(body),
            ReasoningError::Transport(message) => super::quota::is_rate_limit_message(message),
            ReasoningError::EmptyResponse => false,
        }
    }
}

#[async_trait]
pub trait ReasoningClient: Send + Sync {
    async fn converse(
        &self,
        system: &str,
        turns: &[ChatTurn],
        tools: &[ToolDeclaration],
    ) -> Result<ModelReply, ReasoningError>;
}

/// Generative Language API client (Gemini function calling).
pub struct GeminiClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(REMOTE_CALL_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");

        Self {
            http_client,
            base_url,
            api_key,
            model,
        }
    }

    fn contents(turns: &[ChatTurn]) -> Vec<Value> {
        turns
            .iter()
            .map(|turn| match turn {
                ChatTurn::User(text) => json!({
                    "role": "user",
                    "parts": [{ "text": text }]
                }),
                ChatTurn::ModelText(text) => json!({
                    "role": "model",
                    "parts": [{ "text": text }]
                }),
                ChatTurn::ModelToolCalls(invocations) => {
                    let parts: Vec<Value> = invocations
                        .iter()
                        .map(|inv| {
                            json!({ "functionCall": { "name": inv.name, "args": inv.args } })
                        })
                        .collect();
                    json!({ "role": "model", "parts": parts })
                }
                ChatTurn::ToolReplies(replies) => {
                    let parts: Vec<Value> = replies
                        .iter()
                        .map(|reply| {
                            json!({
                                "functionResponse": {
                                    "name": reply.name,
                                    "response": reply.payload
                                }
                            })
                        })
                        .collect();
                    json!({ "role": "function", "parts": parts })
                }
            })
            .collect()
    }

    fn parse_reply(body: &Value) -> Result<ModelReply, ReasoningError> {
        let parts = body
            .pointer("/candidates/0/content/parts")
            .and_then(Value::as_array)
            .ok_or(ReasoningError::EmptyResponse)?;

        let invocations: Vec<ToolInvocation> = parts
            .iter()
            .filter_map(|part| part.get("functionCall"))
            .enumerate()
            .filter_map(|(i, call)| {
                let name = call.get("name")?.as_str()?.to_string();
                let args = call.get("args").cloned().unwrap_or_else(|| json!({}));
                Some(ToolInvocation {
                    id: format!("call_{}_{}", i, name),
                    name,
                    args,
                })
            })
            .collect();

        if !invocations.is_empty() {
            return Ok(ModelReply::ToolCalls(invocations));
        }

        let text: String = parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(ReasoningError::EmptyResponse);
        }

        Ok(ModelReply::Final(text))
    }
}

#[async_trait]
impl ReasoningClient for GeminiClient {
    async fn converse(
        &self,
        system: &str,
        turns: &[ChatTurn],
        tools: &[ToolDeclaration],
    ) -> Result<ModelReply, ReasoningError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let mut body = json!({
            "systemInstruction": { "parts": [{ "text": system }] },
            "contents": Self::contents(turns),
            "generationConfig": {
                "temperature": 0.7,
                "maxOutputTokens": 4096
            }
        });

        if !tools.is_empty() {
            let declarations: Vec<Value> = tools
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters
                    })
                })
                .collect();
            body["tools"] = json!([{ "functionDeclarations": declarations }]);
        }

        tracing::debug!(model = %self.model, turns = turns.len(), "Calling reasoning service");

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ReasoningError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ReasoningError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ReasoningError::Transport(e.to_string()))?;

        Self::parse_reply(&body)
    }
}
