//! Tool catalogue the reasoning loop may query before answering.
//!
//! Requested invocations are parsed into a closed set of typed variants;
//! anything unrecognized becomes an error payload fed back to the model so
//! the loop keeps running. Sibling invocations within one turn are dispatched
//! concurrently and re-associated by invocation id.

use futures::future::join_all;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

use crate::metrics::TOOL_CALLS_TOTAL;
use crate::services::learner_store::LearnerStore;
use crate::services::reasoning::{ToolDeclaration, ToolInvocation, ToolReply};

pub const QUERY_LEARNER_PERFORMANCE: &str = "query_learner_performance";
pub const QUERY_EMOTION_PATTERNS: &str = "query_emotion_patterns";
pub const QUERY_RECENT_ATTEMPTS: &str = "query_recent_attempts";

const DEFAULT_RECENT_ATTEMPTS: i64 = 5;

/// Typed form of a requested tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    Performance {
        learner_id: String,
    },
    Emotion {
        learner_id: String,
        attempt_id: Option<String>,
    },
    RecentAttempts {
        learner_id: String,
        limit: i64,
    },
}

impl ToolCall {
    /// Map a (name, args) pair from the model onto a known variant.
    pub fn parse(name: &str, args: &Value) -> Result<ToolCall, String> {
        let learner_id = || {
            args.get("learnerId")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| format!("{name}: missing required argument learnerId"))
        };

        match name {
            QUERY_LEARNER_PERFORMANCE => Ok(ToolCall::Performance {
                learner_id: learner_id()?,
            }),
            QUERY_EMOTION_PATTERNS => Ok(ToolCall::Emotion {
                learner_id: learner_id()?,
                attempt_id: args
                    .get("attemptId")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            }),
            QUERY_RECENT_ATTEMPTS => Ok(ToolCall::RecentAttempts {
                learner_id: learner_id()?,
                limit: args
                    .get("limit")
                    .and_then(Value::as_i64)
                    .filter(|l| *l > 0)
                    .unwrap_or(DEFAULT_RECENT_ATTEMPTS),
            }),
            other => Err(format!("Unknown tool: {other}")),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ToolCall::Performance { .. } => QUERY_LEARNER_PERFORMANCE,
            ToolCall::Emotion { .. } => QUERY_EMOTION_PATTERNS,
            ToolCall::RecentAttempts { .. } => QUERY_RECENT_ATTEMPTS,
        }
    }
}

/// Declarations advertised to the reasoning service.
pub fn catalogue() -> Vec<ToolDeclaration> {
    vec![
        ToolDeclaration {
            name: QUERY_LEARNER_PERFORMANCE,
            description: "Query comprehensive learner performance data including overall accuracy, \
                recent test scores, most frequent difficulty level, and number of tests taken.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "learnerId": {
                        "type": "string",
                        "description": "Identifier of the learner"
                    }
                },
                "required": ["learnerId"]
            }),
        },
        ToolDeclaration {
            name: QUERY_EMOTION_PATTERNS,
            description: "Query learner emotion patterns during tests including average stress \
                levels, dominant emotions, and emotional stability. Essential for adapting \
                question difficulty based on emotional state.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "learnerId": {
                        "type": "string",
                        "description": "Identifier of the learner"
                    },
                    "attemptId": {
                        "type": "string",
                        "description": "Optional: restrict the analysis to one attempt"
                    }
                },
                "required": ["learnerId"]
            }),
        },
        ToolDeclaration {
            name: QUERY_RECENT_ATTEMPTS,
            description: "Query recent test attempts to see performance trends, difficulty \
                progression, and completion state. Helps avoid repetition and build on previous \
                learning.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "learnerId": {
                        "type": "string",
                        "description": "Identifier of the learner"
                    },
                    "limit": {
                        "type": "number",
                        "description": "Number of recent attempts to retrieve (default: 5)"
                    }
                },
                "required": ["learnerId"]
            }),
        },
    ]
}

/// Audit record of one executed tool invocation.
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub name: String,
    pub args: Value,
    pub result: Value,
    pub ok: bool,
    pub duration_ms: u64,
}

pub struct ToolDispatcher {
    store: Arc<dyn LearnerStore>,
}

impl ToolDispatcher {
    pub fn new(store: Arc<dyn LearnerStore>) -> Self {
        Self { store }
    }

    /// Execute every invocation of one turn concurrently. Results come back
    /// in invocation order because replies are re-associated by id; the model
    /// must not rely on sibling execution order and neither do we.
    pub async fn dispatch_all(
        &self,
        invocations: &[ToolInvocation],
    ) -> (Vec<ToolCallRecord>, Vec<ToolReply>) {
        let executed = join_all(invocations.iter().map(|inv| self.dispatch(inv))).await;

        let mut records = Vec::with_capacity(executed.len());
        let mut replies = Vec::with_capacity(executed.len());
        for (record, reply) in executed {
            records.push(record);
            replies.push(reply);
        }
        (records, replies)
    }

    /// Execute one invocation. Never fails the loop: unknown tools and read
    /// errors both come back as error payloads in the reply.
    pub async fn dispatch(&self, invocation: &ToolInvocation) -> (ToolCallRecord, ToolReply) {
        let started = Instant::now();
        tracing::debug!(tool = %invocation.name, "Dispatching tool call");

        let result = match ToolCall::parse(&invocation.name, &invocation.args) {
            Ok(call) => self.execute(&call).await,
            Err(message) => Err(message),
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        let (payload, ok) = match result {
            Ok(value) => (value, true),
            Err(message) => {
                tracing::warn!(tool = %invocation.name, error = %message, "Tool call failed");
                (json!({ "error": message }), false)
            }
        };

        TOOL_CALLS_TOTAL
            .with_label_values(&[invocation.name.as_str(), if ok { "ok" } else { "error" }])
            .inc();

        let record = ToolCallRecord {
            name: invocation.name.clone(),
            args: invocation.args.clone(),
            result: payload.clone(),
            ok,
            duration_ms,
        };
        let reply = ToolReply {
            id: invocation.id.clone(),
            name: invocation.name.clone(),
            payload,
        };
        (record, reply)
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, String> {
        let to_error = |e: anyhow::Error| format!("{}: {e:#}", call.name());

        match call {
            ToolCall::Performance { learner_id } => {
                let summary = self
                    .store
                    .performance_summary(learner_id)
                    .await
                    .map_err(to_error)?;
                serde_json::to_value(summary).map_err(|e| e.to_string())
            }
            ToolCall::Emotion {
                learner_id,
                attempt_id,
            } => {
                let pattern = self
                    .store
                    .emotion_pattern(learner_id, attempt_id.as_deref())
                    .await
                    .map_err(to_error)?;
                serde_json::to_value(pattern).map_err(|e| e.to_string())
            }
            ToolCall::RecentAttempts { learner_id, limit } => {
                let digests = self
                    .store
                    .recent_attempts(learner_id, *limit)
                    .await
                    .map_err(to_error)?;
                Ok(json!({
                    "learnerId": learner_id,
                    "attemptsCount": digests.len(),
                    "attempts": digests,
                }))
            }
        }
    }
}
