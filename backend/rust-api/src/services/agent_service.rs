//! Bounded tool-calling exchange with the remote reasoning service.
//!
//! Each run alternates between the model requesting tool invocations and the
//! dispatcher feeding results back, until the model produces final text or
//! the iteration budget runs out. Quota exhaustion and provider rate limits
//! never surface as errors: those runs degrade to the deterministic fallback
//! generator and are reported as successes tagged with their source.

use std::sync::Arc;
use uuid::Uuid;

use crate::metrics::{ANALYSIS_RUNS_TOTAL, GENERATION_RUNS_TOTAL};
use crate::models::{Difficulty, GeneratedQuestion};
use crate::services::fallback;
use crate::services::learner_store::LearnerStore;
use crate::services::parser::{self, AnalysisPayload};
use crate::services::quota::{is_rate_limit_message, QuotaGovernor};
use crate::services::reasoning::{ChatTurn, ModelReply, ReasoningClient};
use crate::services::tools::{self, ToolCallRecord, ToolDispatcher};

/// Iteration budget for question-set generation runs.
pub const GENERATION_MAX_ITERATIONS: u32 = 15;
/// Iteration budget for session-analysis runs.
pub const ANALYSIS_MAX_ITERATIONS: u32 = 10;

const SYSTEM_INSTRUCTION: &str = "You are an intelligent adaptive learning agent with access to \
    learner data. You query the declared tools to understand a learner before producing your \
    final answer, and you always return the final answer in exactly the JSON shape you were \
    asked for.";

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("model output could not be parsed into the expected shape")]
    Parse,
    #[error("agent exceeded {iterations} iterations without a final answer")]
    MaxIterations {
        iterations: u32,
        /// Tool-call transcript accumulated before the budget ran out, kept
        /// for diagnostics.
        transcript: Vec<ToolCallRecord>,
    },
    #[error("remote reasoning service failed: {0}")]
    Remote(String),
}

/// Which generator produced a run's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunSource {
    Model,
    Fallback,
}

impl RunSource {
    fn as_label(self) -> &'static str {
        match self {
            RunSource::Model => "model",
            RunSource::Fallback => "fallback",
        }
    }
}

/// Successful run result. Callers branch on `source` rather than on caught
/// errors; fallback-backed payloads are interchangeable with model-backed
/// ones once validated.
#[derive(Debug)]
pub struct RunOutcome<T> {
    pub payload: T,
    pub source: RunSource,
    pub iterations: u32,
    pub tool_calls: Vec<ToolCallRecord>,
}

impl<T> RunOutcome<T> {
    pub fn used_fallback(&self) -> bool {
        self.source == RunSource::Fallback
    }

    fn from_fallback(payload: T) -> Self {
        Self {
            payload,
            source: RunSource::Fallback,
            iterations: 0,
            tool_calls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub topic: String,
    pub count: usize,
    pub learner_id: String,
    pub attempt_id: Option<String>,
    pub difficulty: Difficulty,
    pub session_number: u32,
}

/// Everything the analysis prompt needs about the just-submitted batch.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub topic: String,
    pub learner_id: String,
    pub attempt_id: String,
    pub session_number: u32,
    pub current_difficulty: Difficulty,
    /// (is_correct, difficulty) per question, in answer order.
    pub outcomes: Vec<(bool, Difficulty)>,
    /// Accuracy on the 0-1 scale.
    pub accuracy: f64,
    pub avg_stress: f64,
    pub avg_time_secs: f64,
    pub dominant_emotion: Option<String>,
}

struct LoopResult {
    final_text: String,
    iterations: u32,
    tool_calls: Vec<ToolCallRecord>,
}

pub struct AgentService {
    client: Arc<dyn ReasoningClient>,
    dispatcher: ToolDispatcher,
    quota: Arc<QuotaGovernor>,
}

impl AgentService {
    pub fn new(
        client: Arc<dyn ReasoningClient>,
        store: Arc<dyn LearnerStore>,
        quota: Arc<QuotaGovernor>,
    ) -> Self {
        Self {
            client,
            dispatcher: ToolDispatcher::new(store),
            quota,
        }
    }

    /// Generate a personalized question batch. Quota/rate-limit degradation
    /// comes back as a fallback-tagged success; parse and iteration failures
    /// are real errors for the caller to handle.
    pub async fn generate_questions(
        &self,
        request: &GenerationRequest,
    ) -> Result<RunOutcome<Vec<GeneratedQuestion>>, AgentError> {
        if !self.quota.try_acquire() {
            return Ok(self.fallback_questions(request));
        }

        tracing::info!(
            topic = %request.topic,
            count = request.count,
            learner_id = %request.learner_id,
            "Starting question generation run"
        );

        let prompt = build_generation_prompt(request);
        match self.run_loop(prompt, GENERATION_MAX_ITERATIONS).await {
            Ok(result) => {
                let Some(questions) =
                    parser::extract_question_set(&result.final_text, request.count)
                else {
                    tracing::warn!("Question generation run produced unparseable output");
                    return Err(AgentError::Parse);
                };

                GENERATION_RUNS_TOTAL
                    .with_label_values(&[RunSource::Model.as_label()])
                    .inc();
                tracing::info!(
                    iterations = result.iterations,
                    "Generated {} personalized questions",
                    questions.len()
                );

                Ok(RunOutcome {
                    payload: assign_ids(questions),
                    source: RunSource::Model,
                    iterations: result.iterations,
                    tool_calls: result.tool_calls,
                })
            }
            Err(AgentError::Remote(message)) if is_rate_limit_message(&message) => {
                tracing::warn!("Remote service rate limited, using fallback generator");
                Ok(self.fallback_questions(request))
            }
            Err(e) => Err(e),
        }
    }

    /// Analyze a submitted session batch and recommend the next difficulty.
    pub async fn analyze_session(
        &self,
        snapshot: &SessionSnapshot,
    ) -> Result<RunOutcome<AnalysisPayload>, AgentError> {
        if !self.quota.try_acquire() {
            return Ok(Self::fallback_analysis(snapshot));
        }

        tracing::info!(
            learner_id = %snapshot.learner_id,
            session = snapshot.session_number,
            "Starting session analysis run"
        );

        let prompt = build_analysis_prompt(snapshot);
        match self.run_loop(prompt, ANALYSIS_MAX_ITERATIONS).await {
            Ok(result) => {
                let Some(analysis) = parser::extract_analysis(&result.final_text) else {
                    tracing::warn!("Session analysis run produced unparseable output");
                    return Err(AgentError::Parse);
                };

                ANALYSIS_RUNS_TOTAL
                    .with_label_values(&[RunSource::Model.as_label()])
                    .inc();

                Ok(RunOutcome {
                    payload: analysis,
                    source: RunSource::Model,
                    iterations: result.iterations,
                    tool_calls: result.tool_calls,
                })
            }
            Err(AgentError::Remote(message)) if is_rate_limit_message(&message) => {
                tracing::warn!("Remote service rate limited, using deterministic analysis");
                Ok(Self::fallback_analysis(snapshot))
            }
            Err(e) => Err(e),
        }
    }

    /// Iterate `Prompted -> (ToolsRequested -> ToolsExecuted)* -> Final`.
    /// Sibling tool calls of one turn run concurrently; their results are fed
    /// back together before the next turn begins.
    async fn run_loop(&self, initial_prompt: String, budget: u32) -> Result<LoopResult, AgentError> {
        let catalogue = tools::catalogue();
        let mut turns = vec![ChatTurn::User(initial_prompt)];
        let mut tool_calls = Vec::new();
        let mut iterations = 0;

        while iterations < budget {
            iterations += 1;

            let reply = self
                .client
                .converse(SYSTEM_INSTRUCTION, &turns, &catalogue)
                .await
                .map_err(|e| AgentError::Remote(e.to_string()))?;

            match reply {
                ModelReply::ToolCalls(invocations) => {
                    tracing::debug!(
                        iteration = iterations,
                        count = invocations.len(),
                        "Agent requested tool calls"
                    );

                    let (records, replies) = self.dispatcher.dispatch_all(&invocations).await;
                    tool_calls.extend(records);

                    turns.push(ChatTurn::ModelToolCalls(invocations));
                    turns.push(ChatTurn::ToolReplies(replies));
                }
                ModelReply::Final(final_text) => {
                    tracing::debug!(iteration = iterations, "Agent produced final answer");
                    return Ok(LoopResult {
                        final_text,
                        iterations,
                        tool_calls,
                    });
                }
            }
        }

        tracing::warn!(budget, "Agent exceeded iteration budget without a final answer");
        Err(AgentError::MaxIterations {
            iterations: budget,
            transcript: tool_calls,
        })
    }

    fn fallback_questions(
        &self,
        request: &GenerationRequest,
    ) -> RunOutcome<Vec<GeneratedQuestion>> {
        GENERATION_RUNS_TOTAL
            .with_label_values(&[RunSource::Fallback.as_label()])
            .inc();
        let questions =
            fallback::generate_questions(&request.topic, request.count, request.difficulty);
        RunOutcome::from_fallback(questions)
    }

    fn fallback_analysis(snapshot: &SessionSnapshot) -> RunOutcome<AnalysisPayload> {
        ANALYSIS_RUNS_TOTAL
            .with_label_values(&[RunSource::Fallback.as_label()])
            .inc();
        let (feedback, next_difficulty) = fallback::generate_analysis(
            snapshot.accuracy,
            snapshot.avg_stress,
            snapshot.avg_time_secs,
            snapshot.current_difficulty,
        );
        RunOutcome::from_fallback(AnalysisPayload {
            overall_assessment: feedback.clone(),
            accuracy: snapshot.accuracy * 100.0,
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            recommendation: feedback,
            next_difficulty,
            emotional_insight: None,
        })
    }
}

fn assign_ids(questions: Vec<GeneratedQuestion>) -> Vec<GeneratedQuestion> {
    questions
        .into_iter()
        .map(|mut q| {
            if q.id.is_empty() {
                q.id = format!("q_{}", Uuid::new_v4());
            }
            q
        })
        .collect()
}

fn build_generation_prompt(request: &GenerationRequest) -> String {
    let attempt_line = request
        .attempt_id
        .as_deref()
        .map(|id| format!("Attempt ID: {id}\n"))
        .unwrap_or_default();

    format!(
        r#"TASK: Generate exactly {count} personalized questions about "{topic}"

WORKFLOW:
1. First, call query_learner_performance to understand the learner's skill level and history
2. Then, call query_emotion_patterns to check their stress levels and emotional state
3. Then, call query_recent_attempts to see what they have been working on recently
4. Based on ALL this data, generate {count} questions that:
   - Center on the {difficulty} difficulty level, with slight variation where the data supports it
   - Consider their emotional state (reduce difficulty if stressed)
   - Build on their recent work without exact repetition
   - Each have 4 answer options and a clear explanation

Learner ID: {learner_id}
{attempt_line}Session: {session}

Generate the questions in this JSON format:
[
  {{
    "question": "Clear question text?",
    "options": ["Option A", "Option B", "Option C", "Option D"],
    "correctAnswer": "Option A",
    "explanation": "Why this is correct",
    "difficulty": "easy|medium|hard",
    "topic": "{topic}"
  }}
]

IMPORTANT: Return ALL {count} questions in ONE response as a JSON array.
Start by calling the query tools to gather learner insights!"#,
        count = request.count,
        topic = request.topic,
        difficulty = request.difficulty,
        learner_id = request.learner_id,
        attempt_line = attempt_line,
        session = request.session_number,
    )
}

fn build_analysis_prompt(snapshot: &SessionSnapshot) -> String {
    let correct_count = snapshot.outcomes.iter().filter(|(ok, _)| *ok).count();
    let performance_line: Vec<String> = snapshot
        .outcomes
        .iter()
        .enumerate()
        .map(|(i, (ok, difficulty))| {
            format!("Q{}: {} ({})", i + 1, if *ok { "correct" } else { "wrong" }, difficulty)
        })
        .collect();
    let emotion_line = snapshot
        .dominant_emotion
        .as_deref()
        .map(|emotion| {
            format!(
                "- Avg stress: {:.2}, dominant emotion: {emotion}\n",
                snapshot.avg_stress
            )
        })
        .unwrap_or_default();

    format!(
        r#"TASK: Analyze this learner's test session and recommend what comes next

SESSION DATA:
- Topic: {topic}
- Session number: {session}
- Questions: {total}
- Correct: {correct} ({accuracy:.1}%)
- Performance: {performance}
{emotion_line}
WORKFLOW:
1. Call query_learner_performance to see the overall performance trend
2. Call query_emotion_patterns for this attempt to understand the emotional journey
3. Based on the current session plus historical data, provide your assessment

Learner ID: {learner_id}
Attempt ID: {attempt_id}

Return the analysis in this JSON format:
{{
  "overallAssessment": "Brief assessment",
  "accuracy": {accuracy:.1},
  "strengths": ["strength 1"],
  "weaknesses": ["weakness 1"],
  "recommendation": "Specific recommendation for the next session",
  "nextDifficulty": "easy|medium|hard",
  "emotionalInsight": "Comment on emotional state"
}}

Start by querying the learner data!"#,
        topic = snapshot.topic,
        session = snapshot.session_number,
        total = snapshot.outcomes.len(),
        correct = correct_count,
        accuracy = snapshot.accuracy * 100.0,
        performance = performance_line.join(", "),
        emotion_line = emotion_line,
        learner_id = snapshot.learner_id,
        attempt_id = snapshot.attempt_id,
    )
}
