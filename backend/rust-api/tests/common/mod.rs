#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use adaptix_api::config::Config;
use adaptix_api::models::{AssessmentTest, Attempt, EmotionRecord, EmotionSample};
use adaptix_api::services::learner_store::{
    digest_attempt, summarize_emotions, summarize_performance, AttemptDigest, EmotionPattern,
    LearnerStore, PerformanceSummary,
};
use adaptix_api::services::reasoning::{
    ChatTurn, ModelReply, ReasoningClient, ReasoningError, ToolDeclaration, ToolInvocation,
};

pub fn test_config() -> Config {
    Config {
        mongo_uri: "mongodb://localhost:27017/test".to_string(),
        mongo_database: "test".to_string(),
        ai_api_url: "http://localhost:9".to_string(),
        ai_api_key: "test-key".to_string(),
        ai_model: "test-model".to_string(),
        ai_daily_call_limit: 100,
        questions_per_session: 5,
    }
}

pub fn sample_test(test_id: &str, topic: &str, total: u32, per_session: u32) -> AssessmentTest {
    AssessmentTest {
        test_id: test_id.to_string(),
        name: format!("Test on {topic}"),
        topic: topic.to_string(),
        total_questions: total,
        questions_per_session: Some(per_session),
        created_at: Utc::now(),
    }
}

/// JSON array of `count` valid questions, as the model would emit it.
pub fn questions_json(count: usize, difficulty: &str, topic: &str) -> String {
    let items: Vec<serde_json::Value> = (0..count)
        .map(|i| {
            json!({
                "question": format!("Generated question {} about {topic}?", i + 1),
                "options": ["Option A", "Option B", "Option C", "Option D"],
                "correctAnswer": "Option A",
                "explanation": "Because it follows from the definition.",
                "difficulty": difficulty,
                "topic": topic
            })
        })
        .collect();
    serde_json::Value::Array(items).to_string()
}

pub fn analysis_json(next_difficulty: &str, recommendation: &str) -> String {
    json!({
        "overallAssessment": "Assessment of the session",
        "accuracy": 80.0,
        "strengths": ["algebra"],
        "weaknesses": [],
        "recommendation": recommendation,
        "nextDifficulty": next_difficulty,
        "emotionalInsight": "Calm throughout"
    })
    .to_string()
}

pub fn tool_call(name: &str) -> ToolInvocation {
    ToolInvocation {
        id: format!("call_0_{name}"),
        name: name.to_string(),
        args: json!({ "learnerId": "learner-1" }),
    }
}

enum Scripted {
    Reply(ModelReply),
    Error(ReasoningError),
}

/// Reasoning client fake that plays back a fixed script. When the script
/// runs out it either repeats a standing reply or reports an empty response.
pub struct ScriptedClient {
    script: Mutex<VecDeque<Scripted>>,
    repeat: Option<ModelReply>,
    pub calls: AtomicU32,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            repeat: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn reply(self, reply: ModelReply) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Reply(reply));
        self
    }

    pub fn final_text(self, text: impl Into<String>) -> Self {
        self.reply(ModelReply::Final(text.into()))
    }

    pub fn tool_calls(self, invocations: Vec<ToolInvocation>) -> Self {
        self.reply(ModelReply::ToolCalls(invocations))
    }

    pub fn error(self, error: ReasoningError) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Error(error));
        self
    }

    /// Keep answering with the same reply once the script is exhausted. Used
    /// to drive the loop into its iteration budget.
    pub fn then_always(mut self, reply: ModelReply) -> Self {
        self.repeat = Some(reply);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningClient for ScriptedClient {
    async fn converse(
        &self,
        _system: &str,
        _turns: &[ChatTurn],
        _tools: &[ToolDeclaration],
    ) -> Result<ModelReply, ReasoningError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return match next {
                Scripted::Reply(reply) => Ok(reply),
                Scripted::Error(error) => Err(error),
            };
        }
        if let Some(reply) = &self.repeat {
            return Ok(reply.clone());
        }
        Err(ReasoningError::EmptyResponse)
    }
}

/// In-memory persistence fake backed by hash maps.
#[derive(Default)]
pub struct InMemoryStore {
    tests: Mutex<HashMap<String, AssessmentTest>>,
    attempts: Mutex<HashMap<String, Attempt>>,
    emotions: Mutex<Vec<EmotionRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_test(self, test: AssessmentTest) -> Self {
        self.tests
            .lock()
            .unwrap()
            .insert(test.test_id.clone(), test);
        self
    }

    pub fn seed_attempt(&self, attempt: Attempt) {
        self.attempts
            .lock()
            .unwrap()
            .insert(attempt.attempt_id.clone(), attempt);
    }

    pub fn attempt(&self, attempt_id: &str) -> Option<Attempt> {
        self.attempts.lock().unwrap().get(attempt_id).cloned()
    }

    pub fn emotion_count(&self) -> usize {
        self.emotions.lock().unwrap().len()
    }

    fn sorted_attempts(&self, learner_id: &str) -> Vec<Attempt> {
        let mut attempts: Vec<Attempt> = self
            .attempts
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.learner_id == learner_id)
            .cloned()
            .collect();
        attempts.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        attempts
    }
}

#[async_trait]
impl LearnerStore for InMemoryStore {
    async fn performance_summary(&self, learner_id: &str) -> anyhow::Result<PerformanceSummary> {
        Ok(summarize_performance(
            learner_id,
            &self.sorted_attempts(learner_id),
        ))
    }

    async fn emotion_pattern(
        &self,
        learner_id: &str,
        attempt_id: Option<&str>,
    ) -> anyhow::Result<EmotionPattern> {
        let records: Vec<EmotionRecord> = self
            .emotions
            .lock()
            .unwrap()
            .iter()
            .filter(|r| {
                r.learner_id == learner_id
                    && attempt_id.map_or(true, |id| r.attempt_id.as_deref() == Some(id))
            })
            .cloned()
            .collect();
        Ok(summarize_emotions(learner_id, attempt_id, &records))
    }

    async fn recent_attempts(
        &self,
        learner_id: &str,
        limit: i64,
    ) -> anyhow::Result<Vec<AttemptDigest>> {
        Ok(self
            .sorted_attempts(learner_id)
            .iter()
            .take(limit as usize)
            .map(digest_attempt)
            .collect())
    }

    async fn find_test(&self, test_id: &str) -> anyhow::Result<Option<AssessmentTest>> {
        Ok(self.tests.lock().unwrap().get(test_id).cloned())
    }

    async fn insert_attempt(&self, attempt: &Attempt) -> anyhow::Result<()> {
        self.attempts
            .lock()
            .unwrap()
            .insert(attempt.attempt_id.clone(), attempt.clone());
        Ok(())
    }

    async fn find_attempt(&self, attempt_id: &str) -> anyhow::Result<Option<Attempt>> {
        Ok(self.attempts.lock().unwrap().get(attempt_id).cloned())
    }

    async fn update_attempt(&self, attempt: &Attempt) -> anyhow::Result<()> {
        self.attempts
            .lock()
            .unwrap()
            .insert(attempt.attempt_id.clone(), attempt.clone());
        Ok(())
    }

    async fn insert_emotion_samples(
        &self,
        learner_id: &str,
        attempt_id: &str,
        samples: &[EmotionSample],
    ) -> anyhow::Result<()> {
        let mut emotions = self.emotions.lock().unwrap();
        for sample in samples {
            emotions.push(EmotionRecord {
                learner_id: learner_id.to_string(),
                attempt_id: Some(attempt_id.to_string()),
                stress_level: sample.stress_level,
                dominant_emotion: sample.dominant_emotion.clone(),
                question_number: sample.question_number,
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
