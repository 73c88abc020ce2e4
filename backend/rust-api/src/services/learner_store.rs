//! Read/write access to learner history.
//!
//! The orchestration core only needs a handful of reads (the tool queries)
//! and append-style writes for attempts and emotion records, so the store is
//! a trait; production uses MongoDB, tests use an in-memory fake.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::options::FindOptions;
use mongodb::Database;
use serde::Serialize;
use std::collections::HashMap;

use crate::models::{AssessmentTest, Attempt, Difficulty, EmotionRecord, EmotionSample};
use crate::utils::retry::{retry_async_with_config, RetryConfig};

/// Short-term direction of a learner's recent scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
    Unknown,
}

/// Stress-variance bucket over recent emotion records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stability {
    Stable,
    Moderate,
    Volatile,
    Unknown,
}

/// Aggregate performance picture for one learner.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSummary {
    pub learner_id: String,
    /// Overall accuracy in percent across completed attempts.
    pub overall_accuracy: f64,
    pub tests_taken: u32,
    pub total_questions: u32,
    pub most_frequent_difficulty: Difficulty,
    /// Accuracy percent of the last completed attempts, newest first.
    pub recent_scores: Vec<f64>,
    pub trend: Trend,
}

/// Aggregated emotion picture for one learner, optionally scoped to an
/// attempt.
#[derive(Debug, Clone, Serialize)]
pub struct EmotionPattern {
    pub learner_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_id: Option<String>,
    pub records_analyzed: u32,
    pub average_stress: f64,
    pub stability: Stability,
    /// Dominant emotions ranked by frequency, most frequent first.
    pub dominant_emotions: Vec<String>,
    pub distribution: HashMap<String, u32>,
}

/// One attempt condensed for the recent-attempts tool.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptDigest {
    pub attempt_id: String,
    pub test_id: String,
    pub questions_answered: u32,
    pub correct_answers: u32,
    pub accuracy: f64,
    pub current_difficulty: Difficulty,
    pub current_session: u32,
    pub completed: bool,
    pub started_at: DateTime<Utc>,
}

#[async_trait]
pub trait LearnerStore: Send + Sync {
    async fn performance_summary(&self, learner_id: &str) -> Result<PerformanceSummary>;
    async fn emotion_pattern(
        &self,
        learner_id: &str,
        attempt_id: Option<&str>,
    ) -> Result<EmotionPattern>;
    async fn recent_attempts(&self, learner_id: &str, limit: i64) -> Result<Vec<AttemptDigest>>;

    async fn find_test(&self, test_id: &str) -> Result<Option<AssessmentTest>>;
    async fn insert_attempt(&self, attempt: &Attempt) -> Result<()>;
    async fn find_attempt(&self, attempt_id: &str) -> Result<Option<Attempt>>;
    async fn update_attempt(&self, attempt: &Attempt) -> Result<()>;
    async fn insert_emotion_samples(
        &self,
        learner_id: &str,
        attempt_id: &str,
        samples: &[EmotionSample],
    ) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}

/// Build a performance summary from completed attempts, newest first.
/// Shared by the Mongo store and the in-memory test store.
pub fn summarize_performance(learner_id: &str, attempts: &[Attempt]) -> PerformanceSummary {
    let completed: Vec<&Attempt> = attempts.iter().filter(|a| a.completed).collect();

    let mut total_correct = 0u32;
    let mut total_questions = 0u32;
    let mut difficulty_counts: HashMap<Difficulty, u32> = HashMap::new();

    for attempt in &completed {
        total_correct += attempt.results.iter().filter(|r| r.is_correct).count() as u32;
        total_questions += attempt.results.len() as u32;
        *difficulty_counts.entry(attempt.current_difficulty).or_insert(0) += 1;
    }

    let overall_accuracy = if total_questions > 0 {
        total_correct as f64 / total_questions as f64 * 100.0
    } else {
        0.0
    };

    let most_frequent_difficulty = difficulty_counts
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(d, _)| d)
        .unwrap_or(Difficulty::Easy);

    let recent_scores: Vec<f64> = completed
        .iter()
        .take(3)
        .filter(|a| !a.results.is_empty())
        .map(|a| {
            let correct = a.results.iter().filter(|r| r.is_correct).count();
            correct as f64 / a.results.len() as f64 * 100.0
        })
        .collect();

    let trend = if recent_scores.len() >= 2 {
        if recent_scores[0] > recent_scores[1] {
            Trend::Improving
        } else if recent_scores[0] < recent_scores[1] {
            Trend::Declining
        } else {
            Trend::Stable
        }
    } else {
        Trend::Unknown
    };

    PerformanceSummary {
        learner_id: learner_id.to_string(),
        overall_accuracy,
        tests_taken: completed.len() as u32,
        total_questions,
        most_frequent_difficulty,
        recent_scores,
        trend,
    }
}

/// Build an emotion pattern from individual records.
pub fn summarize_emotions(
    learner_id: &str,
    attempt_id: Option<&str>,
    records: &[EmotionRecord],
) -> EmotionPattern {
    if records.is_empty() {
        return EmotionPattern {
            learner_id: learner_id.to_string(),
            attempt_id: attempt_id.map(str::to_string),
            records_analyzed: 0,
            average_stress: 0.0,
            stability: Stability::Unknown,
            dominant_emotions: Vec::new(),
            distribution: HashMap::new(),
        };
    }

    let stress_levels: Vec<f64> = records.iter().map(|r| r.stress_level).collect();
    let average_stress = stress_levels.iter().sum::<f64>() / stress_levels.len() as f64;
    let variance = stress_levels
        .iter()
        .map(|s| (s - average_stress).powi(2))
        .sum::<f64>()
        / stress_levels.len() as f64;

    let stability = if variance < 0.1 {
        Stability::Stable
    } else if variance < 0.2 {
        Stability::Moderate
    } else {
        Stability::Volatile
    };

    let mut distribution: HashMap<String, u32> = HashMap::new();
    for record in records {
        *distribution.entry(record.dominant_emotion.clone()).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, u32)> = distribution
        .iter()
        .map(|(emotion, count)| (emotion.clone(), *count))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let dominant_emotions: Vec<String> =
        ranked.into_iter().take(3).map(|(emotion, _)| emotion).collect();

    EmotionPattern {
        learner_id: learner_id.to_string(),
        attempt_id: attempt_id.map(str::to_string),
        records_analyzed: records.len() as u32,
        average_stress,
        stability,
        dominant_emotions,
        distribution,
    }
}

pub fn digest_attempt(attempt: &Attempt) -> AttemptDigest {
    let correct = attempt.results.iter().filter(|r| r.is_correct).count() as u32;
    let answered = attempt.results.len() as u32;

    AttemptDigest {
        attempt_id: attempt.attempt_id.clone(),
        test_id: attempt.test_id.clone(),
        questions_answered: answered,
        correct_answers: correct,
        accuracy: if answered > 0 {
            correct as f64 / answered as f64 * 100.0
        } else {
            0.0
        },
        current_difficulty: attempt.current_difficulty,
        current_session: attempt.current_session,
        completed: attempt.completed,
        started_at: attempt.started_at,
    }
}

pub struct MongoLearnerStore {
    mongo: Database,
}

impl MongoLearnerStore {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn attempts(&self) -> mongodb::Collection<Attempt> {
        self.mongo.collection("attempts")
    }

    fn tests(&self) -> mongodb::Collection<AssessmentTest> {
        self.mongo.collection("tests")
    }

    fn emotions(&self) -> mongodb::Collection<EmotionRecord> {
        self.mongo.collection("emotion_tracking")
    }

    async fn attempts_for(&self, learner_id: &str, limit: i64) -> Result<Vec<Attempt>> {
        let options = FindOptions::builder()
            .sort(doc! { "started_at": -1 })
            .limit(limit)
            .build();

        let attempts: Vec<Attempt> = self
            .attempts()
            .find(doc! { "learner_id": learner_id })
            .with_options(options)
            .await
            .context("Failed to query attempts")?
            .try_collect()
            .await
            .context("Failed to collect attempts")?;

        Ok(attempts)
    }
}

#[async_trait]
impl LearnerStore for MongoLearnerStore {
    async fn performance_summary(&self, learner_id: &str) -> Result<PerformanceSummary> {
        let attempts = self.attempts_for(learner_id, 10).await?;
        Ok(summarize_performance(learner_id, &attempts))
    }

    async fn emotion_pattern(
        &self,
        learner_id: &str,
        attempt_id: Option<&str>,
    ) -> Result<EmotionPattern> {
        let mut filter = doc! { "learner_id": learner_id };
        if let Some(attempt_id) = attempt_id {
            filter.insert("attempt_id", attempt_id);
        }

        let options = FindOptions::builder()
            .sort(doc! { "timestamp": -1 })
            .limit(100)
            .build();

        let records: Vec<EmotionRecord> = self
            .emotions()
            .find(filter)
            .with_options(options)
            .await
            .context("Failed to query emotion records")?
            .try_collect()
            .await
            .context("Failed to collect emotion records")?;

        Ok(summarize_emotions(learner_id, attempt_id, &records))
    }

    async fn recent_attempts(&self, learner_id: &str, limit: i64) -> Result<Vec<AttemptDigest>> {
        let attempts = self.attempts_for(learner_id, limit).await?;
        Ok(attempts.iter().map(digest_attempt).collect())
    }

    async fn find_test(&self, test_id: &str) -> Result<Option<AssessmentTest>> {
        self.tests()
            .find_one(doc! { "_id": test_id })
            .await
            .context("Failed to query tests collection")
    }

    async fn insert_attempt(&self, attempt: &Attempt) -> Result<()> {
        let collection = self.attempts();
        retry_async_with_config(RetryConfig::default(), || async {
            collection.insert_one(attempt).await.map(|_| ())
        })
        .await
        .context("Failed to insert attempt")?;

        tracing::info!(attempt_id = %attempt.attempt_id, "Attempt saved");
        Ok(())
    }

    async fn find_attempt(&self, attempt_id: &str) -> Result<Option<Attempt>> {
        self.attempts()
            .find_one(doc! { "_id": attempt_id })
            .await
            .context("Failed to query attempts collection")
    }

    async fn update_attempt(&self, attempt: &Attempt) -> Result<()> {
        let collection = self.attempts();
        retry_async_with_config(RetryConfig::aggressive(), || async {
            collection
                .replace_one(doc! { "_id": &attempt.attempt_id }, attempt)
                .await
                .map(|_| ())
        })
        .await
        .context("Failed to update attempt")?;

        Ok(())
    }

    async fn insert_emotion_samples(
        &self,
        learner_id: &str,
        attempt_id: &str,
        samples: &[EmotionSample],
    ) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let records: Vec<EmotionRecord> = samples
            .iter()
            .map(|sample| EmotionRecord {
                learner_id: learner_id.to_string(),
                attempt_id: Some(attempt_id.to_string()),
                stress_level: sample.stress_level,
                dominant_emotion: sample.dominant_emotion.clone(),
                question_number: sample.question_number,
                timestamp: now,
            })
            .collect();

        self.emotions()
            .insert_many(records)
            .await
            .context("Failed to insert emotion records")?;

        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.mongo
            .run_command(doc! { "ping": 1 })
            .await
            .context("MongoDB ping failed")?;
        Ok(())
    }
}
