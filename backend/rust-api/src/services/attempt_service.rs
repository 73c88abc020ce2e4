//! Attempt lifecycle: batching, progression, completion.
//!
//! Transitions: NotStarted -> InSession(k) -> AwaitingSubmission(k) ->
//! InSession(k+1) -> ... -> Completed. All attempt mutations happen in memory
//! first and are persisted in one write after the next batch (or the
//! completion marker) is ready, so a failed run never commits partial state.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::metrics::{ANSWERS_RECORDED_TOTAL, ATTEMPTS_STARTED_TOTAL, SESSIONS_SUBMITTED_TOTAL};
use crate::models::{
    AnsweredQuestion, AssessmentTest, Attempt, AttemptInsightsResponse, AttemptProgress,
    CompletionSummary, Difficulty, NextSession, SessionAnalysis, StartAttemptResponse,
    SubmitSessionRequest, SubmitSessionResponse,
};
use crate::services::adaptive;
use crate::services::agent_service::{AgentService, GenerationRequest, SessionSnapshot};
use crate::services::fallback;
use crate::services::learner_store::LearnerStore;

pub struct AttemptService {
    store: Arc<dyn LearnerStore>,
    agent: Arc<AgentService>,
    default_questions_per_session: u32,
}

impl AttemptService {
    pub fn new(
        store: Arc<dyn LearnerStore>,
        agent: Arc<AgentService>,
        default_questions_per_session: u32,
    ) -> Self {
        Self {
            store,
            agent,
            default_questions_per_session,
        }
    }

    pub async fn start_attempt(
        &self,
        test_id: &str,
        learner_id: &str,
    ) -> Result<StartAttemptResponse> {
        let test = self
            .store
            .find_test(test_id)
            .await?
            .with_context(|| format!("Test not found: {test_id}"))?;

        let questions_per_session = self.questions_per_session(&test);
        let batch_size = questions_per_session.min(test.total_questions).max(1);
        let attempt_id = format!("attempt_{}", Uuid::new_v4());

        tracing::info!(
            learner_id,
            test_id,
            batch_size,
            "Starting attempt, generating first batch"
        );

        let outcome = self
            .agent
            .generate_questions(&GenerationRequest {
                topic: test.topic.clone(),
                count: batch_size as usize,
                learner_id: learner_id.to_string(),
                attempt_id: Some(attempt_id.clone()),
                difficulty: Difficulty::Easy,
                session_number: 1,
            })
            .await
            .context("Failed to generate the first question batch")?;

        let attempt = Attempt {
            attempt_id: attempt_id.clone(),
            test_id: test_id.to_string(),
            learner_id: learner_id.to_string(),
            results: Vec::new(),
            current_difficulty: Difficulty::Easy,
            index: 0,
            current_session: 0,
            current_session_questions: outcome.payload.clone(),
            session_analytics: Vec::new(),
            completed: false,
            started_at: Utc::now(),
            completed_at: None,
        };

        self.store.insert_attempt(&attempt).await?;
        ATTEMPTS_STARTED_TOTAL.inc();

        let used_fallback = outcome.used_fallback();
        Ok(StartAttemptResponse {
            attempt_id,
            session_number: 1,
            total_sessions: test.total_questions.div_ceil(questions_per_session),
            questions_in_session: outcome.payload.len() as u32,
            questions: outcome.payload,
            total_questions: test.total_questions,
            used_fallback,
        })
    }

    pub async fn submit_session(
        &self,
        attempt_id: &str,
        request: SubmitSessionRequest,
    ) -> Result<SubmitSessionResponse> {
        let mut attempt = self
            .store
            .find_attempt(attempt_id)
            .await?
            .with_context(|| format!("Attempt not found: {attempt_id}"))?;

        // Completion is irreversible; a completed attempt rejects submissions
        // without touching its results.
        if attempt.completed {
            bail!("Attempt already completed: {attempt_id}");
        }
        if request.answers.is_empty() {
            bail!("No answers submitted");
        }

        let expected = attempt.current_session_questions.len();
        if expected > 0 && request.answers.len() != expected {
            bail!(
                "Submitted {} answers for a batch of {expected}",
                request.answers.len()
            );
        }

        let test = self
            .store
            .find_test(&attempt.test_id)
            .await?
            .with_context(|| format!("Test not found: {}", attempt.test_id))?;

        // Append the batch to the attempt's history (in memory until the
        // whole transition is ready to persist).
        for answer in &request.answers {
            let correct_label = if answer.is_correct { "true" } else { "false" };
            ANSWERS_RECORDED_TOTAL.with_label_values(&[correct_label]).inc();

            attempt.results.push(AnsweredQuestion {
                question_id: answer.question_id.clone(),
                question_text: answer.question_text.clone(),
                selected_answer: answer.selected_answer.clone(),
                correct_answer: answer.correct_answer.clone(),
                is_correct: answer.is_correct,
                stress: adaptive::normalize_stress(answer.stress),
                time_taken_secs: answer.time_taken_secs,
                difficulty: answer.difficulty.unwrap_or(attempt.current_difficulty),
                stress_level: answer.stress_level,
                dominant_emotion: answer.dominant_emotion.clone(),
            });
        }
        let answered = request.answers.len();
        attempt.index += answered as u32;

        // Session aggregates, all on the 0-1 stress scale.
        let batch = &attempt.results[attempt.results.len() - answered..];
        let correct_count = batch.iter().filter(|a| a.is_correct).count() as u32;
        let accuracy = correct_count as f64 / answered as f64;
        let avg_stress = batch.iter().map(|a| a.stress).sum::<f64>() / answered as f64;
        let avg_time_secs = batch.iter().map(|a| a.time_taken_secs).sum::<f64>() / answered as f64;

        let avg_emotion_stress = if request.emotion_samples.is_empty() {
            0.0
        } else {
            request
                .emotion_samples
                .iter()
                .map(|s| adaptive::normalize_stress(s.stress_level))
                .sum::<f64>()
                / request.emotion_samples.len() as f64
        };
        let dominant_emotions: Vec<String> = request
            .emotion_samples
            .iter()
            .map(|s| s.dominant_emotion.clone())
            .collect();

        // Escalation needs every stress signal low; relief triggers on the
        // worst one. The max of both averages captures that.
        let effective_stress = avg_stress.max(avg_emotion_stress);

        let snapshot = SessionSnapshot {
            topic: test.topic.clone(),
            learner_id: attempt.learner_id.clone(),
            attempt_id: attempt.attempt_id.clone(),
            session_number: attempt.current_session + 1,
            current_difficulty: attempt.current_difficulty,
            outcomes: batch.iter().map(|a| (a.is_correct, a.difficulty)).collect(),
            accuracy,
            avg_stress: effective_stress,
            avg_time_secs,
            dominant_emotion: dominant_emotions.first().cloned(),
        };

        let (recommendation, next_difficulty, used_fallback) =
            match self.agent.analyze_session(&snapshot).await {
                Ok(outcome) => {
                    let used_fallback = outcome.used_fallback();
                    let payload = outcome.payload;
                    (payload.recommendation, payload.next_difficulty, used_fallback)
                }
                Err(e) => {
                    // Model analysis failed outright; decide with the fixed
                    // rule instead of surfacing the failure.
                    tracing::warn!(error = %e, "Session analysis failed, applying fixed rule");
                    let (feedback, next) = fallback::generate_analysis(
                        accuracy,
                        effective_stress,
                        avg_time_secs,
                        attempt.current_difficulty,
                    );
                    (feedback, next, true)
                }
            };

        let session_analysis = SessionAnalysis {
            session_number: attempt.current_session + 1,
            questions_answered: answered as u32,
            correct_answers: correct_count,
            accuracy,
            avg_stress,
            avg_emotion_stress,
            avg_time_secs,
            dominant_emotions,
            recommendation,
            next_difficulty,
            used_fallback,
        };

        tracing::info!(
            attempt_id,
            session = session_analysis.session_number,
            accuracy = %format!("{:.0}%", accuracy * 100.0),
            next_difficulty = %next_difficulty,
            used_fallback,
            "Session analyzed"
        );

        attempt.session_analytics.push(session_analysis.clone());
        attempt.current_difficulty = next_difficulty;
        attempt.current_session += 1;

        if attempt.index >= test.total_questions {
            attempt.completed = true;
            attempt.completed_at = Some(Utc::now());
            attempt.current_session_questions = Vec::new();

            self.store.update_attempt(&attempt).await?;
            self.record_emotions(&attempt, &request).await;
            SESSIONS_SUBMITTED_TOTAL.with_label_values(&["completed"]).inc();

            let total_correct = attempt.results.iter().filter(|r| r.is_correct).count() as u32;
            let total_questions = attempt.results.len() as u32;
            tracing::info!(attempt_id, total_correct, total_questions, "Attempt completed");

            return Ok(SubmitSessionResponse {
                done: true,
                session_analysis,
                next_session: None,
                progress: None,
                completion: Some(CompletionSummary {
                    total_correct,
                    total_questions,
                    final_accuracy: total_correct as f64 / total_questions.max(1) as f64,
                }),
            });
        }

        let questions_per_session = self.questions_per_session(&test);
        let remaining = attempt.questions_remaining(test.total_questions);
        let next_batch_size = questions_per_session.min(remaining);

        let outcome = match self
            .agent
            .generate_questions(&GenerationRequest {
                topic: test.topic.clone(),
                count: next_batch_size as usize,
                learner_id: attempt.learner_id.clone(),
                attempt_id: Some(attempt.attempt_id.clone()),
                difficulty: attempt.current_difficulty,
                session_number: attempt.current_session + 1,
            })
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                // Nothing has been persisted yet, so the submission can be
                // retried cleanly.
                SESSIONS_SUBMITTED_TOTAL.with_label_values(&["failed"]).inc();
                return Err(e).context("Failed to generate the next session questions");
            }
        };

        attempt.current_session_questions = outcome.payload.clone();
        self.store.update_attempt(&attempt).await?;
        self.record_emotions(&attempt, &request).await;
        SESSIONS_SUBMITTED_TOTAL.with_label_values(&["advanced"]).inc();

        let next_used_fallback = outcome.used_fallback();
        Ok(SubmitSessionResponse {
            done: false,
            session_analysis,
            next_session: Some(NextSession {
                session_number: attempt.current_session + 1,
                questions_in_session: outcome.payload.len() as u32,
                questions: outcome.payload,
                used_fallback: next_used_fallback,
            }),
            progress: Some(AttemptProgress {
                questions_answered: attempt.index,
                total_questions: test.total_questions,
                percent_complete: (attempt.index * 100 / test.total_questions.max(1)),
            }),
            completion: None,
        })
    }

    pub async fn insights(&self, attempt_id: &str) -> Result<AttemptInsightsResponse> {
        let attempt = self
            .store
            .find_attempt(attempt_id)
            .await?
            .with_context(|| format!("Attempt not found: {attempt_id}"))?;

        let total = attempt.results.len() as u32;
        let correct = attempt.results.iter().filter(|r| r.is_correct).count() as u32;
        let avg_stress = if total > 0 {
            attempt.results.iter().map(|r| r.stress).sum::<f64>() / total as f64
        } else {
            0.0
        };

        Ok(AttemptInsightsResponse {
            accuracy: if total > 0 {
                correct as f64 / total as f64
            } else {
                0.0
            },
            avg_stress,
            results: attempt.results,
            total_questions: total,
            correct_answers: correct,
            completed: attempt.completed,
        })
    }

    fn questions_per_session(&self, test: &AssessmentTest) -> u32 {
        test.questions_per_session
            .filter(|n| *n > 0)
            .unwrap_or(self.default_questions_per_session)
            .max(1)
    }

    /// Emotion records are auxiliary analytics; a failed write is logged but
    /// never fails the submission that has already been committed.
    async fn record_emotions(&self, attempt: &Attempt, request: &SubmitSessionRequest) {
        if request.emotion_samples.is_empty() {
            return;
        }
        if let Err(e) = self
            .store
            .insert_emotion_samples(
                &attempt.learner_id,
                &attempt.attempt_id,
                &request.emotion_samples,
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to record emotion samples");
        }
    }
}
