use std::sync::Arc;

use adaptix_api::models::{
    Difficulty, EmotionSample, GeneratedQuestion, SubmitSessionRequest, SubmittedAnswer,
};
use adaptix_api::services::agent_service::AgentService;
use adaptix_api::services::attempt_service::AttemptService;
use adaptix_api::services::quota::QuotaGovernor;

mod common;
use common::{analysis_json, questions_json, sample_test, InMemoryStore, ScriptedClient};

fn service(store: Arc<InMemoryStore>, client: ScriptedClient, limit: u32) -> AttemptService {
    let quota = Arc::new(QuotaGovernor::new(limit));
    let agent = Arc::new(AgentService::new(Arc::new(client), store.clone(), quota));
    AttemptService::new(store, agent, 5)
}

fn answers(
    questions: &[GeneratedQuestion],
    correct: &[bool],
    stress: f64,
) -> Vec<SubmittedAnswer> {
    questions
        .iter()
        .zip(correct)
        .map(|(q, &is_correct)| SubmittedAnswer {
            question_id: q.id.clone(),
            question_text: q.question.clone(),
            selected_answer: if is_correct {
                q.correct_answer.clone()
            } else {
                "wrong".to_string()
            },
            correct_answer: q.correct_answer.clone(),
            is_correct,
            stress,
            time_taken_secs: 20.0,
            difficulty: Some(q.difficulty),
            stress_level: None,
            dominant_emotion: None,
        })
        .collect()
}

#[tokio::test]
async fn starting_an_attempt_serves_the_first_batch_at_easy() {
    let store = Arc::new(InMemoryStore::new().with_test(sample_test("t1", "algebra", 4, 2)));
    let client = ScriptedClient::new().final_text(questions_json(2, "easy", "algebra"));
    let service = service(store.clone(), client, 100);

    let response = service.start_attempt("t1", "learner-1").await.unwrap();

    assert_eq!(response.session_number, 1);
    assert_eq!(response.total_sessions, 2);
    assert_eq!(response.questions.len(), 2);
    assert_eq!(response.total_questions, 4);
    assert!(!response.used_fallback);

    let attempt = store.attempt(&response.attempt_id).unwrap();
    assert_eq!(attempt.current_difficulty, Difficulty::Easy);
    assert_eq!(attempt.current_session, 0);
    assert_eq!(attempt.current_session_questions.len(), 2);
    assert!(attempt.results.is_empty());
}

#[tokio::test]
async fn starting_an_unknown_test_fails() {
    let store = Arc::new(InMemoryStore::new());
    let service = service(store, ScriptedClient::new(), 100);

    let err = service.start_attempt("missing", "learner-1").await.unwrap_err();
    assert!(format!("{err:#}").contains("Test not found"));
}

#[tokio::test]
async fn attempt_progresses_through_sessions_to_completion() {
    let store = Arc::new(InMemoryStore::new().with_test(sample_test("t1", "algebra", 4, 2)));
    let client = ScriptedClient::new()
        // start: first batch
        .final_text(questions_json(2, "easy", "algebra"))
        // submit 1: analysis, then the next batch
        .final_text(analysis_json("medium", "Step up the difficulty"))
        .final_text(questions_json(2, "medium", "algebra"))
        // submit 2: analysis only, the attempt completes
        .final_text(analysis_json("hard", "Great run"));
    let service = service(store.clone(), client, 100);

    let started = service.start_attempt("t1", "learner-1").await.unwrap();
    let attempt_id = started.attempt_id.clone();

    // First session: both correct, calm.
    let response = service
        .submit_session(
            &attempt_id,
            SubmitSessionRequest {
                answers: answers(&started.questions, &[true, true], 0.1),
                emotion_samples: Vec::new(),
            },
        )
        .await
        .unwrap();

    assert!(!response.done);
    let analysis = &response.session_analysis;
    assert_eq!(analysis.session_number, 1);
    assert_eq!(analysis.accuracy, 1.0);
    assert_eq!(analysis.next_difficulty, Difficulty::Medium);
    assert_eq!(analysis.recommendation, "Step up the difficulty");
    assert!(!analysis.used_fallback);

    let next = response.next_session.unwrap();
    assert_eq!(next.session_number, 2);
    assert_eq!(next.questions.len(), 2);
    let progress = response.progress.unwrap();
    assert_eq!(progress.questions_answered, 2);
    assert_eq!(progress.percent_complete, 50);

    let attempt = store.attempt(&attempt_id).unwrap();
    assert_eq!(attempt.current_difficulty, Difficulty::Medium);
    assert_eq!(attempt.index, 2);
    assert_eq!(attempt.session_analytics.len(), 1);

    // Second session: finishes the test.
    let response = service
        .submit_session(
            &attempt_id,
            SubmitSessionRequest {
                answers: answers(&next.questions, &[true, false], 0.2),
                emotion_samples: Vec::new(),
            },
        )
        .await
        .unwrap();

    assert!(response.done);
    let completion = response.completion.unwrap();
    assert_eq!(completion.total_questions, 4);
    assert_eq!(completion.total_correct, 3);

    let attempt = store.attempt(&attempt_id).unwrap();
    assert!(attempt.completed);
    assert!(attempt.completed_at.is_some());
    assert_eq!(attempt.index, 4);
    // index equals the sum of answers across completed sessions
    assert_eq!(
        attempt.index,
        attempt
            .session_analytics
            .iter()
            .map(|s| s.questions_answered)
            .sum::<u32>()
    );
}

#[tokio::test]
async fn completed_attempts_reject_further_submissions_without_mutation() {
    let store = Arc::new(InMemoryStore::new().with_test(sample_test("t1", "algebra", 2, 2)));
    let client = ScriptedClient::new()
        .final_text(questions_json(2, "easy", "algebra"))
        .final_text(analysis_json("medium", "Done"));
    let service = service(store.clone(), client, 100);

    let started = service.start_attempt("t1", "learner-1").await.unwrap();
    let attempt_id = started.attempt_id.clone();

    let response = service
        .submit_session(
            &attempt_id,
            SubmitSessionRequest {
                answers: answers(&started.questions, &[true, true], 0.1),
                emotion_samples: Vec::new(),
            },
        )
        .await
        .unwrap();
    assert!(response.done);

    let before = store.attempt(&attempt_id).unwrap();

    let err = service
        .submit_session(
            &attempt_id,
            SubmitSessionRequest {
                answers: answers(&started.questions, &[true, true], 0.1),
                emotion_samples: Vec::new(),
            },
        )
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("already completed"));
    let after = store.attempt(&attempt_id).unwrap();
    assert_eq!(after.results.len(), before.results.len());
    assert_eq!(after.session_analytics.len(), before.session_analytics.len());
}

#[tokio::test]
async fn failed_analysis_falls_back_to_the_fixed_rule() {
    let store = Arc::new(InMemoryStore::new().with_test(sample_test("t1", "algebra", 4, 2)));
    let client = ScriptedClient::new()
        .final_text(questions_json(2, "easy", "algebra"))
        // analysis run returns garbage -> parse failure -> fixed rule
        .final_text("I could not produce structured output, sorry.")
        .final_text(questions_json(2, "medium", "algebra"));
    let service = service(store.clone(), client, 100);

    let started = service.start_attempt("t1", "learner-1").await.unwrap();

    let response = service
        .submit_session(
            &started.attempt_id,
            SubmitSessionRequest {
                answers: answers(&started.questions, &[true, true], 0.1),
                emotion_samples: Vec::new(),
            },
        )
        .await
        .unwrap();

    // Perfect accuracy under low stress escalates per the fixed rule, and the
    // analysis is tagged as non-model-backed.
    let analysis = &response.session_analysis;
    assert!(analysis.used_fallback);
    assert_eq!(analysis.next_difficulty, Difficulty::Medium);
    assert!(!analysis.recommendation.is_empty());
}

#[tokio::test]
async fn mismatched_answer_counts_commit_nothing() {
    let store = Arc::new(InMemoryStore::new().with_test(sample_test("t1", "algebra", 4, 2)));
    let client = ScriptedClient::new().final_text(questions_json(2, "easy", "algebra"));
    let service = service(store.clone(), client, 100);

    let started = service.start_attempt("t1", "learner-1").await.unwrap();

    let err = service
        .submit_session(
            &started.attempt_id,
            SubmitSessionRequest {
                answers: answers(&started.questions[..1], &[true], 0.1),
                emotion_samples: Vec::new(),
            },
        )
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("for a batch of"));
    let attempt = store.attempt(&started.attempt_id).unwrap();
    assert_eq!(attempt.index, 0);
    assert!(attempt.results.is_empty());
}

#[tokio::test]
async fn exhausted_quota_serves_template_content_end_to_end() {
    let store =
        Arc::new(InMemoryStore::new().with_test(sample_test("t1", "quadratic equations", 10, 5)));
    // Daily limit zero: every run degrades to the fallback generator.
    let service = service(store.clone(), ScriptedClient::new(), 0);

    let started = service.start_attempt("t1", "learner-1").await.unwrap();

    assert!(started.used_fallback);
    assert_eq!(started.questions.len(), 5);
    assert!(started
        .questions
        .iter()
        .any(|q| q.question.to_lowercase().contains("quadratic")
            || q.topic.to_lowercase().contains("quadratic")));

    let response = service
        .submit_session(
            &started.attempt_id,
            SubmitSessionRequest {
                answers: answers(&started.questions, &[true, true, false, true, true], 0.2),
                emotion_samples: Vec::new(),
            },
        )
        .await
        .unwrap();

    assert!(response.session_analysis.used_fallback);
    let next = response.next_session.unwrap();
    assert!(next.used_fallback);
    assert_eq!(next.questions.len(), 5);
}

#[tokio::test]
async fn emotion_samples_are_aggregated_and_persisted() {
    let store = Arc::new(InMemoryStore::new().with_test(sample_test("t1", "algebra", 4, 2)));
    let client = ScriptedClient::new()
        .final_text(questions_json(2, "easy", "algebra"))
        .final_text(analysis_json("easy", "Stay the course"))
        .final_text(questions_json(2, "easy", "algebra"));
    let service = service(store.clone(), client, 100);

    let started = service.start_attempt("t1", "learner-1").await.unwrap();

    let response = service
        .submit_session(
            &started.attempt_id,
            SubmitSessionRequest {
                // Self-reports on the 0-10 scale get normalized to 0-1.
                answers: answers(&started.questions, &[true, false], 9.0),
                emotion_samples: vec![
                    EmotionSample {
                        stress_level: 0.8,
                        dominant_emotion: "fear".to_string(),
                        question_number: Some(1),
                    },
                    EmotionSample {
                        stress_level: 0.6,
                        dominant_emotion: "neutral".to_string(),
                        question_number: Some(2),
                    },
                ],
            },
        )
        .await
        .unwrap();

    let analysis = &response.session_analysis;
    assert!((analysis.avg_emotion_stress - 0.7).abs() < 1e-9);
    assert_eq!(analysis.avg_stress, 0.9);
    assert_eq!(analysis.dominant_emotions, vec!["fear", "neutral"]);
    assert_eq!(store.emotion_count(), 2);

    let attempt = store.attempt(&started.attempt_id).unwrap();
    assert!(attempt.results.iter().all(|r| r.stress == 0.9));
}
