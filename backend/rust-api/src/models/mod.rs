use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod emotion;

pub use emotion::{EmotionRecord, EmotionSample};

/// Ordinal difficulty level driving question generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    /// One level up, capped at Hard.
    pub fn step_up(self) -> Difficulty {
        match self {
            Difficulty::Easy => Difficulty::Medium,
            Difficulty::Medium | Difficulty::Hard => Difficulty::Hard,
        }
    }

    /// One level down, capped at Easy.
    pub fn step_down(self) -> Difficulty {
        match self {
            Difficulty::Hard => Difficulty::Medium,
            Difficulty::Medium | Difficulty::Easy => Difficulty::Easy,
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A test template. Questions are generated adaptively when learners take it,
/// so the template only carries the topic and sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentTest {
    #[serde(rename = "_id")]
    pub test_id: String,
    pub name: String,
    pub topic: String,
    pub total_questions: u32,
    pub questions_per_session: Option<u32>,
    pub created_at: DateTime<Utc>,
}

/// One generated question, regardless of whether the remote model or the
/// fallback generator produced it. Field names follow the wire format the
/// model is instructed to emit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedQuestion {
    #[serde(default)]
    pub id: String,
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub explanation: String,
    pub difficulty: Difficulty,
    pub topic: String,
}

/// Answered-question record. Immutable once appended to an attempt.
///
/// `stress` is on the canonical 0-1 scale; self-reports on 0-10 are converted
/// at the submission boundary. `stress_level`/`dominant_emotion` carry the
/// external emotion-signal reading taken while answering, when available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnsweredQuestion {
    pub question_id: String,
    pub question_text: String,
    pub selected_answer: String,
    pub correct_answer: String,
    pub is_correct: bool,
    pub stress: f64,
    pub time_taken_secs: f64,
    pub difficulty: Difficulty,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stress_level: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dominant_emotion: Option<String>,
}

/// Summary of one completed session batch, appended to the attempt after
/// every submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionAnalysis {
    pub session_number: u32,
    pub questions_answered: u32,
    pub correct_answers: u32,
    pub accuracy: f64,
    pub avg_stress: f64,
    pub avg_emotion_stress: f64,
    pub avg_time_secs: f64,
    pub dominant_emotions: Vec<String>,
    pub recommendation: String,
    pub next_difficulty: Difficulty,
    pub used_fallback: bool,
}

/// One learner's run through one test, spanning one or more session batches.
/// Owned by the attempt service; mutated only through its transitions and
/// never deleted, only marked completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    #[serde(rename = "_id")]
    pub attempt_id: String,
    pub test_id: String,
    pub learner_id: String,
    pub results: Vec<AnsweredQuestion>,
    pub current_difficulty: Difficulty,
    /// Number of questions answered so far.
    pub index: u32,
    /// 0-based counter of the session batch currently in flight.
    pub current_session: u32,
    /// The unanswered batch currently served to the learner.
    pub current_session_questions: Vec<GeneratedQuestion>,
    pub session_analytics: Vec<SessionAnalysis>,
    pub completed: bool,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Attempt {
    pub fn questions_remaining(&self, total: u32) -> u32 {
        total.saturating_sub(self.index)
    }
}

// ---------------------------------------------------------------------------
// Request / response DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct StartAttemptRequest {
    pub learner_id: String,
}

#[derive(Debug, Serialize)]
pub struct StartAttemptResponse {
    pub attempt_id: String,
    pub session_number: u32,
    pub total_sessions: u32,
    pub questions: Vec<GeneratedQuestion>,
    pub questions_in_session: u32,
    pub total_questions: u32,
    pub used_fallback: bool,
}

/// One answer from the in-flight batch. `stress` is the learner self-report,
/// accepted on either the 0-1 or the 0-10 scale.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmittedAnswer {
    pub question_id: String,
    pub question_text: String,
    pub selected_answer: String,
    pub correct_answer: String,
    pub is_correct: bool,
    #[serde(default)]
    pub stress: f64,
    #[serde(default = "default_time_taken")]
    pub time_taken_secs: f64,
    pub difficulty: Option<Difficulty>,
    pub stress_level: Option<f64>,
    pub dominant_emotion: Option<String>,
}

fn default_time_taken() -> f64 {
    30.0
}

#[derive(Debug, Deserialize)]
pub struct SubmitSessionRequest {
    pub answers: Vec<SubmittedAnswer>,
    #[serde(default)]
    pub emotion_samples: Vec<EmotionSample>,
}

#[derive(Debug, Serialize)]
pub struct NextSession {
    pub session_number: u32,
    pub questions: Vec<GeneratedQuestion>,
    pub questions_in_session: u32,
    pub used_fallback: bool,
}

#[derive(Debug, Serialize)]
pub struct AttemptProgress {
    pub questions_answered: u32,
    pub total_questions: u32,
    pub percent_complete: u32,
}

#[derive(Debug, Serialize)]
pub struct CompletionSummary {
    pub total_correct: u32,
    pub total_questions: u32,
    pub final_accuracy: f64,
}

#[derive(Debug, Serialize)]
pub struct SubmitSessionResponse {
    pub done: bool,
    pub session_analysis: SessionAnalysis,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_session: Option<NextSession>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<AttemptProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion: Option<CompletionSummary>,
}

#[derive(Debug, Serialize)]
pub struct AttemptInsightsResponse {
    pub accuracy: f64,
    pub avg_stress: f64,
    pub results: Vec<AnsweredQuestion>,
    pub total_questions: u32,
    pub correct_answers: u32,
    pub completed: bool,
}
