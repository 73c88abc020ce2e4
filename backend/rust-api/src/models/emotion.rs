use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One aggregated emotion reading submitted alongside a session batch.
/// `stress_level` is on the canonical 0-1 scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionSample {
    pub stress_level: f64,
    pub dominant_emotion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_number: Option<u32>,
}

/// Persisted emotion reading, queryable by the emotion-pattern tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionRecord {
    pub learner_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_id: Option<String>,
    pub stress_level: f64,
    pub dominant_emotion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_number: Option<u32>,
    pub timestamp: DateTime<Utc>,
}
