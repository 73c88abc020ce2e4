//! Extraction of structured payloads from free-form model output.
//!
//! The model routinely wraps its JSON in prose or markdown fences, so we
//! locate the first opening bracket of the expected shape, scan to its
//! balanced close (string- and escape-aware), and decode only that slice.
//! Failures are reported as `None`, never as a partial result.

use serde::{Deserialize, Serialize};

use crate::models::{Difficulty, GeneratedQuestion};

/// Analysis object the model is instructed to emit after a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisPayload {
    #[serde(default)]
    pub overall_assessment: String,
    #[serde(default)]
    pub accuracy: f64,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    pub recommendation: String,
    pub next_difficulty: Difficulty,
    #[serde(default)]
    pub emotional_insight: Option<String>,
}

/// Parse a question set out of raw model text. Returns `None` unless the
/// decoded array has exactly `expected_count` elements, each carrying a
/// non-empty question, a non-empty correct answer, and a plausible options
/// list.
pub fn extract_question_set(text: &str, expected_count: usize) -> Option<Vec<GeneratedQuestion>> {
    let slice = balanced_slice(text, '[', ']')?;
    let questions: Vec<GeneratedQuestion> = serde_json::from_str(slice).ok()?;

    if questions.len() != expected_count {
        tracing::warn!(
            expected = expected_count,
            got = questions.len(),
            "Model returned wrong question count"
        );
        return None;
    }

    let all_valid = questions.iter().all(|q| {
        !q.question.trim().is_empty()
            && !q.correct_answer.trim().is_empty()
            && !q.explanation.trim().is_empty()
            && q.options.len() >= 2
            && q.options.iter().all(|o| !o.trim().is_empty())
    });

    all_valid.then_some(questions)
}

/// Parse a session-analysis object out of raw model text.
pub fn extract_analysis(text: &str) -> Option<AnalysisPayload> {
    let slice = balanced_slice(text, '{', '}')?;
    serde_json::from_str(slice).ok()
}

/// Find the first `open` character outside a string literal and return the
/// slice up to and including its matching `close`. Tracks nesting depth and
/// skips over string contents so brackets inside question text do not break
/// the match. Returns `None` for unbalanced or truncated input.
fn balanced_slice(text: &str, open: char, close: char) -> Option<&str> {
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        if c == '"' {
            if start.is_some() {
                in_string = true;
            }
        } else if c == open {
            if depth == 0 {
                start = Some(i);
            }
            depth += 1;
        } else if c == close {
            if depth == 0 {
                continue;
            }
            depth -= 1;
            if depth == 0 {
                let s = start?;
                return Some(&text[s..i + c.len_utf8()]);
            }
        }
    }

    None
}
