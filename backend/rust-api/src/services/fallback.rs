//! Deterministic question and analysis generation for the degraded path.
//!
//! Used whenever the remote reasoning service is unreachable, over quota, or
//! rate limited. Templates are matched on topic keywords and cycled so every
//! request gets exactly the count it asked for.

use uuid::Uuid;

use crate::models::{Difficulty, GeneratedQuestion};
use crate::services::adaptive;

/// Produce exactly `count` template questions for a topic. Keyword matching
/// mirrors the curriculum areas the remote model covers most often; unknown
/// topics get the generic bank.
pub fn generate_questions(topic: &str, count: usize, difficulty: Difficulty) -> Vec<GeneratedQuestion> {
    let topic_lower = topic.to_lowercase();

    let bank = if topic_lower.contains("polynomial") || topic_lower.contains("algebra") {
        polynomial_bank(difficulty)
    } else if topic_lower.contains("quadratic") || topic_lower.contains("equation") {
        quadratic_bank(difficulty)
    } else if topic_lower.contains("calculus") || topic_lower.contains("derivative") {
        calculus_bank(difficulty)
    } else if topic_lower.contains("geometry") || topic_lower.contains("triangle") {
        geometry_bank(difficulty)
    } else {
        generic_bank(topic, difficulty)
    };

    // The bank may be smaller than the requested batch; cycle it so the
    // caller always receives the exact count it asked for.
    bank.into_iter()
        .cycle()
        .take(count)
        .map(|mut q| {
            q.id = format!("fb_{}", Uuid::new_v4());
            q
        })
        .collect()
}

/// Deterministic session feedback computed from the same accuracy/stress/time
/// thresholds as the fixed session rule. No remote call involved.
pub fn generate_analysis(
    accuracy: f64,
    avg_stress: f64,
    avg_time_secs: f64,
    current: Difficulty,
) -> (String, Difficulty) {
    let mut feedback = String::new();

    if accuracy >= 0.8 {
        feedback.push_str("Excellent performance! ");
    } else if accuracy >= 0.6 {
        feedback.push_str("Good work! ");
    } else if accuracy >= 0.4 {
        feedback.push_str("Fair performance. ");
    } else {
        feedback.push_str("Needs improvement. ");
    }

    if avg_stress > adaptive::SESSION_HIGH_STRESS {
        feedback.push_str("High stress detected - take breaks and practice relaxation. ");
    } else if avg_stress > adaptive::SESSION_LOW_STRESS {
        feedback.push_str("Moderate stress - stay calm and focused. ");
    } else {
        feedback.push_str("Good stress management. ");
    }

    if avg_time_secs < 10.0 {
        feedback.push_str("Fast responses - ensure accuracy over speed. ");
    } else if avg_time_secs > 40.0 {
        feedback.push_str("Take your time but try to improve efficiency. ");
    }

    let next = adaptive::session_rule(current, accuracy, avg_stress);
    if next > current {
        feedback.push_str("Ready for harder challenges!");
    } else if next < current {
        feedback.push_str("Reviewing fundamentals with easier questions.");
    } else {
        feedback.push_str("Continue practicing at the current difficulty level.");
    }

    (feedback, next)
}

fn question(
    text: &str,
    options: [&str; 4],
    correct: &str,
    explanation: &str,
    difficulty: Difficulty,
    topic: &str,
) -> GeneratedQuestion {
    GeneratedQuestion {
        id: String::new(),
        question: text.to_string(),
        options: options.iter().map(|s| s.to_string()).collect(),
        correct_answer: correct.to_string(),
        explanation: explanation.to_string(),
        difficulty,
        topic: topic.to_string(),
    }
}

fn polynomial_bank(difficulty: Difficulty) -> Vec<GeneratedQuestion> {
    match difficulty {
        Difficulty::Easy => vec![
            question(
                "What is the degree of the polynomial 3x\u{b2} + 5x - 7?",
                ["0", "1", "2", "3"],
                "2",
                "The degree of a polynomial is the highest power of the variable; here that is 2.",
                difficulty,
                "polynomials",
            ),
            question(
                "What is the constant term in 2x\u{b3} - 4x\u{b2} + 7x - 9?",
                ["2", "-4", "7", "-9"],
                "-9",
                "The constant term is the term without any variable, which is -9.",
                difficulty,
                "polynomials",
            ),
            question(
                "How many terms are in the polynomial 5x\u{b3} + 2x\u{b2} - 3x + 1?",
                ["2", "3", "4", "5"],
                "4",
                "The polynomial has four terms: 5x\u{b3}, 2x\u{b2}, -3x, and 1.",
                difficulty,
                "polynomials",
            ),
        ],
        Difficulty::Medium => vec![
            question(
                "What is (2x + 3)(x - 4)?",
                ["2x\u{b2} - 5x - 12", "2x\u{b2} + 5x - 12", "2x\u{b2} - 11x - 12", "2x\u{b2} - 5x + 12"],
                "2x\u{b2} - 5x - 12",
                "Expanding: 2x\u{b2} - 8x + 3x - 12 = 2x\u{b2} - 5x - 12.",
                difficulty,
                "polynomials",
            ),
            question(
                "Factor: x\u{b2} + 7x + 12",
                ["(x + 3)(x + 4)", "(x + 2)(x + 6)", "(x + 1)(x + 12)", "(x - 3)(x - 4)"],
                "(x + 3)(x + 4)",
                "We need two numbers that multiply to 12 and add to 7; those are 3 and 4.",
                difficulty,
                "polynomials",
            ),
            question(
                "What is the remainder when x\u{b3} - 2x\u{b2} + x - 3 is divided by (x - 1)?",
                ["-3", "-1", "0", "3"],
                "-3",
                "By the remainder theorem, substitute x = 1: 1 - 2 + 1 - 3 = -3.",
                difficulty,
                "polynomials",
            ),
        ],
        Difficulty::Hard => vec![
            question(
                "If (x - 2) is a factor of x\u{b3} - 6x\u{b2} + 11x - 6, what are the other factors?",
                ["(x - 1)(x - 3)", "(x + 1)(x + 3)", "(x - 1)(x + 3)", "(x + 1)(x - 3)"],
                "(x - 1)(x - 3)",
                "Dividing by (x - 2) leaves x\u{b2} - 4x + 3 = (x - 1)(x - 3).",
                difficulty,
                "polynomials",
            ),
            question(
                "For which k does x\u{b2} - kx + 9 have a repeated root?",
                ["3", "6", "9", "12"],
                "6",
                "A repeated root needs discriminant zero: k\u{b2} - 36 = 0, so k = 6 (taking the positive value).",
                difficulty,
                "polynomials",
            ),
        ],
    }
}

fn quadratic_bank(difficulty: Difficulty) -> Vec<GeneratedQuestion> {
    vec![
        question(
            "Solve: x\u{b2} - 5x + 6 = 0",
            ["x = 2 or x = 3", "x = 1 or x = 6", "x = -2 or x = -3", "x = 2 or x = -3"],
            "x = 2 or x = 3",
            "Factor to (x - 2)(x - 3) = 0, so x = 2 or x = 3.",
            difficulty,
            "quadratic equations",
        ),
        question(
            "What is the discriminant of x\u{b2} - 4x + 4 = 0?",
            ["0", "4", "8", "16"],
            "0",
            "Discriminant = b\u{b2} - 4ac = 16 - 16 = 0.",
            difficulty,
            "quadratic equations",
        ),
        question(
            "The vertex of y = x\u{b2} - 6x + 5 lies at which x-coordinate?",
            ["2", "3", "5", "6"],
            "3",
            "The vertex sits at x = -b / 2a = 6 / 2 = 3.",
            difficulty,
            "quadratic equations",
        ),
    ]
}

fn calculus_bank(difficulty: Difficulty) -> Vec<GeneratedQuestion> {
    vec![
        question(
            "What is the derivative of f(x) = 3x\u{b2}?",
            ["3x", "6x", "x\u{b2}", "3"],
            "6x",
            "Power rule: d/dx(3x\u{b2}) = 3 \u{b7} 2x = 6x.",
            difficulty,
            "calculus",
        ),
        question(
            "What is the derivative of a constant?",
            ["0", "1", "x", "undefined"],
            "0",
            "The derivative of any constant is always 0.",
            difficulty,
            "calculus",
        ),
        question(
            "What is d/dx of sin(x)?",
            ["cos(x)", "-cos(x)", "sin(x)", "-sin(x)"],
            "cos(x)",
            "The derivative of sin(x) is cos(x).",
            difficulty,
            "calculus",
        ),
    ]
}

fn geometry_bank(difficulty: Difficulty) -> Vec<GeneratedQuestion> {
    vec![
        question(
            "What is the sum of interior angles in a triangle?",
            ["90\u{b0}", "180\u{b0}", "270\u{b0}", "360\u{b0}"],
            "180\u{b0}",
            "The interior angles of any triangle always sum to 180\u{b0}.",
            difficulty,
            "geometry",
        ),
        question(
            "What is the area of a circle with radius 5?",
            ["25\u{3c0}", "10\u{3c0}", "5\u{3c0}", "50\u{3c0}"],
            "25\u{3c0}",
            "Area = \u{3c0}r\u{b2} = \u{3c0} \u{b7} 25 = 25\u{3c0}.",
            difficulty,
            "geometry",
        ),
        question(
            "A right triangle has legs 3 and 4. How long is the hypotenuse?",
            ["5", "6", "7", "12"],
            "5",
            "By the Pythagorean theorem: \u{221a}(9 + 16) = 5.",
            difficulty,
            "geometry",
        ),
    ]
}

fn generic_bank(topic: &str, difficulty: Difficulty) -> Vec<GeneratedQuestion> {
    vec![
        question(
            &format!("What is the fundamental concept in {topic}?"),
            ["Option A", "Option B", "Option C", "Option D"],
            "Option A",
            &format!("This is a basic question about {topic}. Consult your course material for details."),
            difficulty,
            topic,
        ),
        question(
            &format!("Which statement is true about {topic}?"),
            ["Statement 1", "Statement 2", "Statement 3", "Statement 4"],
            "Statement 1",
            &format!("Review the key principles of {topic} for better understanding."),
            difficulty,
            topic,
        ),
    ]
}
