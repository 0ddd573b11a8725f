use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PrepError, Result};
use crate::quota::ExamType;

pub const DEFAULT_TOPIC: &str = "algebra";
const MAX_TOPIC_LEN: usize = 64;

/// Answer letters, in choice order
pub const LETTERS: [char; 4] = ['A', 'B', 'C', 'D'];

/// Score assumed for a topic with no recorded answers
pub const DEFAULT_SCORE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// Adaptive difficulty from a 0-100 topic score
    pub fn from_score(score: f64) -> Self {
        if score < 40.0 {
            Difficulty::Easy
        } else if score <= 70.0 {
            Difficulty::Medium
        } else {
            Difficulty::Hard
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    /// Unknown values fall back to medium
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Difficulty::Easy,
            "hard" => Difficulty::Hard,
            _ => Difficulty::Medium,
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A generated multiple-choice question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub exam_type: String,
    pub topic: String,
    pub difficulty: Difficulty,
    pub question_text: String,
    /// Four choices without letter prefixes
    pub choices: Vec<String>,
    /// Letter of the correct choice
    pub correct_answer: String,
    pub explanation: String,
    pub source: String,
}

impl Question {
    /// Text of the choice labelled `letter`
    pub fn choice(&self, letter: char) -> Option<&str> {
        let index = LETTERS.iter().position(|&l| l == letter)?;
        self.choices.get(index).map(String::as_str)
    }

    /// Resolve a submitted answer to a letter
    ///
    /// Accepts a letter in any case (optionally followed by `.` or `)`), or
    /// the exact text of one of the choices.
    pub fn resolve_answer(&self, answer: &str) -> Option<char> {
        let trimmed = answer.trim();
        let upper = trimmed.to_ascii_uppercase();
        let letter_part = upper.trim_end_matches(['.', ')']);

        if letter_part.len() == 1 {
            if let Some(c) = letter_part.chars().next() {
                if LETTERS.contains(&c) {
                    return Some(c);
                }
            }
        }

        self.choices
            .iter()
            .position(|choice| choice.trim().eq_ignore_ascii_case(trimmed))
            .and_then(|index| LETTERS.get(index).copied())
    }
}

/// Parameters handed to a generator
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub exam_type: ExamType,
    pub topic: String,
    pub difficulty: Difficulty,
    /// Current 0-100 score of the user on this topic
    pub user_score: f64,
    pub count: u32,
}

/// Normalize a client-supplied topic; missing values default to algebra
pub fn parse_topic(raw: Option<&str>) -> Result<String> {
    let topic = raw.map(str::trim).filter(|s| !s.is_empty()).unwrap_or(DEFAULT_TOPIC);

    if topic.chars().count() > MAX_TOPIC_LEN || topic.chars().any(char::is_control) {
        return Err(PrepError::Validation(format!("Invalid topic: {}", topic)));
    }
    Ok(topic.to_string())
}

/// Per-topic running average of answer scores
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicPerformance {
    pub exam_type: String,
    pub topic: String,
    pub score: f64,
    pub attempts: i64,
}

/// One graded answer, as kept in the answer history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerRecord {
    pub question_id: String,
    pub exam_type: String,
    pub topic: String,
    pub user_answer: String,
    pub correct_answer: String,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}
