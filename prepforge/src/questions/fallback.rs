//! Template questions used when no AI provider is available
//!
//! GRE algebra gets real numeric problems whose difficulty follows the
//! request. Other exam/topic pairs get a generic concept question whose
//! answer is always "All concepts" (D).

use async_trait::async_trait;
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use super::generator::QuestionGenerator;
use super::types::{Difficulty, GenerationRequest, Question, LETTERS};
use crate::error::Result;

pub const FALLBACK_SOURCE: &str = "fallback";

#[derive(Debug, Default, Clone)]
pub struct FallbackGenerator;

impl FallbackGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Build `request.count` questions; never fails
    pub fn questions(&self, request: &GenerationRequest) -> Vec<Question> {
        let timestamp = Utc::now().timestamp();
        (0..request.count)
            .map(|index| self.question(request, index, timestamp))
            .collect()
    }

    fn question(&self, request: &GenerationRequest, index: u32, timestamp: i64) -> Question {
        let tag = uuid::Uuid::new_v4().simple().to_string();
        let tag = &tag[..8];
        let id = format!("fallback_{}_{}_{}", tag, timestamp, index);

        let exam = request.exam_type.as_str();
        if exam == "GRE" && request.topic.eq_ignore_ascii_case("algebra") {
            return self.algebra_question(request, id);
        }

        Question {
            id,
            exam_type: exam.to_string(),
            topic: request.topic.clone(),
            difficulty: request.difficulty,
            question_text: format!(
                "{} {} question #{}: Which concept is most important in {}?",
                exam,
                request.topic,
                index + 1,
                request.topic
            ),
            choices: vec![
                format!("Concept {}", &tag[0..2]),
                format!("Concept {}", &tag[2..4]),
                format!("Concept {}", &tag[4..6]),
                "All concepts".to_string(),
            ],
            correct_answer: "D".to_string(),
            explanation: format!(
                "All concepts in {} matter for {} success.",
                request.topic, exam
            ),
            source: FALLBACK_SOURCE.to_string(),
        }
    }

    fn algebra_question(&self, request: &GenerationRequest, id: String) -> Question {
        let mut rng = rand::thread_rng();
        let a: i64 = rng.gen_range(2..=9);
        let b: i64 = rng.gen_range(1..=8);
        let c: i64 = rng.gen_range(1..=12);

        let (question_text, correct, distractors, explanation) = match request.difficulty {
            Difficulty::Easy => (
                format!("Solve for x: {}x + {} = {}", a, b, c * a + b),
                c,
                [c + 1, c - 1, c + 2],
                format!(
                    "Subtract {} from both sides to get {}x = {}, then divide by {}: x = {}.",
                    b,
                    a,
                    c * a,
                    a,
                    c
                ),
            ),
            Difficulty::Medium => {
                let value = a * b + c;
                (
                    format!("What is {} × {} + {}?", a, b, c),
                    value,
                    [value + 1, value - 1, value + 2],
                    format!(
                        "Multiply first: {} × {} = {}, then add {} to get {}.",
                        a,
                        b,
                        a * b,
                        c,
                        value
                    ),
                )
            }
            Difficulty::Hard => {
                let value = b * b - 4 * a * c;
                (
                    format!(
                        "If {}x² - {}x + {} = 0, what is the discriminant?",
                        a, b, c
                    ),
                    value,
                    [value + 4, value - 4, value.abs() + 1],
                    format!(
                        "The discriminant is b² - 4ac = {}² - 4·{}·{} = {}.",
                        b, a, c, value
                    ),
                )
            }
        };

        let mut choices: Vec<i64> = std::iter::once(correct).chain(distractors).collect();
        choices.shuffle(&mut rng);
        let correct_index = choices.iter().position(|&v| v == correct).unwrap_or(0);

        debug!(id = %id, difficulty = %request.difficulty, "Built algebra fallback question");

        Question {
            id,
            exam_type: request.exam_type.to_string(),
            topic: request.topic.clone(),
            difficulty: request.difficulty,
            question_text,
            choices: choices.iter().map(i64::to_string).collect(),
            correct_answer: LETTERS[correct_index].to_string(),
            explanation,
            source: FALLBACK_SOURCE.to_string(),
        }
    }
}

#[async_trait]
impl QuestionGenerator for FallbackGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<Question>> {
        Ok(self.questions(request))
    }

    fn name(&self) -> &'static str {
        FALLBACK_SOURCE
    }
}
