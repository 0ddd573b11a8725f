//! Question generation and answer checking
//!
//! Generation never returns fewer questions than asked for: whatever the
//! primary generator cannot supply is filled from the template fallback.
//! Every issued question is recorded, and answers are checked against that
//! record rather than against client-supplied data.

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use super::fallback::FallbackGenerator;
use super::generator::QuestionGenerator;
use super::store::{PerformanceStore, ProgressStore, QuestionStore};
use super::types::{
    AnswerRecord, Difficulty, GenerationRequest, Question, TopicPerformance, DEFAULT_SCORE,
    LETTERS,
};
use crate::error::{PrepError, Result};
use crate::quota::ExamType;

const CHOICE_PREFIX: &str = r"^[A-D][.)]\s*";

/// Answer submitted from the quiz page
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnswerSubmission {
    pub question_id: Option<String>,
    #[serde(default)]
    pub answer: String,
    pub exam_type: Option<String>,
    /// Copy of the question as the client received it
    pub question_data: Option<Value>,
}

/// Question fields a client may echo back
#[derive(Debug, Deserialize)]
struct ClientQuestion {
    correct_answer: String,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    difficulty: Option<String>,
    #[serde(default)]
    choices: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerOutcome {
    pub is_correct: bool,
    pub correct_answer: String,
    pub explanation: String,
    pub score: f64,
    pub user_answer: String,
    /// Running average for the topic after this answer
    pub overall_score: f64,
}

pub struct QuestionService {
    primary: Arc<dyn QuestionGenerator>,
    fallback: FallbackGenerator,
    questions: QuestionStore,
    performance: PerformanceStore,
    progress: ProgressStore,
    choice_prefix: Regex,
}

impl QuestionService {
    pub fn new(
        primary: Arc<dyn QuestionGenerator>,
        questions: QuestionStore,
        performance: PerformanceStore,
        progress: ProgressStore,
    ) -> Result<Self> {
        let choice_prefix = Regex::new(CHOICE_PREFIX)
            .map_err(|e| PrepError::Config(format!("Invalid choice prefix pattern: {}", e)))?;

        Ok(Self {
            primary,
            fallback: FallbackGenerator::new(),
            questions,
            performance,
            progress,
            choice_prefix,
        })
    }

    pub fn generator_name(&self) -> &'static str {
        self.primary.name()
    }

    /// Difficulty the next questions on this topic should have
    pub async fn difficulty_for(
        &self,
        user_id: i64,
        exam_type: &ExamType,
        topic: &str,
    ) -> Result<(Difficulty, f64)> {
        let score = self
            .performance
            .get(user_id, exam_type.as_str(), topic)
            .await?
            .map(|p| p.score)
            .unwrap_or(DEFAULT_SCORE);
        Ok((Difficulty::from_score(score), score))
    }

    /// Produce exactly `count` questions and record them for `user_id`
    pub async fn generate(
        &self,
        user_id: i64,
        exam_type: &ExamType,
        topic: &str,
        count: u32,
    ) -> Result<Vec<Question>> {
        let (difficulty, user_score) = self.difficulty_for(user_id, exam_type, topic).await?;
        let request = GenerationRequest {
            exam_type: exam_type.clone(),
            topic: topic.to_string(),
            difficulty,
            user_score,
            count,
        };

        let mut questions: Vec<Question> = match self.primary.generate(&request).await {
            Ok(generated) => generated
                .into_iter()
                .filter_map(|q| self.clean(q, &request))
                .take(count as usize)
                .collect(),
            Err(e) => {
                warn!(
                    "Generator {} failed, using fallback questions: {}",
                    self.primary.name(),
                    e
                );
                Vec::new()
            }
        };

        let shortfall = count.saturating_sub(questions.len() as u32);
        if shortfall > 0 {
            let fill = GenerationRequest {
                count: shortfall,
                ..request.clone()
            };
            questions.extend(self.fallback.questions(&fill));
        }

        for question in &questions {
            self.questions.insert(user_id, question).await?;
        }

        info!(
            user_id,
            exam_type = %exam_type,
            topic,
            difficulty = %difficulty,
            "Issued {} questions ({} from fallback)",
            questions.len(),
            shortfall
        );
        Ok(questions)
    }

    /// Normalize a generated question; `None` when it is unusable
    fn clean(&self, mut question: Question, request: &GenerationRequest) -> Option<Question> {
        question.choices = question
            .choices
            .iter()
            .map(|choice| self.choice_prefix.replace(choice.trim(), "").trim().to_string())
            .collect();
        question.correct_answer = question.correct_answer.trim().to_ascii_uppercase();

        let answer_ok = question.correct_answer.len() == 1
            && LETTERS
                .iter()
                .take(question.choices.len())
                .any(|l| question.correct_answer.starts_with(*l));
        if question.choices.len() != LETTERS.len() || !answer_ok {
            warn!(id = %question.id, "Discarding malformed generated question");
            return None;
        }

        question.exam_type = request.exam_type.to_string();
        question.topic = request.topic.clone();
        question.difficulty = request.difficulty;
        Some(question)
    }

    /// Check an answer, add it to the history and update topic performance
    ///
    /// Never touches quota counters.
    pub async fn submit_answer(
        &self,
        user_id: i64,
        submission: &AnswerSubmission,
    ) -> Result<AnswerOutcome> {
        let answer = submission.answer.trim();
        if answer.is_empty() {
            return Err(PrepError::MissingAnswer);
        }

        let question = self.resolve_question(user_id, submission).await?;

        let correct_answer = question.correct_answer.trim().to_ascii_uppercase();
        let user_answer = question
            .resolve_answer(answer)
            .map(String::from)
            .unwrap_or_else(|| answer.to_ascii_uppercase());
        let is_correct = user_answer == correct_answer;

        self.progress
            .record(
                user_id,
                &AnswerRecord {
                    question_id: question.id.clone(),
                    exam_type: question.exam_type.clone(),
                    topic: question.topic.clone(),
                    user_answer: user_answer.clone(),
                    correct_answer: correct_answer.clone(),
                    is_correct,
                    answered_at: Utc::now(),
                },
            )
            .await?;

        let performance = self
            .performance
            .record(
                user_id,
                &question.exam_type,
                &question.topic,
                if is_correct { 100.0 } else { 0.0 },
            )
            .await?;

        info!(
            user_id,
            question_id = %question.id,
            is_correct,
            "Answer submitted ({} vs {})",
            user_answer,
            correct_answer
        );

        Ok(AnswerOutcome {
            is_correct,
            correct_answer,
            explanation: question.explanation,
            score: if is_correct { 1.0 } else { 0.0 },
            user_answer,
            overall_score: performance.score,
        })
    }

    async fn resolve_question(&self, user_id: i64, submission: &AnswerSubmission) -> Result<Question> {
        let question_id = submission
            .question_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        if let Some(id) = question_id {
            if let Some((owner, question)) = self.questions.find(id).await? {
                if owner == user_id {
                    return Ok(question);
                }
                warn!(user_id, question_id = id, "Answer for a question issued to another user");
                return Err(PrepError::NotFound(format!("Question {}", id)));
            }
        }

        // Unknown id: fall back to what the client echoed back
        let data = submission
            .question_data
            .clone()
            .filter(|v| !v.is_null())
            .ok_or_else(|| {
                PrepError::NotFound(format!("Question {}", question_id.unwrap_or("(none)")))
            })?;

        let client: ClientQuestion = serde_json::from_value(data)
            .map_err(|e| PrepError::Validation(format!("Invalid question_data: {}", e)))?;

        let exam_type = ExamType::parse(submission.exam_type.as_deref())?;
        Ok(Question {
            id: question_id.unwrap_or("client").to_string(),
            exam_type: exam_type.to_string(),
            topic: client.topic.unwrap_or_else(|| "General".to_string()),
            difficulty: client
                .difficulty
                .as_deref()
                .map(Difficulty::parse)
                .unwrap_or(Difficulty::Medium),
            question_text: String::new(),
            choices: client.choices,
            correct_answer: client.correct_answer,
            explanation: client
                .explanation
                .unwrap_or_else(|| "No explanation available.".to_string()),
            source: "client".to_string(),
        })
    }

    pub async fn performance_for(&self, user_id: i64) -> Result<Vec<TopicPerformance>> {
        self.performance.list_for_user(user_id).await
    }

    /// Newest answers first
    pub async fn recent_answers(&self, user_id: i64, limit: i64) -> Result<Vec<AnswerRecord>> {
        self.progress.recent(user_id, limit).await
    }

    /// (exam type, answers, correct answers) for the whole history
    pub async fn answer_totals(&self, user_id: i64) -> Result<Vec<(String, i64, i64)>> {
        self.progress.totals_by_exam(user_id).await
    }

    /// Drop stored questions older than `days`
    pub async fn prune_older_than(&self, days: i64) -> Result<u64> {
        self.questions.prune_older_than(days).await
    }
}
