//! Persistence of issued questions, per-topic performance and answer history

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use super::types::{AnswerRecord, Difficulty, Question, TopicPerformance};
use crate::error::Result;

/// Questions handed out to users, kept so answers can be checked server-side
#[derive(Clone)]
pub struct QuestionStore {
    db: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct QuestionRow {
    id: String,
    user_id: i64,
    exam_type: String,
    topic: String,
    difficulty: String,
    question_text: String,
    choices: String,
    correct_answer: String,
    explanation: String,
    source: String,
}

impl QuestionStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn insert(&self, user_id: i64, question: &Question) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO questions
                (id, user_id, exam_type, topic, difficulty, question_text,
                 choices, correct_answer, explanation, source, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))
            "#,
        )
        .bind(&question.id)
        .bind(user_id)
        .bind(&question.exam_type)
        .bind(&question.topic)
        .bind(question.difficulty.as_str())
        .bind(&question.question_text)
        .bind(serde_json::to_string(&question.choices)?)
        .bind(&question.correct_answer)
        .bind(&question.explanation)
        .bind(&question.source)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Question and the id of the user it was issued to
    pub async fn find(&self, id: &str) -> Result<Option<(i64, Question)>> {
        let row: Option<QuestionRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, exam_type, topic, difficulty, question_text,
                   choices, correct_answer, explanation, source
            FROM questions WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let question = Question {
            id: row.id,
            exam_type: row.exam_type,
            topic: row.topic,
            difficulty: Difficulty::parse(&row.difficulty),
            question_text: row.question_text,
            choices: serde_json::from_str(&row.choices)?,
            correct_answer: row.correct_answer,
            explanation: row.explanation,
            source: row.source,
        };
        Ok(Some((row.user_id, question)))
    }

    pub async fn count_for_user(&self, user_id: i64) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM questions WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.db)
            .await?;
        Ok(row.0)
    }

    /// Delete questions issued before `days` days ago
    pub async fn prune_older_than(&self, days: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM questions WHERE created_at < datetime('now', ?)")
            .bind(format!("-{} days", days))
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Running average score per (user, exam type, topic)
#[derive(Clone)]
pub struct PerformanceStore {
    db: SqlitePool,
}

impl PerformanceStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn get(
        &self,
        user_id: i64,
        exam_type: &str,
        topic: &str,
    ) -> Result<Option<TopicPerformance>> {
        let row: Option<(f64, i64)> = sqlx::query_as(
            r#"
            SELECT score, attempts FROM topic_performance
            WHERE user_id = ? AND exam_type = ? AND topic = ?
            "#,
        )
        .bind(user_id)
        .bind(exam_type)
        .bind(topic)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|(score, attempts)| TopicPerformance {
            exam_type: exam_type.to_string(),
            topic: topic.to_string(),
            score,
            attempts,
        }))
    }

    /// Fold one answer score (0-100) into the running average
    pub async fn record(
        &self,
        user_id: i64,
        exam_type: &str,
        topic: &str,
        score: f64,
    ) -> Result<TopicPerformance> {
        let (score, attempts): (f64, i64) = sqlx::query_as(
            r#"
            INSERT INTO topic_performance (user_id, exam_type, topic, score, attempts, last_updated)
            VALUES (?, ?, ?, ?, 1, ?)
            ON CONFLICT(user_id, exam_type, topic) DO UPDATE SET
                score = (topic_performance.score * topic_performance.attempts + excluded.score)
                        / (topic_performance.attempts + 1),
                attempts = topic_performance.attempts + 1,
                last_updated = excluded.last_updated
            RETURNING score, attempts
            "#,
        )
        .bind(user_id)
        .bind(exam_type)
        .bind(topic)
        .bind(score)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&self.db)
        .await?;

        debug!(
            user_id,
            exam_type, topic, score, attempts, "Topic performance updated"
        );

        Ok(TopicPerformance {
            exam_type: exam_type.to_string(),
            topic: topic.to_string(),
            score,
            attempts,
        })
    }

    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<TopicPerformance>> {
        let rows: Vec<(String, String, f64, i64)> = sqlx::query_as(
            r#"
            SELECT exam_type, topic, score, attempts FROM topic_performance
            WHERE user_id = ?
            ORDER BY exam_type, topic
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(exam_type, topic, score, attempts)| TopicPerformance {
                exam_type,
                topic,
                score,
                attempts,
            })
            .collect())
    }
}

/// Every graded answer, newest last
#[derive(Clone)]
pub struct ProgressStore {
    db: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct ProgressRow {
    question_id: String,
    exam_type: String,
    topic: String,
    user_answer: String,
    correct_answer: String,
    is_correct: bool,
    answered_at: String,
}

impl TryFrom<ProgressRow> for AnswerRecord {
    type Error = sqlx::Error;

    fn try_from(row: ProgressRow) -> std::result::Result<Self, Self::Error> {
        let answered_at = DateTime::parse_from_rfc3339(&row.answered_at)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?
            .with_timezone(&Utc);

        Ok(AnswerRecord {
            question_id: row.question_id,
            exam_type: row.exam_type,
            topic: row.topic,
            user_answer: row.user_answer,
            correct_answer: row.correct_answer,
            is_correct: row.is_correct,
            answered_at,
        })
    }
}

impl ProgressStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn record(&self, user_id: i64, answer: &AnswerRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_progress
                (user_id, question_id, exam_type, topic, user_answer,
                 correct_answer, is_correct, answered_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(&answer.question_id)
        .bind(&answer.exam_type)
        .bind(&answer.topic)
        .bind(&answer.user_answer)
        .bind(&answer.correct_answer)
        .bind(answer.is_correct)
        .bind(answer.answered_at.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Latest `limit` answers, newest first
    pub async fn recent(&self, user_id: i64, limit: i64) -> Result<Vec<AnswerRecord>> {
        let rows: Vec<ProgressRow> = sqlx::query_as(
            r#"
            SELECT question_id, exam_type, topic, user_answer, correct_answer,
                   is_correct, answered_at
            FROM user_progress
            WHERE user_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        let records = rows
            .into_iter()
            .map(AnswerRecord::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// (exam type, answers, correct answers) over the whole history
    pub async fn totals_by_exam(&self, user_id: i64) -> Result<Vec<(String, i64, i64)>> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT exam_type, COUNT(*), COALESCE(SUM(is_correct), 0)
            FROM user_progress
            WHERE user_id = ?
            GROUP BY exam_type
            ORDER BY exam_type
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}
