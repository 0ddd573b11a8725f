//! Quiz JSON endpoints: question generation, answers and quota status

use axum::{body::Bytes, extract::State, Json};
use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::auth::CurrentUser;
use crate::api::state::AppState;
use crate::error::{PrepError, Result};
use crate::questions::{parse_topic, AnswerOutcome, AnswerSubmission, Question};
use crate::quota::{today, ExamType, QuotaDecision, QuotaUsage};

#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    pub exam_type: Option<String>,
    pub topic: Option<String>,
    pub count: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub questions: Vec<Question>,
    pub count: usize,
    /// `null` for unlimited plans
    pub questions_remaining: Option<u32>,
    pub exam_type: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: AnswerOutcome,
}

#[derive(Debug, Serialize)]
pub struct QuotaResponse {
    pub user_id: i64,
    pub plan: String,
    /// Daily ceiling per exam type, `null` when unlimited
    pub limit: Option<u32>,
    pub usage: Vec<QuotaUsage>,
}

/// Decode an optional JSON body; an empty body means all defaults
fn json_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| PrepError::Validation(format!("Invalid JSON body: {}", e)))
}

/// POST /api/generate-questions
pub async fn generate_questions(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    body: Bytes,
) -> Result<Json<GenerateResponse>> {
    let request: GenerateRequest = json_body(&body)?;

    let exam_type = ExamType::parse(request.exam_type.as_deref())?;
    let topic = parse_topic(request.topic.as_deref())?;
    let count = state.quota.clamp_units(request.count.unwrap_or(1));
    let plan = user.effective_plan(Utc::now());

    let day = today();
    let remaining = match state
        .quota
        .try_consume(user.id, plan, &exam_type, count, day)
        .await?
    {
        QuotaDecision::Allowed { remaining, .. } => remaining,
        QuotaDecision::Rejected { limit, .. } => {
            return Err(PrepError::QuotaExceeded {
                exam_type: exam_type.to_string(),
                limit,
            })
        }
    };

    let questions = match state
        .questions
        .generate(user.id, &exam_type, &topic, count)
        .await
    {
        Ok(questions) => questions,
        Err(e) => {
            // Nothing was delivered, so the units go back
            if let Err(release_err) = state.quota.release(user.id, &exam_type, count, day).await {
                warn!(
                    "Failed to release {} quota units for user {}: {}",
                    count, user.id, release_err
                );
            }
            return Err(e);
        }
    };

    info!(
        user_id = user.id,
        exam_type = %exam_type,
        topic = %topic,
        count = questions.len(),
        "Questions generated"
    );

    Ok(Json(GenerateResponse {
        success: true,
        count: questions.len(),
        questions,
        questions_remaining: remaining,
        exam_type: exam_type.to_string(),
    }))
}

/// POST /api/submit-answer
pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    body: Bytes,
) -> Result<Json<SubmitResponse>> {
    let submission: AnswerSubmission = json_body(&body)?;
    let outcome = state.questions.submit_answer(user.id, &submission).await?;

    Ok(Json(SubmitResponse {
        success: true,
        outcome,
    }))
}

/// GET /api/quota
pub async fn quota_status(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<QuotaResponse>> {
    let plan = user.effective_plan(Utc::now());
    let usage = state.quota.usage(user.id, plan, today()).await?;

    Ok(Json(QuotaResponse {
        user_id: user.id,
        plan: plan.to_string(),
        limit: state.quota.ceiling(plan),
        usage,
    }))
}
