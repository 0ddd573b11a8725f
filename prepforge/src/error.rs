use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum PrepError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Daily limit of {limit} questions reached for {exam_type}. Upgrade to Pro for unlimited access.")]
    QuotaExceeded { exam_type: String, limit: u32 },

    #[error("Answer is required")]
    MissingAnswer,

    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    #[error("Question generation failed: {0}")]
    Generation(String),

    #[error("Payment system not configured")]
    PaymentNotConfigured,

    #[error("Payment provider error: {0}")]
    Payment(String),

    #[error("Webhook error: {0}")]
    Webhook(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, PrepError>;

/// JSON error body shared by every API endpoint
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: &'static str,
}

impl ApiError {
    pub fn new(msg: impl Into<String>, code: &'static str) -> Self {
        Self {
            error: msg.into(),
            code,
        }
    }
}

/// Body returned with 429 when a daily quota is exhausted
#[derive(Debug, Serialize)]
pub struct QuotaExceededBody {
    pub error: String,
    pub code: &'static str,
    pub limit: u32,
    pub remaining: u32,
    pub exam_type: String,
}

impl PrepError {
    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            PrepError::Validation(_) => "invalid_request",
            PrepError::MissingAnswer => "missing_answer",
            PrepError::TooManyRequests(_) => "too_many_requests",
            PrepError::AuthenticationFailed | PrepError::Unauthorized(_) => "unauthorized",
            PrepError::NotFound(_) => "not_found",
            PrepError::QuotaExceeded { .. } => "rate_limit_exceeded",
            PrepError::Generation(_) => "generation_failed",
            PrepError::PaymentNotConfigured => "payment_config_error",
            PrepError::Payment(_) => "checkout_error",
            PrepError::Webhook(_) => "invalid_webhook",
            _ => "server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PrepError::Validation(_) | PrepError::MissingAnswer | PrepError::Webhook(_) => {
                StatusCode::BAD_REQUEST
            }
            PrepError::AuthenticationFailed | PrepError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            PrepError::NotFound(_) => StatusCode::NOT_FOUND,
            PrepError::QuotaExceeded { .. } | PrepError::TooManyRequests(_) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PrepError {
    fn into_response(self) -> Response {
        let status = self.status();

        if let PrepError::QuotaExceeded { exam_type, limit } = &self {
            warn!(exam_type = %exam_type, limit, "Daily question quota exhausted");
            let body = QuotaExceededBody {
                error: self.to_string(),
                code: self.code(),
                limit: *limit,
                remaining: 0,
                exam_type: exam_type.clone(),
            };
            return (status, Json(body)).into_response();
        }

        // Internal details stay in the logs
        let message = if status.is_server_error() {
            error!("Request failed: {}", self);
            match &self {
                PrepError::PaymentNotConfigured => self.to_string(),
                PrepError::Payment(_) => "Failed to create checkout session".to_string(),
                PrepError::Generation(_) => "Failed to generate questions. Please try again.".to_string(),
                _ => "Internal server error".to_string(),
            }
        } else {
            warn!("Request rejected: {}", self);
            self.to_string()
        };

        (status, Json(ApiError::new(message, self.code()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_exceeded_message() {
        let err = PrepError::QuotaExceeded {
            exam_type: "GRE".to_string(),
            limit: 20,
        };
        assert_eq!(
            err.to_string(),
            "Daily limit of 20 questions reached for GRE. Upgrade to Pro for unlimited access."
        );
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.code(), "rate_limit_exceeded");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(PrepError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(PrepError::Unauthorized("x".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(PrepError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            PrepError::PaymentNotConfigured.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(PrepError::PaymentNotConfigured.code(), "payment_config_error");
        assert_eq!(PrepError::MissingAnswer.status(), StatusCode::BAD_REQUEST);
        assert_eq!(PrepError::MissingAnswer.code(), "missing_answer");
    }
}
