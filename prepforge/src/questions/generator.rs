//! Question generator abstraction

use async_trait::async_trait;

use super::types::{GenerationRequest, Question};
use crate::error::Result;

/// Source of multiple-choice questions
///
/// Implementations may return fewer questions than requested; the caller
/// fills the gap.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<Question>>;

    /// Short identifier used in logs
    fn name(&self) -> &'static str;
}
