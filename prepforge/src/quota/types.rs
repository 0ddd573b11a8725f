use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PrepError, Result};

pub const DEFAULT_EXAM_TYPE: &str = "GRE";
const MAX_EXAM_TYPE_LEN: usize = 32;

/// Exam category (GRE, GMAT, MCAT, ...) partitioning quota and content
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExamType(String);

impl ExamType {
    /// Parse a client-supplied exam type; missing values default to GRE
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        let raw = raw.map(str::trim).filter(|s| !s.is_empty());
        let Some(raw) = raw else {
            return Ok(Self(DEFAULT_EXAM_TYPE.to_string()));
        };

        if raw.len() > MAX_EXAM_TYPE_LEN
            || !raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(PrepError::Validation(format!("Invalid exam type: {}", raw)));
        }

        Ok(Self(raw.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Counter identity: one per user, exam type and UTC calendar day
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuotaKey {
    pub user_id: i64,
    pub exam_type: ExamType,
    pub day: NaiveDate,
}

impl QuotaKey {
    pub fn new(user_id: i64, exam_type: ExamType, day: NaiveDate) -> Self {
        Self {
            user_id,
            exam_type,
            day,
        }
    }
}

/// Result of a check-and-consume against a counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    /// Units were counted. `remaining` is `None` for unlimited plans.
    Allowed { used: u32, remaining: Option<u32> },
    /// Nothing was counted
    Rejected { limit: u32, used: u32 },
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Allowed { .. })
    }

    pub fn remaining(&self) -> Option<u32> {
        match self {
            QuotaDecision::Allowed { remaining, .. } => *remaining,
            QuotaDecision::Rejected { .. } => Some(0),
        }
    }
}

/// Per-exam usage for one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaUsage {
    pub exam_type: ExamType,
    pub used: u32,
    pub remaining: Option<u32>,
}

/// Current UTC calendar day; counters roll over at midnight UTC
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}
