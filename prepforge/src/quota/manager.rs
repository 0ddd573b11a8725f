use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info};

use super::store::{ConsumeOutcome, QuotaStore};
use super::types::{ExamType, QuotaDecision, QuotaKey, QuotaUsage};
use crate::accounts::Plan;
use crate::config::QuotaConfig;
use crate::error::Result;

/// Ceiling rules applied to every counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    /// Units per exam type per day for free users
    pub free_daily_limit: u32,
    /// Upper bound on units a single request may ask for
    pub max_units_per_request: u32,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            free_daily_limit: 20,
            max_units_per_request: 5,
        }
    }
}

impl From<&QuotaConfig> for QuotaPolicy {
    fn from(config: &QuotaConfig) -> Self {
        Self {
            free_daily_limit: config.free_daily_limit,
            max_units_per_request: config.max_questions_per_request.max(1),
        }
    }
}

/// Per-user, per-exam-type daily quota enforcement
///
/// State per (user, exam type, day): under the limit, at the limit, then
/// every further request is rejected until the next UTC day. Pro users are
/// counted but never limited.
pub struct QuotaManager {
    store: Arc<dyn QuotaStore>,
    policy: QuotaPolicy,
}

impl QuotaManager {
    pub fn new(store: Arc<dyn QuotaStore>, policy: QuotaPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> QuotaPolicy {
        self.policy
    }

    /// Ceiling for a plan; `None` means unlimited
    pub fn ceiling(&self, plan: Plan) -> Option<u32> {
        if plan.is_unlimited() {
            None
        } else {
            Some(self.policy.free_daily_limit)
        }
    }

    /// Clamp a requested count into `[1, max_units_per_request]`
    pub fn clamp_units(&self, requested: i64) -> u32 {
        requested.clamp(1, i64::from(self.policy.max_units_per_request)) as u32
    }

    /// Count `units` against today's counter, or reject without counting
    pub async fn try_consume(
        &self,
        user_id: i64,
        plan: Plan,
        exam_type: &ExamType,
        units: u32,
        day: NaiveDate,
    ) -> Result<QuotaDecision> {
        let key = QuotaKey::new(user_id, exam_type.clone(), day);
        let ceiling = self.ceiling(plan);

        let decision = match self.store.consume(&key, units, ceiling).await? {
            ConsumeOutcome::Consumed { used } => QuotaDecision::Allowed {
                used,
                remaining: ceiling.map(|limit| limit.saturating_sub(used)),
            },
            ConsumeOutcome::Denied { used } => QuotaDecision::Rejected {
                limit: ceiling.unwrap_or(u32::MAX),
                used,
            },
        };

        match decision {
            QuotaDecision::Allowed { used, remaining } => debug!(
                user_id,
                exam_type = %exam_type,
                used,
                remaining = ?remaining,
                "Quota consumed"
            ),
            QuotaDecision::Rejected { limit, used } => info!(
                user_id,
                exam_type = %exam_type,
                used,
                limit,
                "Quota exhausted, request rejected"
            ),
        }

        Ok(decision)
    }

    /// Hand back units from a consumption whose request then failed
    pub async fn release(
        &self,
        user_id: i64,
        exam_type: &ExamType,
        units: u32,
        day: NaiveDate,
    ) -> Result<()> {
        let used = self
            .store
            .release(&QuotaKey::new(user_id, exam_type.clone(), day), units)
            .await?;
        debug!(user_id, exam_type = %exam_type, units, used, "Quota released");
        Ok(())
    }

    /// Units left today for one exam type; `None` for unlimited plans
    pub async fn remaining(
        &self,
        user_id: i64,
        plan: Plan,
        exam_type: &ExamType,
        day: NaiveDate,
    ) -> Result<Option<u32>> {
        let Some(limit) = self.ceiling(plan) else {
            return Ok(None);
        };

        let used = self
            .store
            .used(&QuotaKey::new(user_id, exam_type.clone(), day))
            .await?;
        Ok(Some(limit.saturating_sub(used)))
    }

    /// Usage of every exam type touched by the user on `day`
    pub async fn usage(&self, user_id: i64, plan: Plan, day: NaiveDate) -> Result<Vec<QuotaUsage>> {
        let ceiling = self.ceiling(plan);

        Ok(self
            .store
            .usage_for_day(user_id, day)
            .await?
            .into_iter()
            .map(|(exam_type, used)| QuotaUsage {
                exam_type,
                used,
                remaining: ceiling.map(|limit| limit.saturating_sub(used)),
            })
            .collect())
    }

    /// Drop counters from days before `day`
    pub async fn prune_before(&self, day: NaiveDate) -> Result<u64> {
        let removed = self.store.prune_before(day).await?;
        if removed > 0 {
            info!("Pruned {} stale quota counters", removed);
        }
        Ok(removed)
    }

    /// Clear one counter (admin operation)
    pub async fn reset(&self, user_id: i64, exam_type: &ExamType, day: NaiveDate) -> Result<()> {
        self.store
            .reset(&QuotaKey::new(user_id, exam_type.clone(), day))
            .await?;
        info!(user_id, exam_type = %exam_type, "Quota counter reset");
        Ok(())
    }
}
