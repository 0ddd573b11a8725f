//! Counter storage for daily quotas
//!
//! Both backends implement `consume` as a single increment-and-compare so
//! that concurrent requests for the same key can never overshoot the ceiling.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::types::{ExamType, QuotaKey};
use crate::error::Result;

/// Outcome of an atomic increment attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Consumed { used: u32 },
    Denied { used: u32 },
}

#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Add `units` to the counter unless that would exceed `ceiling`.
    /// `None` means no ceiling.
    async fn consume(&self, key: &QuotaKey, units: u32, ceiling: Option<u32>)
        -> Result<ConsumeOutcome>;

    /// Give back `units` previously consumed; never drops below zero
    async fn release(&self, key: &QuotaKey, units: u32) -> Result<u32>;

    /// Current value of a counter (0 if it does not exist)
    async fn used(&self, key: &QuotaKey) -> Result<u32>;

    /// All counters of a user for one day
    async fn usage_for_day(&self, user_id: i64, day: NaiveDate) -> Result<Vec<(ExamType, u32)>>;

    /// Drop counters older than `day`; returns how many were removed
    async fn prune_before(&self, day: NaiveDate) -> Result<u64>;

    /// Remove a single counter
    async fn reset(&self, key: &QuotaKey) -> Result<()>;
}

/// In-process counters
#[derive(Default)]
pub struct MemoryQuotaStore {
    counters: Arc<RwLock<HashMap<QuotaKey, u32>>>,
}

impl MemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuotaStore for MemoryQuotaStore {
    async fn consume(
        &self,
        key: &QuotaKey,
        units: u32,
        ceiling: Option<u32>,
    ) -> Result<ConsumeOutcome> {
        let mut counters = self.counters.write().await;
        let used = counters.entry(key.clone()).or_insert(0);

        let next = used.saturating_add(units);
        if ceiling.map(|limit| next > limit).unwrap_or(false) {
            return Ok(ConsumeOutcome::Denied { used: *used });
        }

        *used = next;
        Ok(ConsumeOutcome::Consumed { used: next })
    }

    async fn release(&self, key: &QuotaKey, units: u32) -> Result<u32> {
        let mut counters = self.counters.write().await;
        match counters.get_mut(key) {
            Some(used) => {
                *used = used.saturating_sub(units);
                Ok(*used)
            }
            None => Ok(0),
        }
    }

    async fn used(&self, key: &QuotaKey) -> Result<u32> {
        let counters = self.counters.read().await;
        Ok(counters.get(key).copied().unwrap_or(0))
    }

    async fn usage_for_day(&self, user_id: i64, day: NaiveDate) -> Result<Vec<(ExamType, u32)>> {
        let counters = self.counters.read().await;
        let mut usage: Vec<(ExamType, u32)> = counters
            .iter()
            .filter(|(key, _)| key.user_id == user_id && key.day == day)
            .map(|(key, used)| (key.exam_type.clone(), *used))
            .collect();
        usage.sort();
        Ok(usage)
    }

    async fn prune_before(&self, day: NaiveDate) -> Result<u64> {
        let mut counters = self.counters.write().await;
        let before = counters.len();
        counters.retain(|key, _| key.day >= day);
        Ok((before - counters.len()) as u64)
    }

    async fn reset(&self, key: &QuotaKey) -> Result<()> {
        let mut counters = self.counters.write().await;
        counters.remove(key);
        Ok(())
    }
}

/// Counters persisted in the `quota_counters` table
#[derive(Clone)]
pub struct SqliteQuotaStore {
    db: SqlitePool,
}

impl SqliteQuotaStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

#[async_trait]
impl QuotaStore for SqliteQuotaStore {
    async fn consume(
        &self,
        key: &QuotaKey,
        units: u32,
        ceiling: Option<u32>,
    ) -> Result<ConsumeOutcome> {
        let day = day_key(key.day);

        sqlx::query(
            r#"
            INSERT INTO quota_counters (user_id, exam_type, day, used)
            VALUES (?, ?, ?, 0)
            ON CONFLICT(user_id, exam_type, day) DO NOTHING
            "#,
        )
        .bind(key.user_id)
        .bind(key.exam_type.as_str())
        .bind(&day)
        .execute(&self.db)
        .await?;

        // The ceiling check and the increment happen in one statement
        let updated: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE quota_counters
            SET used = used + ?
            WHERE user_id = ? AND exam_type = ? AND day = ?
              AND (? IS NULL OR used + ? <= ?)
            RETURNING used
            "#,
        )
        .bind(i64::from(units))
        .bind(key.user_id)
        .bind(key.exam_type.as_str())
        .bind(&day)
        .bind(ceiling.map(i64::from))
        .bind(i64::from(units))
        .bind(ceiling.map(i64::from))
        .fetch_optional(&self.db)
        .await?;

        match updated {
            Some((used,)) => Ok(ConsumeOutcome::Consumed { used: used as u32 }),
            None => Ok(ConsumeOutcome::Denied {
                used: self.used(key).await?,
            }),
        }
    }

    async fn release(&self, key: &QuotaKey, units: u32) -> Result<u32> {
        let updated: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE quota_counters
            SET used = MAX(used - ?, 0)
            WHERE user_id = ? AND exam_type = ? AND day = ?
            RETURNING used
            "#,
        )
        .bind(i64::from(units))
        .bind(key.user_id)
        .bind(key.exam_type.as_str())
        .bind(day_key(key.day))
        .fetch_optional(&self.db)
        .await?;

        Ok(updated.map(|r| r.0 as u32).unwrap_or(0))
    }

    async fn used(&self, key: &QuotaKey) -> Result<u32> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT used FROM quota_counters WHERE user_id = ? AND exam_type = ? AND day = ?",
        )
        .bind(key.user_id)
        .bind(key.exam_type.as_str())
        .bind(day_key(key.day))
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|r| r.0 as u32).unwrap_or(0))
    }

    async fn usage_for_day(&self, user_id: i64, day: NaiveDate) -> Result<Vec<(ExamType, u32)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT exam_type, used FROM quota_counters
            WHERE user_id = ? AND day = ?
            ORDER BY exam_type
            "#,
        )
        .bind(user_id)
        .bind(day_key(day))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|(exam_type, used)| Ok((ExamType::parse(Some(&exam_type))?, used as u32)))
            .collect()
    }

    async fn prune_before(&self, day: NaiveDate) -> Result<u64> {
        let result = sqlx::query("DELETE FROM quota_counters WHERE day < ?")
            .bind(day_key(day))
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    async fn reset(&self, key: &QuotaKey) -> Result<()> {
        sqlx::query("DELETE FROM quota_counters WHERE user_id = ? AND exam_type = ? AND day = ?")
            .bind(key.user_id)
            .bind(key.exam_type.as_str())
            .bind(day_key(key.day))
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage;

    fn key(user_id: i64, exam: &str, day: NaiveDate) -> QuotaKey {
        QuotaKey::new(user_id, ExamType::parse(Some(exam)).unwrap(), day)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    async fn stores() -> Vec<Box<dyn QuotaStore>> {
        let pool = storage::connect("sqlite::memory:").await.unwrap();
        vec![
            Box::new(MemoryQuotaStore::new()),
            Box::new(SqliteQuotaStore::new(pool)),
        ]
    }

    #[tokio::test]
    async fn test_consume_up_to_ceiling() {
        for store in stores().await {
            let k = key(1, "GRE", day(1));

            for i in 1..=3 {
                assert_eq!(
                    store.consume(&k, 1, Some(3)).await.unwrap(),
                    ConsumeOutcome::Consumed { used: i }
                );
            }
            assert_eq!(
                store.consume(&k, 1, Some(3)).await.unwrap(),
                ConsumeOutcome::Denied { used: 3 }
            );
            assert_eq!(store.used(&k).await.unwrap(), 3);
        }
    }

    #[tokio::test]
    async fn test_consume_is_all_or_nothing() {
        for store in stores().await {
            let k = key(1, "GRE", day(1));
            store.consume(&k, 4, Some(5)).await.unwrap();

            assert_eq!(
                store.consume(&k, 2, Some(5)).await.unwrap(),
                ConsumeOutcome::Denied { used: 4 }
            );
            assert_eq!(
                store.consume(&k, 1, Some(5)).await.unwrap(),
                ConsumeOutcome::Consumed { used: 5 }
            );
        }
    }

    #[tokio::test]
    async fn test_no_ceiling() {
        for store in stores().await {
            let k = key(7, "MCAT", day(1));
            for _ in 0..50 {
                assert!(matches!(
                    store.consume(&k, 1, None).await.unwrap(),
                    ConsumeOutcome::Consumed { .. }
                ));
            }
            assert_eq!(store.used(&k).await.unwrap(), 50);
        }
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        for store in stores().await {
            store.consume(&key(1, "GRE", day(1)), 2, Some(2)).await.unwrap();

            assert_eq!(store.used(&key(1, "GMAT", day(1))).await.unwrap(), 0);
            assert_eq!(store.used(&key(2, "GRE", day(1))).await.unwrap(), 0);
            assert_eq!(store.used(&key(1, "GRE", day(2))).await.unwrap(), 0);
            assert!(matches!(
                store.consume(&key(1, "GRE", day(2)), 1, Some(2)).await.unwrap(),
                ConsumeOutcome::Consumed { used: 1 }
            ));
        }
    }

    #[tokio::test]
    async fn test_usage_prune_and_reset() {
        for store in stores().await {
            store.consume(&key(1, "GRE", day(1)), 1, None).await.unwrap();
            store.consume(&key(1, "GMAT", day(2)), 2, None).await.unwrap();
            store.consume(&key(1, "GRE", day(2)), 3, None).await.unwrap();

            let usage = store.usage_for_day(1, day(2)).await.unwrap();
            assert_eq!(usage.len(), 2);
            assert_eq!(usage[0].0.as_str(), "GMAT");
            assert_eq!(usage[0].1, 2);
            assert_eq!(usage[1].1, 3);

            assert_eq!(store.prune_before(day(2)).await.unwrap(), 1);
            assert_eq!(store.used(&key(1, "GRE", day(1))).await.unwrap(), 0);

            store.reset(&key(1, "GRE", day(2))).await.unwrap();
            assert_eq!(store.used(&key(1, "GRE", day(2))).await.unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn test_release_returns_units() {
        for store in stores().await {
            let k = key(1, "GRE", day(1));
            store.consume(&k, 3, Some(3)).await.unwrap();

            assert_eq!(store.release(&k, 2).await.unwrap(), 1);
            assert!(matches!(
                store.consume(&k, 2, Some(3)).await.unwrap(),
                ConsumeOutcome::Consumed { used: 3 }
            ));

            assert_eq!(store.release(&k, 10).await.unwrap(), 0);
            assert_eq!(store.release(&key(9, "GRE", day(1)), 1).await.unwrap(), 0);
            assert_eq!(store.used(&key(9, "GRE", day(1))).await.unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn test_concurrent_consume_never_overshoots() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("quota.db").display());
        let pool = storage::connect(&url).await.unwrap();

        let stores: Vec<Arc<dyn QuotaStore>> = vec![
            Arc::new(MemoryQuotaStore::new()),
            Arc::new(SqliteQuotaStore::new(pool)),
        ];

        for store in stores {
            let k = key(1, "GRE", day(1));
            let mut handles = Vec::new();
            for _ in 0..40 {
                let store = Arc::clone(&store);
                let k = k.clone();
                handles.push(tokio::spawn(async move {
                    store.consume(&k, 1, Some(20)).await.unwrap()
                }));
            }

            let mut consumed = 0;
            for handle in handles {
                if matches!(handle.await.unwrap(), ConsumeOutcome::Consumed { .. }) {
                    consumed += 1;
                }
            }

            assert_eq!(consumed, 20);
            assert_eq!(store.used(&k).await.unwrap(), 20);
        }
    }
}
