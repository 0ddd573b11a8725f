/// Daily question quotas
///
/// Counters are keyed by (user, exam type, UTC day):
/// - Free users get a fixed number of questions per exam type per day
/// - Pro users (or users in a trial) are counted but never limited
/// - Exhausting one exam type leaves the others untouched

pub mod manager;
pub mod store;
pub mod types;

pub use manager::{QuotaManager, QuotaPolicy};
pub use store::{MemoryQuotaStore, QuotaStore, SqliteQuotaStore};
pub use types::{today, ExamType, QuotaDecision, QuotaUsage};
