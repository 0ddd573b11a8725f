use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Subscription plan attribute of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Pro,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Pro => "pro",
        }
    }

    /// Parse a stored plan value; anything unknown is treated as free
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "pro" => Plan::Pro,
            _ => Plan::Free,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, Plan::Pro)
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registered user
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub plan: Plan,
    pub is_admin: bool,
    /// End of the free trial (Unix seconds), if one was started
    pub trial_ends_at: Option<i64>,
    pub created_at: String,
    pub last_login: Option<String>,
}

impl User {
    /// Check if the trial window is still open
    pub fn has_active_trial(&self, now: DateTime<Utc>) -> bool {
        self.trial_ends_at
            .map(|end| now.timestamp() <= end)
            .unwrap_or(false)
    }

    /// Plan used for quota decisions: an active trial counts as pro
    pub fn effective_plan(&self, now: DateTime<Utc>) -> Plan {
        if self.plan == Plan::Pro || self.has_active_trial(now) {
            Plan::Pro
        } else {
            Plan::Free
        }
    }

    /// Whole days left in the trial, 0 if none is active
    pub fn trial_days_remaining(&self, now: DateTime<Utc>) -> i64 {
        match self.trial_ends_at {
            Some(end) if self.has_active_trial(now) => {
                let end = Utc.timestamp_opt(end, 0).single().unwrap_or(now);
                (end - now).num_days() + 1
            }
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(plan: Plan, trial_ends_at: Option<i64>) -> User {
        User {
            id: 1,
            name: "Test".to_string(),
            email: "test@prepforge.com".to_string(),
            plan,
            is_admin: false,
            trial_ends_at,
            created_at: "2026-01-01 00:00:00".to_string(),
            last_login: None,
        }
    }

    #[test]
    fn test_plan_parse() {
        assert_eq!(Plan::parse("pro"), Plan::Pro);
        assert_eq!(Plan::parse("PRO "), Plan::Pro);
        assert_eq!(Plan::parse("free"), Plan::Free);
        assert_eq!(Plan::parse("enterprise"), Plan::Free);
        assert_eq!(Plan::Pro.to_string(), "pro");
    }

    #[test]
    fn test_effective_plan() {
        let now = Utc::now();
        assert_eq!(user(Plan::Free, None).effective_plan(now), Plan::Free);
        assert_eq!(user(Plan::Pro, None).effective_plan(now), Plan::Pro);

        let in_trial = user(Plan::Free, Some((now + Duration::days(3)).timestamp()));
        assert_eq!(in_trial.effective_plan(now), Plan::Pro);

        let expired = user(Plan::Free, Some((now - Duration::seconds(1)).timestamp()));
        assert_eq!(expired.effective_plan(now), Plan::Free);
    }

    #[test]
    fn test_trial_days_remaining() {
        let now = Utc.timestamp_opt(1_800_000_000, 0).unwrap();
        let in_trial = user(Plan::Free, Some((now + Duration::days(7)).timestamp()));
        assert_eq!(in_trial.trial_days_remaining(now), 8);

        let later = now + Duration::hours(30);
        assert_eq!(in_trial.trial_days_remaining(later), 6);

        assert_eq!(user(Plan::Free, None).trial_days_remaining(now), 0);
    }
}
