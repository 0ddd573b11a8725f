//! User accounts backed by SQLite
//!
//! # Security
//! - Passwords hashed with Argon2 (random salt per user)
//! - Emails are normalized before storage and lookup
//! - Failed attempts are logged; rate limiting happens at the HTTP layer
//!
//! # Usage
//! ```no_run
//! use prepforge::accounts::UserStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = prepforge::storage::connect("sqlite://prepforge.db").await?;
//! let users = UserStore::new(pool);
//!
//! users.create_user("Ada", "ada@prepforge.com", "password123").await?;
//! let user = users.authenticate("ada@prepforge.com", "password123").await?;
//! assert!(user.is_some());
//! # Ok(())
//! # }
//! ```

use super::types::{Plan, User};
use super::validation::{normalize_email, validate_email, validate_name, validate_password};
use crate::error::{PrepError, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    name: String,
    email: String,
    plan: String,
    is_admin: bool,
    trial_ends_at: Option<i64>,
    created_at: String,
    last_login: Option<String>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            name: row.name,
            email: row.email,
            plan: Plan::parse(&row.plan),
            is_admin: row.is_admin,
            trial_ends_at: row.trial_ends_at,
            created_at: row.created_at,
            last_login: row.last_login,
        }
    }
}

const USER_COLUMNS: &str =
    "id, name, email, plan, is_admin, trial_ends_at, created_at, last_login";

/// Subscription record maintained by payment webhooks
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Subscription {
    pub user_id: i64,
    pub customer_id: Option<String>,
    pub active: bool,
    pub updated_at: String,
}

#[derive(Clone)]
pub struct UserStore {
    db: SqlitePool,
}

impl UserStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Register a new user with the free plan
    pub async fn create_user(&self, name: &str, email: &str, password: &str) -> Result<User> {
        let email = normalize_email(email);
        validate_name(name)?;
        validate_email(&email)?;
        validate_password(password)?;

        let password_hash = hash_password(password)?;

        // The UNIQUE constraint on email decides concurrent signups
        let id = sqlx::query(
            r#"
            INSERT INTO users (name, email, password_hash, plan, created_at)
            VALUES (?, ?, ?, 'free', datetime('now'))
            "#,
        )
        .bind(name.trim())
        .bind(&email)
        .bind(&password_hash)
        .execute(&self.db)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                PrepError::Validation("Email already registered".to_string())
            }
            e => PrepError::Database(e),
        })?
        .last_insert_rowid();

        info!("User registered: {} (id {})", email, id);

        self.find_by_id(id)
            .await?
            .ok_or_else(|| PrepError::NotFound(format!("user {}", id)))
    }

    /// Check credentials; returns the user on success
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>> {
        let email = normalize_email(email);
        debug!("Authentication attempt for {}", email);

        let row = sqlx::query_as::<_, (i64, String)>(
            "SELECT id, password_hash FROM users WHERE email = ?",
        )
        .bind(&email)
        .fetch_optional(&self.db)
        .await?;

        let Some((id, stored_hash)) = row else {
            warn!("Authentication failed: user not found: {}", email);
            return Ok(None);
        };

        let parsed_hash =
            PasswordHash::new(&stored_hash).map_err(|_| PrepError::AuthenticationFailed)?;

        if Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_err()
        {
            warn!("Authentication failed: invalid password for {}", email);
            return Ok(None);
        }

        sqlx::query("UPDATE users SET last_login = datetime('now') WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;

        info!("Authentication successful for {}", email);
        self.find_by_id(id).await
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = ?",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(User::from))
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE email = ?",
            USER_COLUMNS
        ))
        .bind(normalize_email(email))
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(User::from))
    }

    pub async fn user_exists(&self, email: &str) -> Result<bool> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(normalize_email(email))
            .fetch_one(&self.db)
            .await?;

        Ok(count.0 > 0)
    }

    pub async fn set_plan(&self, user_id: i64, plan: Plan) -> Result<()> {
        let result = sqlx::query("UPDATE users SET plan = ? WHERE id = ?")
            .bind(plan.as_str())
            .bind(user_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PrepError::NotFound(format!("user {}", user_id)));
        }

        info!("User {} plan set to {}", user_id, plan);
        Ok(())
    }

    /// Open a trial window of `days` starting at `now`
    pub async fn start_trial(&self, user_id: i64, days: i64, now: DateTime<Utc>) -> Result<User> {
        let ends_at = (now + Duration::days(days)).timestamp();

        let result = sqlx::query("UPDATE users SET trial_ends_at = ? WHERE id = ?")
            .bind(ends_at)
            .bind(user_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PrepError::NotFound(format!("user {}", user_id)));
        }

        info!("Started {}-day trial for user {}", days, user_id);
        self.find_by_id(user_id)
            .await?
            .ok_or_else(|| PrepError::NotFound(format!("user {}", user_id)))
    }

    pub async fn delete_user(&self, email: &str) -> Result<()> {
        let email = normalize_email(email);
        info!("Deleting user: {}", email);

        sqlx::query("DELETE FROM users WHERE email = ?")
            .bind(&email)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users ORDER BY created_at DESC, id DESC",
            USER_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    pub async fn count_users(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db)
            .await?;

        Ok(count.0)
    }

    /// Insert or update the subscription row of a user.
    ///
    /// An existing customer id is kept when `customer_id` is `None`.
    pub async fn upsert_subscription(
        &self,
        user_id: i64,
        customer_id: Option<&str>,
        active: bool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (user_id, customer_id, active, updated_at)
            VALUES (?, ?, ?, datetime('now'))
            ON CONFLICT(user_id) DO UPDATE SET
                customer_id = COALESCE(excluded.customer_id, subscriptions.customer_id),
                active = excluded.active,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(customer_id)
        .bind(active)
        .execute(&self.db)
        .await?;

        debug!("Subscription for user {} set active={}", user_id, active);
        Ok(())
    }

    pub async fn subscription(&self, user_id: i64) -> Result<Option<Subscription>> {
        let row = sqlx::query_as::<_, Subscription>(
            "SELECT user_id, customer_id, active, updated_at FROM subscriptions WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row)
    }

    /// Flip the subscription of a payment customer; returns the owning user
    pub async fn set_subscription_active_by_customer(
        &self,
        customer_id: &str,
        active: bool,
    ) -> Result<Option<i64>> {
        let user_id: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE subscriptions
            SET active = ?, updated_at = datetime('now')
            WHERE customer_id = ?
            RETURNING user_id
            "#,
        )
        .bind(active)
        .bind(customer_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(user_id.map(|row| row.0))
    }
}

/// Hash password with Argon2
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PrepError::Config(format!("Failed to hash password: {}", e)))?;

    Ok(password_hash.to_string())
}
