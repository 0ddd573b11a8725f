//! SQLite connection setup and schema
//!
//! Tables are created on startup with `CREATE TABLE IF NOT EXISTS`, so a
//! fresh database file (or `sqlite::memory:`) is usable immediately.

use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{debug, info};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        plan TEXT NOT NULL DEFAULT 'free',
        is_admin INTEGER NOT NULL DEFAULT 0,
        trial_ends_at INTEGER,
        created_at TEXT NOT NULL,
        last_login TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS subscriptions (
        user_id INTEGER PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
        customer_id TEXT,
        active INTEGER NOT NULL DEFAULT 0,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_subscriptions_customer
        ON subscriptions(customer_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS quota_counters (
        user_id INTEGER NOT NULL,
        exam_type TEXT NOT NULL,
        day TEXT NOT NULL,
        used INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (user_id, exam_type, day)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS questions (
        id TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL,
        exam_type TEXT NOT NULL,
        topic TEXT NOT NULL,
        difficulty TEXT NOT NULL,
        question_text TEXT NOT NULL,
        choices TEXT NOT NULL,
        correct_answer TEXT NOT NULL,
        explanation TEXT NOT NULL,
        source TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS topic_performance (
        user_id INTEGER NOT NULL,
        exam_type TEXT NOT NULL,
        topic TEXT NOT NULL,
        score REAL NOT NULL,
        attempts INTEGER NOT NULL,
        last_updated TEXT NOT NULL,
        PRIMARY KEY (user_id, exam_type, topic)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_progress (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        question_id TEXT NOT NULL,
        exam_type TEXT NOT NULL,
        topic TEXT NOT NULL,
        user_answer TEXT NOT NULL,
        correct_answer TEXT NOT NULL,
        is_correct INTEGER NOT NULL,
        answered_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_user_progress_user
        ON user_progress(user_id, answered_at)
    "#,
];

/// Open a pool and make sure the schema exists.
///
/// In-memory databases live inside a single connection, so their pool is
/// pinned to one connection that is never recycled.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?
    };

    migrate(&pool).await?;
    info!("Database ready: {}", database_url);
    Ok(pool)
}

/// Create all tables and indexes
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    debug!("Schema applied ({} statements)", SCHEMA.len());
    Ok(())
}

/// Health check - verify database connectivity
pub async fn health_check(pool: &SqlitePool) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
