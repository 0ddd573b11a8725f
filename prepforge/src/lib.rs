//! PrepForge: exam-preparation quiz service
//!
//! Users sign up, practice with AI-generated multiple-choice questions and
//! track their performance per topic. Free accounts get a daily number of
//! questions per exam type; Pro accounts are unlimited.
//!
//! # Example
//!
//! ```no_run
//! use prepforge::api::{ApiServer, AppState};
//! use prepforge::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(None)?;
//!     let state = AppState::build(config).await?;
//!
//!     ApiServer::new(state).run().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`quota`]: per-user, per-exam-type daily question quota
//! - [`questions`]: question generation, answer checking and performance
//! - [`accounts`]: users, plans and subscriptions
//! - [`payments`]: checkout sessions and provider webhooks
//! - [`security`]: sessions, CSRF tokens and rate limiting
//! - [`api`]: HTTP pages, JSON API and server
//! - [`config`]: configuration management
//! - [`error`]: error types and handling

pub mod accounts;
pub mod api;
pub mod config;
pub mod error;
pub mod payments;
pub mod questions;
pub mod quota;
pub mod security;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use error::{PrepError, Result};
