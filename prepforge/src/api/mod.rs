//! HTTP layer for PrepForge
//!
//! HTML pages, the JSON quiz API and the payment webhook

pub mod auth;
pub mod checkout;
pub mod quiz;
pub mod server;
pub mod state;
pub mod web;

pub use auth::CurrentUser;
pub use server::ApiServer;
pub use state::AppState;
