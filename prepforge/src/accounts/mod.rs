/// User accounts
///
/// - [`store`]: SQLite-backed users and subscriptions
/// - [`types`]: user and plan types
/// - [`validation`]: signup input checks

pub mod store;
pub mod types;
pub mod validation;

pub use store::{Subscription, UserStore};
pub use types::{Plan, User};
