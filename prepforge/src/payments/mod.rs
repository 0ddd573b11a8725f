//! Pro subscriptions: checkout sessions and provider webhooks

pub mod client;
pub mod webhook;

pub use client::{CheckoutSession, PaymentClient};
pub use webhook::{sign_payload, verify_signature, WebhookHandler, WebhookOutcome, SIGNATURE_HEADER};
