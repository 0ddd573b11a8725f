//! Payment provider webhooks
//!
//! The `Stripe-Signature` header has the form `t=<unix>,v1=<hex>[,v1=<hex>]`.
//! Each `v1` value is HMAC-SHA256(secret, "<t>.<payload>"); the event is
//! accepted when any of them matches and `t` is within the tolerance.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use tracing::{error, info, warn};

use crate::accounts::{Plan, UserStore};
use crate::error::{PrepError, Result};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: Value,
}

/// What a processed event changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Upgraded { user_id: i64 },
    SubscriptionUpdated { user_id: i64, active: bool },
    SubscriptionCancelled { user_id: i64 },
    Ignored(String),
}

fn mac(secret: &str) -> HmacSha256 {
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size")
}

/// Build a signature header for `payload` (used by tests and tooling)
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = mac(secret);
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

/// Check a signature header against `payload`
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<()> {
    let mut timestamp: Option<i64> = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| PrepError::Webhook("Signature header has no timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(PrepError::Webhook("Signature header has no v1 signature".to_string()));
    }
    if (now - timestamp).abs() > tolerance_secs {
        return Err(PrepError::Webhook("Signature timestamp outside tolerance".to_string()));
    }

    let matched = signatures.iter().any(|signature| {
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        let mut mac = mac(secret);
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    });

    if matched {
        Ok(())
    } else {
        Err(PrepError::Webhook("No matching signature".to_string()))
    }
}

pub struct WebhookHandler {
    users: UserStore,
    secret: Option<String>,
    tolerance_secs: i64,
}

impl WebhookHandler {
    pub fn new(users: UserStore, secret: Option<String>, tolerance_secs: i64) -> Self {
        Self {
            users,
            secret: secret.filter(|s| !s.trim().is_empty()),
            tolerance_secs,
        }
    }

    /// Verify (when a secret is configured) and decode an event
    pub fn parse_event(&self, payload: &[u8], signature: Option<&str>) -> Result<WebhookEvent> {
        match &self.secret {
            Some(secret) => {
                let header = signature
                    .ok_or_else(|| PrepError::Webhook("Missing signature header".to_string()))?;
                verify_signature(
                    payload,
                    header,
                    secret,
                    self.tolerance_secs,
                    chrono::Utc::now().timestamp(),
                )?;
            }
            None => warn!("Webhook secret not configured, accepting unverified payload"),
        }

        let event: WebhookEvent = serde_json::from_slice(payload)
            .map_err(|e| PrepError::Webhook(format!("Invalid payload: {}", e)))?;
        info!("Webhook received: {}", event.kind);
        Ok(event)
    }

    pub async fn handle(&self, event: &WebhookEvent) -> Result<WebhookOutcome> {
        let object = &event.data.object;

        match event.kind.as_str() {
            "checkout.session.completed" => self.checkout_completed(object).await,
            "customer.subscription.updated" => {
                let status = object.get("status").and_then(Value::as_str).unwrap_or("");
                let active = matches!(status, "active" | "trialing");
                self.subscription_changed(object, active, status).await
            }
            "customer.subscription.deleted" => {
                self.subscription_changed(object, false, "deleted").await
            }
            other => Ok(WebhookOutcome::Ignored(format!("Unhandled event type {}", other))),
        }
    }

    async fn checkout_completed(&self, session: &Value) -> Result<WebhookOutcome> {
        let user_id = session
            .get("client_reference_id")
            .and_then(Value::as_str)
            .or_else(|| session.pointer("/metadata/user_id").and_then(Value::as_str))
            .and_then(|id| id.trim().parse::<i64>().ok());

        let Some(user_id) = user_id else {
            warn!("checkout.session.completed event missing client_reference_id");
            return Ok(WebhookOutcome::Ignored("missing client_reference_id".to_string()));
        };

        if self.users.find_by_id(user_id).await?.is_none() {
            error!("User {} not found for checkout.session.completed event", user_id);
            return Ok(WebhookOutcome::Ignored(format!("unknown user {}", user_id)));
        }

        let customer_id = session.get("customer").and_then(Value::as_str);
        self.users.set_plan(user_id, Plan::Pro).await?;
        self.users.upsert_subscription(user_id, customer_id, true).await?;

        info!("User {} upgraded to pro", user_id);
        Ok(WebhookOutcome::Upgraded { user_id })
    }

    async fn subscription_changed(
        &self,
        subscription: &Value,
        active: bool,
        status: &str,
    ) -> Result<WebhookOutcome> {
        let Some(customer_id) = subscription.get("customer").and_then(Value::as_str) else {
            warn!("Subscription event without a customer id");
            return Ok(WebhookOutcome::Ignored("missing customer".to_string()));
        };

        let Some(user_id) = self
            .users
            .set_subscription_active_by_customer(customer_id, active)
            .await?
        else {
            warn!("No subscription found for customer {}", customer_id);
            return Ok(WebhookOutcome::Ignored(format!("unknown customer {}", customer_id)));
        };

        let plan = if active { Plan::Pro } else { Plan::Free };
        self.users.set_plan(user_id, plan).await?;
        info!(
            "Subscription for customer {} is now {} (user {} on {})",
            customer_id, status, user_id, plan
        );

        if status == "deleted" {
            Ok(WebhookOutcome::SubscriptionCancelled { user_id })
        } else {
            Ok(WebhookOutcome::SubscriptionUpdated { user_id, active })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage;
    use serde_json::json;

    const SECRET: &str = "whsec_test";

    #[test]
    fn test_signature_round_trip() {
        let payload = br#"{"type":"ping","data":{"object":{}}}"#;
        let header = sign_payload(payload, SECRET, 1_000);

        assert!(verify_signature(payload, &header, SECRET, 300, 1_100).is_ok());
        // Wrong secret, tampered payload, stale timestamp
        assert!(verify_signature(payload, &header, "other", 300, 1_100).is_err());
        assert!(verify_signature(b"{}", &header, SECRET, 300, 1_100).is_err());
        assert!(verify_signature(payload, &header, SECRET, 300, 2_000).is_err());
    }

    #[test]
    fn test_signature_header_parsing() {
        let payload = b"{}";
        let good = sign_payload(payload, SECRET, 50);
        let v1 = good.split_once(",v1=").unwrap().1;

        // Any matching v1 entry is enough
        let rotated = format!("t=50,v1=deadbeef,v1={}", v1);
        assert!(verify_signature(payload, &rotated, SECRET, 300, 60).is_ok());

        assert!(verify_signature(payload, "v1=abcd", SECRET, 300, 60).is_err());
        assert!(verify_signature(payload, "t=50", SECRET, 300, 60).is_err());
        assert!(verify_signature(payload, "garbage", SECRET, 300, 60).is_err());
    }

    async fn handler(secret: Option<&str>) -> (WebhookHandler, UserStore, i64) {
        let pool = storage::connect("sqlite::memory:").await.unwrap();
        let users = UserStore::new(pool);
        let user = users
            .create_user("Webhook User", "hook@example.com", "password123")
            .await
            .unwrap();
        (
            WebhookHandler::new(users.clone(), secret.map(str::to_string), 300),
            users,
            user.id,
        )
    }

    fn event(kind: &str, object: Value) -> WebhookEvent {
        WebhookEvent {
            id: Some("evt_1".to_string()),
            kind: kind.to_string(),
            data: EventData { object },
        }
    }

    #[tokio::test]
    async fn test_checkout_completed_upgrades_user() {
        let (handler, users, user_id) = handler(None).await;

        let outcome = handler
            .handle(&event(
                "checkout.session.completed",
                json!({"client_reference_id": user_id.to_string(), "customer": "cus_1"}),
            ))
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Upgraded { user_id });

        let user = users.find_by_id(user_id).await.unwrap().unwrap();
        assert_eq!(user.plan, Plan::Pro);
        let sub = users.subscription(user_id).await.unwrap().unwrap();
        assert!(sub.active);
        assert_eq!(sub.customer_id.as_deref(), Some("cus_1"));
    }

    #[tokio::test]
    async fn test_subscription_lifecycle() {
        let (handler, users, user_id) = handler(None).await;
        handler
            .handle(&event(
                "checkout.session.completed",
                json!({"client_reference_id": user_id.to_string(), "customer": "cus_2"}),
            ))
            .await
            .unwrap();

        let outcome = handler
            .handle(&event(
                "customer.subscription.updated",
                json!({"customer": "cus_2", "status": "past_due"}),
            ))
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::SubscriptionUpdated { user_id, active: false });
        assert_eq!(users.find_by_id(user_id).await.unwrap().unwrap().plan, Plan::Free);

        handler
            .handle(&event(
                "customer.subscription.updated",
                json!({"customer": "cus_2", "status": "trialing"}),
            ))
            .await
            .unwrap();
        assert_eq!(users.find_by_id(user_id).await.unwrap().unwrap().plan, Plan::Pro);

        let outcome = handler
            .handle(&event("customer.subscription.deleted", json!({"customer": "cus_2"})))
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::SubscriptionCancelled { user_id });
        assert_eq!(users.find_by_id(user_id).await.unwrap().unwrap().plan, Plan::Free);
        assert!(!users.subscription(user_id).await.unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn test_ignored_events() {
        let (handler, _, _) = handler(None).await;

        for (kind, object) in [
            ("invoice.paid", json!({})),
            ("checkout.session.completed", json!({"customer": "cus_3"})),
            ("checkout.session.completed", json!({"client_reference_id": "999"})),
            ("customer.subscription.deleted", json!({"customer": "cus_unknown"})),
        ] {
            let outcome = handler.handle(&event(kind, object)).await.unwrap();
            assert!(matches!(outcome, WebhookOutcome::Ignored(_)), "{}", kind);
        }
    }

    #[tokio::test]
    async fn test_parse_event_requires_valid_signature() {
        let (handler, _, _) = handler(Some(SECRET)).await;
        let payload = br#"{"id":"evt_9","type":"invoice.paid","data":{"object":{}}}"#;

        assert!(handler.parse_event(payload, None).is_err());
        assert!(handler.parse_event(payload, Some("t=1,v1=00")).is_err());

        let header = sign_payload(payload, SECRET, chrono::Utc::now().timestamp());
        let event = handler.parse_event(payload, Some(&header)).unwrap();
        assert_eq!(event.kind, "invoice.paid");
    }

    #[tokio::test]
    async fn test_parse_event_without_secret() {
        let (handler, _, _) = handler(None).await;
        assert!(handler
            .parse_event(br#"{"type":"ping","data":{"object":{}}}"#, None)
            .is_ok());
        assert!(matches!(
            handler.parse_event(b"not json", None),
            Err(PrepError::Webhook(_))
        ));
    }
}
