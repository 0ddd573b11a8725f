//! Checkout sessions through the Stripe REST API
//!
//! Requests are form-encoded, as the API expects, and authenticated with the
//! secret key as a bearer token. Calls are not retried.

use serde::Deserialize;
use std::time::Duration;
use tracing::{error, info};

use crate::accounts::User;
use crate::config::PaymentsConfig;
use crate::error::{PrepError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: ProviderError,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    message: Option<String>,
}

pub struct PaymentClient {
    client: reqwest::Client,
    api_base: String,
    secret_key: Option<String>,
    product_name: String,
    product_description: String,
    price_cents: u32,
    currency: String,
}

impl PaymentClient {
    pub fn new(config: &PaymentsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone().filter(|k| !k.trim().is_empty()),
            product_name: config.product_name.clone(),
            product_description: config.product_description.clone(),
            price_cents: config.price_cents,
            currency: config.currency.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.secret_key.is_some()
    }

    /// Form fields of a monthly subscription checkout for `user`
    fn checkout_form(&self, user: &User, base_url: &str) -> Vec<(String, String)> {
        let base_url = base_url.trim_end_matches('/');
        let user_id = user.id.to_string();

        [
            ("mode", "subscription".to_string()),
            ("payment_method_types[0]", "card".to_string()),
            ("customer_email", user.email.clone()),
            ("client_reference_id", user_id.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            ("line_items[0][price_data][currency]", self.currency.clone()),
            (
                "line_items[0][price_data][unit_amount]",
                self.price_cents.to_string(),
            ),
            (
                "line_items[0][price_data][recurring][interval]",
                "month".to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                self.product_name.clone(),
            ),
            (
                "line_items[0][price_data][product_data][description]",
                self.product_description.clone(),
            ),
            ("metadata[user_id]", user_id),
            ("metadata[email]", user.email.clone()),
            (
                "success_url",
                format!("{}/dashboard?upgraded=1&session_id={{CHECKOUT_SESSION_ID}}", base_url),
            ),
            ("cancel_url", format!("{}/pricing", base_url)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    /// Create a checkout session; `base_url` is where the user returns to
    pub async fn create_checkout_session(&self, user: &User, base_url: &str) -> Result<CheckoutSession> {
        let secret_key = self
            .secret_key
            .as_deref()
            .ok_or(PrepError::PaymentNotConfigured)?;

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(secret_key)
            .form(&self.checkout_form(user, base_url))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ProviderErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error.message)
                .unwrap_or_else(|| status.to_string());
            error!("Checkout session creation failed for user {}: {}", user.id, message);
            return Err(PrepError::Payment(message));
        }

        let session: CheckoutSession = response.json().await?;
        info!("Created checkout session for user {}: {}", user.id, session.id);
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::Plan;
    use axum::{
        extract::State,
        http::{HeaderMap, StatusCode},
        routing::post,
        Form, Json, Router,
    };
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    type Captured = Arc<Mutex<Option<(Option<String>, HashMap<String, String>)>>>;

    fn user() -> User {
        User {
            id: 9,
            name: "Pat".to_string(),
            email: "pat@example.com".to_string(),
            plan: Plan::Free,
            is_admin: false,
            trial_ends_at: None,
            created_at: "2026-01-01 00:00:00".to_string(),
            last_login: None,
        }
    }

    async fn spawn_provider(fail: bool) -> (String, Captured) {
        let captured: Captured = Arc::new(Mutex::new(None));

        async fn handler(
            State((captured, fail)): State<(Captured, bool)>,
            headers: HeaderMap,
            Form(form): Form<HashMap<String, String>>,
        ) -> (StatusCode, Json<serde_json::Value>) {
            let auth = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            *captured.lock().await = Some((auth, form));

            if fail {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({"error": {"message": "Invalid API Key"}})),
                );
            }
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "id": "cs_test_123",
                    "url": "https://checkout.example.com/pay/cs_test_123"
                })),
            )
        }

        let app = Router::new()
            .route("/v1/checkout/sessions", post(handler))
            .with_state((captured.clone(), fail));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}", addr), captured)
    }

    fn client(api_base: String, key: Option<&str>) -> PaymentClient {
        PaymentClient::new(&PaymentsConfig {
            api_base,
            secret_key: key.map(str::to_string),
            ..PaymentsConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_unconfigured_client() {
        let client = client("http://127.0.0.1:9".to_string(), None);
        assert!(!client.is_configured());

        let result = client.create_checkout_session(&user(), "http://localhost:5000").await;
        assert!(matches!(result, Err(PrepError::PaymentNotConfigured)));
    }

    #[tokio::test]
    async fn test_create_checkout_session() {
        let (base, captured) = spawn_provider(false).await;
        let client = client(base, Some("sk_test_abc"));

        let session = client
            .create_checkout_session(&user(), "http://localhost:5000/")
            .await
            .unwrap();
        assert_eq!(session.id, "cs_test_123");
        assert!(session.url.unwrap().contains("cs_test_123"));

        let (auth, form) = captured.lock().await.take().unwrap();
        assert_eq!(auth.as_deref(), Some("Bearer sk_test_abc"));
        assert_eq!(form["mode"], "subscription");
        assert_eq!(form["client_reference_id"], "9");
        assert_eq!(form["line_items[0][price_data][unit_amount]"], "1500");
        assert_eq!(form["line_items[0][price_data][recurring][interval]"], "month");
        assert_eq!(
            form["line_items[0][price_data][product_data][name]"],
            "PrepForge Pro Subscription"
        );
        assert_eq!(form["metadata[email]"], "pat@example.com");
        assert_eq!(form["cancel_url"], "http://localhost:5000/pricing");
    }

    #[tokio::test]
    async fn test_provider_error_is_reported() {
        let (base, _) = spawn_provider(true).await;
        let client = client(base, Some("sk_test_bad"));

        match client.create_checkout_session(&user(), "http://localhost:5000").await {
            Err(PrepError::Payment(message)) => assert_eq!(message, "Invalid API Key"),
            other => panic!("unexpected result: {:?}", other.map(|s| s.id)),
        }
    }
}
