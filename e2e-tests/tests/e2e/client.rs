#![allow(dead_code)]

use reqwest::redirect::Policy;
use reqwest::StatusCode;
use serde_json::{json, Value};

/// Browser-like client: keeps the session cookie, does not follow redirects
pub struct PrepForgeClient {
    client: reqwest::Client,
    base_url: String,
}

impl PrepForgeClient {
    pub fn new(base_url: &str) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(Policy::none())
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn signup(&self, name: &str, email: &str, password: &str) -> Result<StatusCode, String> {
        let response = self
            .client
            .post(self.url("/signup"))
            .form(&[
                ("name", name),
                ("email", email),
                ("password", password),
                ("confirm_password", password),
            ])
            .send()
            .await
            .map_err(|e| format!("Signup request failed: {}", e))?;
        Ok(response.status())
    }

    /// Sign in; returns the redirect target on success
    pub async fn signin(&self, email: &str, password: &str) -> Result<String, String> {
        let response = self
            .client
            .post(self.url("/signin"))
            .form(&[("email", email), ("password", password)])
            .send()
            .await
            .map_err(|e| format!("Signin request failed: {}", e))?;

        if response.status() != StatusCode::FOUND {
            return Err(format!("Signin returned {}", response.status()));
        }

        response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| "Signin redirect has no location".to_string())
    }

    pub async fn get(&self, path: &str) -> Result<StatusCode, String> {
        self.client
            .get(self.url(path))
            .send()
            .await
            .map(|r| r.status())
            .map_err(|e| format!("GET {} failed: {}", path, e))
    }

    async fn post_json(&self, path: &str, body: Value) -> Result<(StatusCode, Value), String> {
        let response = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("POST {} failed: {}", path, e))?;

        let status = response.status();
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| format!("Invalid JSON from {}: {}", path, e))?;
        Ok((status, body))
    }

    pub async fn generate_questions(
        &self,
        exam_type: &str,
        topic: &str,
        count: u32,
    ) -> Result<(StatusCode, Value), String> {
        self.post_json(
            "/api/generate-questions",
            json!({ "exam_type": exam_type, "topic": topic, "count": count }),
        )
        .await
    }

    pub async fn submit_answer(
        &self,
        question: &Value,
        answer: &str,
        exam_type: &str,
    ) -> Result<(StatusCode, Value), String> {
        self.post_json(
            "/api/submit-answer",
            json!({
                "question_id": question["id"],
                "answer": answer,
                "exam_type": exam_type,
                "question_data": question,
            }),
        )
        .await
    }

    pub async fn create_checkout_session(&self) -> Result<(StatusCode, Value), String> {
        self.post_json("/api/create-checkout-session", json!({})).await
    }

    pub async fn quota(&self) -> Result<Value, String> {
        self.client
            .get(self.url("/api/quota"))
            .send()
            .await
            .map_err(|e| format!("Quota request failed: {}", e))?
            .json::<Value>()
            .await
            .map_err(|e| format!("Invalid quota JSON: {}", e))
    }

    /// Deliver an unsigned webhook event (servers without a webhook secret accept it)
    pub async fn send_webhook(&self, event: Value) -> Result<StatusCode, String> {
        self.client
            .post(self.url("/webhook"))
            .json(&event)
            .send()
            .await
            .map(|r| r.status())
            .map_err(|e| format!("Webhook request failed: {}", e))
    }
}

/// Register a fresh account and sign it in
pub async fn signed_in_client(
    env: &super::helpers::TestEnv,
    prefix: &str,
) -> Result<(PrepForgeClient, String), String> {
    let client = PrepForgeClient::new(&env.base_url)?;
    let email = env.unique_email(prefix);

    let status = client
        .signup("E2E Student", &email, &env.test_user_password)
        .await?;
    if !status.is_success() {
        return Err(format!("Signup returned {}", status));
    }

    client.signin(&email, &env.test_user_password).await?;
    Ok((client, email))
}
