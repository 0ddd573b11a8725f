//! Shared helpers for in-process HTTP tests

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use prepforge::accounts::User;
use prepforge::api::{ApiServer, AppState};
use prepforge::config::Config;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub struct TestApp {
    pub state: Arc<AppState>,
    router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(Config::development()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let state = AppState::build(config).await.unwrap();
        let router = ApiServer::new(state.clone()).router();
        Self { state, router }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Register a user and return it with a valid session cookie
    pub async fn user(&self, email: &str) -> (User, String) {
        let user = self
            .state
            .users
            .create_user("Test User", email, "password123")
            .await
            .unwrap();
        let token = self.state.sessions.create_token(&user).unwrap();
        let cookie = format!("{}={}", prepforge::security::SESSION_COOKIE, token);
        (user, cookie)
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, uri: &str, cookie: Option<&str>, body: Value) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn post_form(&self, uri: &str, cookie: Option<&str>, form: &str) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(form.to_string())).unwrap())
            .await
    }

    /// Form post relayed by a proxy that reports `client` as the origin
    pub async fn post_form_from(&self, uri: &str, client: &str, form: &str) -> Response<Body> {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header("x-forwarded-for", client)
            .body(Body::from(form.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Request one or more questions
    pub async fn generate(&self, cookie: &str, exam_type: &str, count: u32) -> (StatusCode, Value) {
        let response = self
            .post_json(
                "/api/generate-questions",
                Some(cookie),
                serde_json::json!({ "exam_type": exam_type, "topic": "algebra", "count": count }),
            )
            .await;
        let status = response.status();
        (status, json(response).await)
    }
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn location(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// `name=value` part of the first `Set-Cookie` header
pub fn set_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}
