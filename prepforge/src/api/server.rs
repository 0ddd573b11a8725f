//! HTTP server: routes, layers and background maintenance

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::api::auth::{require_api_session, require_page_session};
use crate::api::state::AppState;
use crate::api::{checkout, quiz, web};
use crate::quota::today;
use crate::storage;

/// Issued questions are kept this long for answer checking
const QUESTION_RETENTION_DAYS: i64 = 30;

pub struct ApiServer {
    state: Arc<AppState>,
    addr: String,
}

impl ApiServer {
    pub fn new(state: Arc<AppState>) -> Self {
        let addr = state.config.server.listen_addr.clone();
        Self { state, addr }
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Build the router with all routes
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        // Public pages and provider callbacks
        let public_routes = Router::new()
            .route("/", get(web::index))
            .route("/health", get(health))
            .route("/signup", get(web::signup_page).post(web::signup_submit))
            .route("/signin", get(web::signin_page_get).post(web::signin_submit))
            .route("/logout", get(web::logout))
            .route("/webhook", post(checkout::webhook));

        // Pages that need a session (redirect to /signin otherwise)
        let page_routes = Router::new()
            .route("/dashboard", get(web::dashboard))
            .route("/practice", get(web::practice))
            .route("/quiz", get(web::quiz))
            .route("/pricing", get(web::pricing))
            .route("/start-trial", post(web::start_trial))
            .route(
                "/create-checkout-session",
                post(web::create_checkout_session),
            )
            .route_layer(middleware::from_fn_with_state(
                self.state.clone(),
                require_page_session,
            ));

        // JSON API (401 otherwise)
        let api_routes = Router::new()
            .route("/generate-questions", post(quiz::generate_questions))
            .route("/submit-answer", post(quiz::submit_answer))
            .route("/quota", get(quiz::quota_status))
            .route(
                "/create-checkout-session",
                post(checkout::create_checkout_session),
            )
            .route_layer(middleware::from_fn_with_state(
                self.state.clone(),
                require_api_session,
            ));

        Router::new()
            .merge(public_routes)
            .merge(page_routes)
            .nest("/api", api_routes)
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .with_state(self.state.clone())
    }

    /// Spawn periodic quota pruning and rate limiter cleanup
    pub fn spawn_maintenance(&self) {
        let state = self.state.clone();
        let interval = Duration::from_secs(state.config.quota.prune_interval_secs.max(60));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;

                if let Err(e) = state.quota.prune_before(today()).await {
                    error!("Quota pruning failed: {}", e);
                }
                if let Err(e) = state.questions.prune_older_than(QUESTION_RETENTION_DAYS).await {
                    error!("Question pruning failed: {}", e);
                }
                state.rate_limiter.cleanup().await;
            }
        });
    }

    /// Start the HTTP server
    pub async fn run(&self) -> std::io::Result<()> {
        let router = self.router();
        self.spawn_maintenance();

        info!("Starting PrepForge on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;

        Ok(())
    }
}

/// GET /health
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match storage::health_check(&state.db).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "database": "ok",
                "generator": state.questions.generator_name(),
                "payments": state.payments.is_configured(),
                "version": env!("CARGO_PKG_VERSION"),
            })),
        ),
        Err(e) => {
            error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "database": "unavailable" })),
            )
        }
    }
}
