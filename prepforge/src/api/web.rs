use askama_axum::Template;
use axum::{
    extract::{ConnectInfo, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Form,
};
use chrono::Utc;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::accounts::validation::validate_signup;
use crate::accounts::User;
use crate::api::auth::{found, session_user, CurrentUser};
use crate::api::checkout::start_checkout;
use crate::api::state::AppState;
use crate::error::PrepError;
use crate::questions::parse_topic;
use crate::quota::{today, ExamType};
use crate::security::{client_ip, RateLimit};

/// Exam types offered on the practice page
const EXAM_TYPES: &[&str] = &["GRE", "GMAT", "MCAT", "LSAT", "SAT", "ACT"];

/// Answers listed on the dashboard
const RECENT_ANSWERS: i64 = 10;

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    signed_in: bool,
}

#[derive(Template)]
#[template(path = "signup.html")]
struct SignupTemplate {
    csrf_token: String,
    errors: Vec<String>,
    name: String,
    email: String,
}

#[derive(Template)]
#[template(path = "signin.html")]
struct SigninTemplate {
    csrf_token: String,
    error: String,
    message: String,
    email: String,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    name: String,
    plan: String,
    is_pro: bool,
    trial_days: i64,
    daily_limit: u32,
    usage: Vec<UsageRow>,
    performance: Vec<PerformanceRow>,
    recent: Vec<AnswerRow>,
    upgraded: bool,
    csrf_token: String,
}

struct UsageRow {
    exam_type: String,
    used: u32,
    remaining: String,
}

struct PerformanceRow {
    exam_type: String,
    topic: String,
    score: String,
    attempts: i64,
}

struct AnswerRow {
    answered_at: String,
    exam_type: String,
    topic: String,
    user_answer: String,
    correct_answer: String,
    is_correct: bool,
}

#[derive(Template)]
#[template(path = "practice.html")]
struct PracticeTemplate {
    name: String,
    is_pro: bool,
    daily_limit: u32,
    exam_types: Vec<&'static str>,
}

#[derive(Template)]
#[template(path = "quiz.html")]
struct QuizTemplate {
    name: String,
    exam_type: String,
    topic: String,
    is_pro: bool,
}

#[derive(Template)]
#[template(path = "pricing.html")]
struct PricingTemplate {
    name: String,
    is_pro: bool,
    price: String,
    daily_limit: u32,
    payments_enabled: bool,
    csrf_token: String,
}

#[derive(Template)]
#[template(path = "error.html")]
struct ErrorTemplate {
    title: String,
    message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SignupForm {
    name: String,
    email: String,
    password: String,
    confirm_password: String,
    csrf_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SigninForm {
    email: String,
    password: String,
    csrf_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TokenForm {
    csrf_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DashboardQuery {
    upgraded: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct QuizQuery {
    exam_type: Option<String>,
    topic: Option<String>,
}

fn request_ip(
    state: &AppState,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: &HeaderMap,
) -> IpAddr {
    let peer = connect_info.map(|ConnectInfo(addr)| addr.ip());
    client_ip(peer, headers, &state.config.server.trusted_proxies)
}

fn error_page(status: StatusCode, title: &str, message: &str) -> Response {
    (
        status,
        ErrorTemplate {
            title: title.to_string(),
            message: message.to_string(),
        },
    )
        .into_response()
}

fn signin_page(state: &AppState, error: &str, message: &str, email: &str) -> SigninTemplate {
    SigninTemplate {
        csrf_token: state.csrf.generate(),
        error: error.to_string(),
        message: message.to_string(),
        email: email.to_string(),
    }
}

fn is_pro(user: &User) -> bool {
    user.effective_plan(Utc::now()).is_unlimited()
}

// Landing page
pub async fn index(State(state): State<Arc<AppState>>, headers: HeaderMap) -> impl IntoResponse {
    let signed_in = matches!(session_user(&state, &headers).await, Ok(Some(_)));
    IndexTemplate { signed_in }
}

// Signup page (GET)
pub async fn signup_page(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    SignupTemplate {
        csrf_token: state.csrf.generate(),
        errors: Vec::new(),
        name: String::new(),
        email: String::new(),
    }
}

// Signup form submission (POST)
pub async fn signup_submit(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Form(form): Form<SignupForm>,
) -> Response {
    let rerender = |status: StatusCode, errors: Vec<String>| {
        (
            status,
            SignupTemplate {
                csrf_token: state.csrf.generate(),
                errors,
                name: form.name.clone(),
                email: form.email.clone(),
            },
        )
            .into_response()
    };

    let ip = request_ip(&state, connect_info, &headers);
    if !state
        .rate_limiter
        .check_ip_limit(&ip, RateLimit::SignupAttempts)
        .await
    {
        return rerender(
            StatusCode::TOO_MANY_REQUESTS,
            vec!["Too many signup attempts. Please try again later.".to_string()],
        );
    }

    if !state.csrf.check_submitted(form.csrf_token.as_deref()) {
        warn!("Signup rejected: invalid CSRF token from {}", ip);
        return rerender(
            StatusCode::BAD_REQUEST,
            vec!["Your form expired. Please try again.".to_string()],
        );
    }

    if let Err(errors) =
        validate_signup(&form.name, &form.email, &form.password, &form.confirm_password)
    {
        return rerender(StatusCode::OK, errors);
    }

    match state
        .users
        .create_user(&form.name, &form.email, &form.password)
        .await
    {
        Ok(user) => {
            info!("New account created: {}", user.email);
            signin_page(
                &state,
                "",
                "Account created successfully! Please sign in.",
                &user.email,
            )
            .into_response()
        }
        Err(PrepError::Validation(msg)) => rerender(StatusCode::OK, vec![msg]),
        Err(e) => {
            error!("Signup failed: {}", e);
            rerender(
                StatusCode::INTERNAL_SERVER_ERROR,
                vec!["Registration failed. Please try again.".to_string()],
            )
        }
    }
}

// Signin page (GET)
pub async fn signin_page_get(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    signin_page(&state, "", "", "")
}

// Signin form submission (POST)
pub async fn signin_submit(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Form(form): Form<SigninForm>,
) -> Response {
    let ip = request_ip(&state, connect_info, &headers);
    if !state
        .rate_limiter
        .check_ip_limit(&ip, RateLimit::SigninAttempts)
        .await
    {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            signin_page(
                &state,
                "Too many signin attempts. Please try again later.",
                "",
                &form.email,
            ),
        )
            .into_response();
    }

    if !state.csrf.check_submitted(form.csrf_token.as_deref()) {
        warn!("Signin rejected: invalid CSRF token from {}", ip);
        return (
            StatusCode::BAD_REQUEST,
            signin_page(&state, "Your form expired. Please try again.", "", &form.email),
        )
            .into_response();
    }

    let user = match state.users.authenticate(&form.email, &form.password).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return signin_page(&state, "Invalid email or password", "", &form.email)
                .into_response()
        }
        Err(e) => {
            error!("Signin failed: {}", e);
            return signin_page(&state, "Signin failed. Please try again.", "", &form.email)
                .into_response();
        }
    };

    match state.sessions.create_token(&user) {
        Ok(token) => (
            StatusCode::FOUND,
            [
                (header::SET_COOKIE, state.sessions.session_cookie(&token)),
                (header::LOCATION, "/dashboard".to_string()),
            ],
            "Redirecting...",
        )
            .into_response(),
        Err(e) => {
            error!("Failed to issue session for {}: {}", user.email, e);
            error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Signin failed",
                "Could not start a session. Please try again.",
            )
        }
    }
}

// Logout
pub async fn logout(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::FOUND,
        [
            (header::SET_COOKIE, state.sessions.clear_cookie()),
            (header::LOCATION, "/".to_string()),
        ],
        "Redirecting...",
    )
}

// Dashboard page
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<DashboardQuery>,
) -> Response {
    let now = Utc::now();
    let plan = user.effective_plan(now);

    let usage = match state.quota.usage(user.id, plan, today()).await {
        Ok(usage) => usage
            .into_iter()
            .map(|u| UsageRow {
                exam_type: u.exam_type.to_string(),
                used: u.used,
                remaining: u
                    .remaining
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "Unlimited".to_string()),
            })
            .collect(),
        Err(e) => {
            error!("Failed to load quota usage for user {}: {}", user.id, e);
            Vec::new()
        }
    };

    let performance = match state.questions.performance_for(user.id).await {
        Ok(performance) => performance
            .into_iter()
            .map(|p| PerformanceRow {
                exam_type: p.exam_type,
                topic: p.topic,
                score: format!("{:.0}", p.score),
                attempts: p.attempts,
            })
            .collect(),
        Err(e) => {
            error!("Failed to load topic performance for user {}: {}", user.id, e);
            Vec::new()
        }
    };

    let recent = match state.questions.recent_answers(user.id, RECENT_ANSWERS).await {
        Ok(answers) => answers
            .into_iter()
            .map(|a| AnswerRow {
                answered_at: a.answered_at.format("%Y-%m-%d %H:%M").to_string(),
                exam_type: a.exam_type,
                topic: a.topic,
                user_answer: a.user_answer,
                correct_answer: a.correct_answer,
                is_correct: a.is_correct,
            })
            .collect(),
        Err(e) => {
            error!("Failed to load answer history for user {}: {}", user.id, e);
            Vec::new()
        }
    };

    DashboardTemplate {
        name: user.name.clone(),
        plan: user.plan.to_string(),
        is_pro: plan.is_unlimited(),
        trial_days: user.trial_days_remaining(now),
        daily_limit: state.quota.policy().free_daily_limit,
        usage,
        performance,
        recent,
        upgraded: query.upgraded.is_some(),
        csrf_token: state.csrf.generate(),
    }
    .into_response()
}

// Practice page
pub async fn practice(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> impl IntoResponse {
    PracticeTemplate {
        is_pro: is_pro(&user),
        name: user.name,
        daily_limit: state.quota.policy().free_daily_limit,
        exam_types: EXAM_TYPES.to_vec(),
    }
}

// Quiz page
pub async fn quiz(CurrentUser(user): CurrentUser, Query(query): Query<QuizQuery>) -> Response {
    let exam_type = match ExamType::parse(query.exam_type.as_deref()) {
        Ok(exam_type) => exam_type,
        Err(e) => return error_page(StatusCode::BAD_REQUEST, "Invalid exam type", &e.to_string()),
    };
    let topic = match parse_topic(query.topic.as_deref()) {
        Ok(topic) => topic,
        Err(e) => return error_page(StatusCode::BAD_REQUEST, "Invalid topic", &e.to_string()),
    };

    QuizTemplate {
        is_pro: is_pro(&user),
        name: user.name,
        exam_type: exam_type.to_string(),
        topic,
    }
    .into_response()
}

// Pricing page
pub async fn pricing(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> impl IntoResponse {
    let payments = &state.config.payments;
    PricingTemplate {
        is_pro: is_pro(&user),
        name: user.name,
        price: format!(
            "{}.{:02} {}",
            payments.price_cents / 100,
            payments.price_cents % 100,
            payments.currency.to_uppercase()
        ),
        daily_limit: state.quota.policy().free_daily_limit,
        payments_enabled: state.payments.is_configured(),
        csrf_token: state.csrf.generate(),
    }
}

// Start the free trial (POST)
pub async fn start_trial(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    form: Option<Form<TokenForm>>,
) -> Response {
    let token = form.and_then(|Form(f)| f.csrf_token);
    if !state.csrf.check_submitted(token.as_deref()) {
        return error_page(
            StatusCode::BAD_REQUEST,
            "Invalid request",
            "Your form expired. Please try again.",
        );
    }

    if user.trial_ends_at.is_some() {
        info!("User {} already used their trial", user.id);
        return found("/dashboard");
    }

    match state
        .users
        .start_trial(user.id, state.config.auth.trial_days, Utc::now())
        .await
    {
        Ok(_) => found("/dashboard"),
        Err(e) => {
            error!("Failed to start trial for user {}: {}", user.id, e);
            error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Trial unavailable",
                "Could not start your trial. Please try again.",
            )
        }
    }
}

// Checkout form submission (POST)
pub async fn create_checkout_session(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    form: Option<Form<TokenForm>>,
) -> Response {
    let token = form.and_then(|Form(f)| f.csrf_token);
    if !state.csrf.check_submitted(token.as_deref()) {
        return error_page(
            StatusCode::BAD_REQUEST,
            "Invalid request",
            "Your form expired. Please try again.",
        );
    }

    match start_checkout(&state, &user).await {
        Ok(checkout) => (
            StatusCode::SEE_OTHER,
            [(header::LOCATION, checkout.checkout_url)],
            "Redirecting...",
        )
            .into_response(),
        Err(PrepError::PaymentNotConfigured) => {
            warn!("Checkout requested but payments are not configured");
            error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Payments unavailable",
                "Payment system not configured. Please try again later.",
            )
        }
        Err(e) => {
            error!("Checkout failed for user {}: {}", user.id, e);
            error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Checkout failed",
                "Failed to create checkout session. Please try again.",
            )
        }
    }
}
