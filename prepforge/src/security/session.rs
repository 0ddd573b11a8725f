//! JWT sessions carried in an HttpOnly cookie

use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::accounts::User;
use crate::config::AuthConfig;
use crate::error::{PrepError, Result};

pub const SESSION_COOKIE: &str = "prepforge_session";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id
    pub sub: String,
    pub email: String,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at (Unix timestamp)
    pub iat: u64,
}

impl SessionClaims {
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }
}

pub struct SessionConfig {
    secret: String,
    expiration: Duration,
    secure_cookies: bool,
}

impl SessionConfig {
    pub fn new(secret: String, expiration_hours: u64, secure_cookies: bool) -> Self {
        Self {
            secret,
            expiration: Duration::from_secs(expiration_hours * 3600),
            secure_cookies,
        }
    }

    pub fn from_config(auth: &AuthConfig) -> Self {
        Self::new(
            auth.session_secret.clone(),
            auth.session_ttl_hours,
            auth.secure_cookies,
        )
    }

    pub fn create_token(&self, user: &User) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| PrepError::Config(format!("System clock before epoch: {}", e)))?
            .as_secs();

        let claims = SessionClaims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            exp: now + self.expiration.as_secs(),
            iat: now,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| PrepError::Config(format!("Failed to sign session: {}", e)))
    }

    pub fn validate_token(&self, token: &str) -> Result<SessionClaims> {
        let token_data = decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| PrepError::Unauthorized(format!("Invalid session: {}", e)))?;

        Ok(token_data.claims)
    }

    /// `Set-Cookie` value establishing a session
    pub fn session_cookie(&self, token: &str) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            SESSION_COOKIE,
            token,
            self.expiration.as_secs()
        );
        if self.secure_cookies {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// `Set-Cookie` value removing the session
    pub fn clear_cookie(&self) -> String {
        format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
    }

    /// Claims of the session cookie in `headers`, if present and valid
    pub fn claims_from_headers(&self, headers: &HeaderMap) -> Option<SessionClaims> {
        let token = session_token(headers)?;
        self.validate_token(&token).ok()
    }
}

/// Raw session token from the `Cookie` header
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let prefix = format!("{}=", SESSION_COOKIE);

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .map(str::trim)
        .find_map(|cookie| cookie.strip_prefix(prefix.as_str()))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}
