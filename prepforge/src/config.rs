use crate::error::{PrepError, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "prepforge.toml";

const DEVELOPMENT_SECRET: &str = "development-session-secret-0123456789";

/// Secrets that appear in this source tree and must never sign real sessions
const KNOWN_SECRETS: &[&str] = &["change-me-in-production"];

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub quota: QuotaConfig,
    pub generator: GeneratorConfig,
    pub payments: PaymentsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Externally visible base URL, used for checkout return links
    pub public_url: String,
    /// Reverse proxies whose `X-Forwarded-For` / `Forwarded` headers name
    /// the real client address
    pub trusted_proxies: Vec<IpAddr>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Signs session tokens and CSRF tokens; no usable default
    pub session_secret: String,
    pub session_ttl_hours: u64,
    /// Reject form posts that carry no CSRF token
    pub require_csrf: bool,
    /// Mark the session cookie `Secure`
    pub secure_cookies: bool,
    pub trial_days: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Questions per exam type per UTC day for free users
    pub free_daily_limit: u32,
    pub max_questions_per_request: u32,
    pub backend: QuotaBackend,
    pub prune_interval_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorProvider {
    Xai,
    Fallback,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub provider: GeneratorProvider,
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PaymentsConfig {
    pub api_base: String,
    pub secret_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub product_name: String,
    pub product_description: String,
    pub price_cents: u32,
    pub currency: String,
    pub webhook_tolerance_secs: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Output format of the `fmt` subscriber layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human readable output
    Pretty,
    /// One line per event
    Compact,
    Json,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:5000".to_string(),
            public_url: "http://localhost:5000".to_string(),
            trusted_proxies: Vec::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://prepforge.db".to_string(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_secret: String::new(),
            session_ttl_hours: 24 * 30,
            require_csrf: false,
            secure_cookies: false,
            trial_days: 7,
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            free_daily_limit: 20,
            max_questions_per_request: 5,
            backend: QuotaBackend::Sqlite,
            prune_interval_secs: 3600,
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            provider: GeneratorProvider::Xai,
            api_base: "https://api.x.ai/v1".to_string(),
            api_key: None,
            model: "grok-2-1212".to_string(),
            temperature: 0.8,
            max_tokens: 4000,
            max_retries: 3,
            timeout_secs: 60,
        }
    }
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.stripe.com".to_string(),
            secret_key: None,
            webhook_secret: None,
            product_name: "PrepForge Pro Subscription".to_string(),
            product_description: "Unlimited access to all practice questions".to_string(),
            price_cents: 1500,
            currency: "usd".to_string(),
            webhook_tolerance_secs: 300,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Load a TOML file without environment overrides
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PrepError::Config(e.to_string()))?;

        toml::from_str(&content).map_err(|e| PrepError::Config(e.to_string()))
    }

    /// Layered load: optional TOML file, then `PREPFORGE__SECTION__KEY`
    /// environment variables, then the provider-specific variable names
    /// (`STRIPE_SECRET_KEY`, `STRIPE_WEBHOOK_SECRET`, `XAI_API_KEY`).
    ///
    /// An explicitly given path must exist; the default path is optional.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let file = path.unwrap_or(DEFAULT_CONFIG_PATH);

        let settings = config::Config::builder()
            .add_source(
                config::File::new(file, config::FileFormat::Toml).required(path.is_some()),
            )
            .add_source(
                config::Environment::with_prefix("PREPFORGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| PrepError::Config(e.to_string()))?;

        let mut config: Config = settings
            .try_deserialize()
            .map_err(|e| PrepError::Config(e.to_string()))?;

        config.apply_provider_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn apply_provider_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if self.payments.secret_key.is_none() {
            self.payments.secret_key = non_empty("STRIPE_SECRET_KEY");
        }
        if self.payments.webhook_secret.is_none() {
            self.payments.webhook_secret = non_empty("STRIPE_WEBHOOK_SECRET");
        }
        if self.generator.api_key.is_none() {
            self.generator.api_key = non_empty("XAI_API_KEY");
        }
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.quota.free_daily_limit == 0 {
            return Err(PrepError::Config(
                "quota.free_daily_limit must be at least 1".to_string(),
            ));
        }
        if self.quota.max_questions_per_request == 0 {
            return Err(PrepError::Config(
                "quota.max_questions_per_request must be at least 1".to_string(),
            ));
        }
        if self.auth.session_secret.is_empty() {
            return Err(PrepError::Config(
                "auth.session_secret is not set (PREPFORGE__AUTH__SESSION_SECRET)".to_string(),
            ));
        }
        if self.auth.session_secret.len() < 16 {
            return Err(PrepError::Config(
                "auth.session_secret must be at least 16 bytes".to_string(),
            ));
        }
        if KNOWN_SECRETS.contains(&self.auth.session_secret.as_str()) {
            return Err(PrepError::Config(
                "auth.session_secret is a published example value".to_string(),
            ));
        }
        if self.auth.session_ttl_hours == 0 {
            return Err(PrepError::Config(
                "auth.session_ttl_hours must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Configuration for tests and local development: in-memory database,
    /// template question generator, no payment credentials.
    ///
    /// This is the only configuration with a fixed session secret.
    pub fn development() -> Self {
        let mut config = Self::default();
        config.storage.database_url = "sqlite::memory:".to_string();
        config.generator.provider = GeneratorProvider::Fallback;
        config.auth.session_secret = DEVELOPMENT_SECRET.to_string();
        config
    }
}
