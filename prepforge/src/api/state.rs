//! Shared application state

use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};

use crate::accounts::UserStore;
use crate::config::{Config, GeneratorProvider, QuotaBackend};
use crate::error::Result;
use crate::payments::{PaymentClient, WebhookHandler};
use crate::questions::{
    FallbackGenerator, PerformanceStore, ProgressStore, QuestionGenerator, QuestionService,
    QuestionStore, XaiGenerator,
};
use crate::quota::{MemoryQuotaStore, QuotaManager, QuotaPolicy, QuotaStore, SqliteQuotaStore};
use crate::security::{CsrfConfig, RateLimiter, SessionConfig};
use crate::storage;

pub struct AppState {
    pub config: Config,
    pub db: SqlitePool,
    pub users: UserStore,
    pub quota: QuotaManager,
    pub questions: QuestionService,
    pub payments: PaymentClient,
    pub webhooks: WebhookHandler,
    pub rate_limiter: RateLimiter,
    pub sessions: SessionConfig,
    pub csrf: CsrfConfig,
}

impl AppState {
    /// Open the database and wire every service from `config`
    pub async fn build(config: Config) -> Result<Arc<Self>> {
        config.validate()?;
        let db = storage::connect(&config.storage.database_url).await?;
        Self::with_pool(config, db)
    }

    pub fn with_pool(config: Config, db: SqlitePool) -> Result<Arc<Self>> {
        Self::with_generator(config.clone(), db, primary_generator(&config)?)
    }

    /// Same as [`AppState::with_pool`] with an explicit question generator
    pub fn with_generator(
        config: Config,
        db: SqlitePool,
        generator: Arc<dyn QuestionGenerator>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let users = UserStore::new(db.clone());

        let quota_store: Arc<dyn QuotaStore> = match config.quota.backend {
            QuotaBackend::Sqlite => Arc::new(SqliteQuotaStore::new(db.clone())),
            QuotaBackend::Memory => Arc::new(MemoryQuotaStore::new()),
        };
        let quota = QuotaManager::new(quota_store, QuotaPolicy::from(&config.quota));

        let questions = QuestionService::new(
            generator,
            QuestionStore::new(db.clone()),
            PerformanceStore::new(db.clone()),
            ProgressStore::new(db.clone()),
        )?;

        let payments = PaymentClient::new(&config.payments)?;
        if !payments.is_configured() {
            warn!("No payment secret key configured; checkout is disabled");
        }
        let webhooks = WebhookHandler::new(
            users.clone(),
            config.payments.webhook_secret.clone(),
            config.payments.webhook_tolerance_secs,
        );

        let sessions = SessionConfig::from_config(&config.auth);
        let csrf = CsrfConfig::new(config.auth.session_secret.as_bytes(), config.auth.require_csrf);

        info!(
            "Application state ready (quota backend: {:?}, generator: {}, free limit: {})",
            config.quota.backend,
            questions.generator_name(),
            config.quota.free_daily_limit
        );

        Ok(Arc::new(Self {
            config,
            db,
            users,
            quota,
            questions,
            payments,
            webhooks,
            rate_limiter: RateLimiter::new(),
            sessions,
            csrf,
        }))
    }
}

fn primary_generator(config: &Config) -> Result<Arc<dyn QuestionGenerator>> {
    match config.generator.provider {
        GeneratorProvider::Xai if config.generator.api_key.is_some() => {
            Ok(Arc::new(XaiGenerator::new(&config.generator)?))
        }
        GeneratorProvider::Xai => {
            warn!("No xAI API key configured; serving fallback questions only");
            Ok(Arc::new(FallbackGenerator::new()))
        }
        GeneratorProvider::Fallback => Ok(Arc::new(FallbackGenerator::new())),
    }
}
