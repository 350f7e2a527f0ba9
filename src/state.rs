use axum::extract::FromRef;
use sqlx::PgPool;
use std::sync::Arc;

use crate::auth::{AuthProvider, JwtAuthProvider};
use crate::config::AppConfig;
use crate::services::{
    CloudinaryStore, HttpMailNotifier, LogNotifier, MediaStore, MemoryCache, MemoryMediaStore, MpesaGateway, Notifier,
    PaymentGateway, PermissionCache, RedisCache,
};

/// Shared application state: the pool, configuration and injected collaborators.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub auth: Arc<dyn AuthProvider>,
    pub notifier: Arc<dyn Notifier>,
    pub media: Arc<dyn MediaStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub cache: Arc<dyn PermissionCache>,
}

impl AppState {
    /// Builds the production collaborators from configuration.
    pub fn from_config(pool: PgPool, config: AppConfig) -> anyhow::Result<Self> {
        let notifier: Arc<dyn Notifier> = if config.mail.providers.is_empty() {
            tracing::warn!("No mail provider configured; emails will only be logged");
            Arc::new(LogNotifier::new())
        } else {
            Arc::new(HttpMailNotifier::new(config.mail.providers.clone()))
        };

        let media: Arc<dyn MediaStore> = if config.media.cloud_name.is_empty() {
            tracing::warn!("No media account configured; uploads are kept in memory");
            Arc::new(MemoryMediaStore::new())
        } else {
            Arc::new(CloudinaryStore::new(config.media.clone()))
        };

        let cache: Arc<dyn PermissionCache> = match &config.cache.redis_url {
            Some(url) => Arc::new(RedisCache::open(url)?),
            None => Arc::new(MemoryCache::new()),
        };

        Ok(Self {
            pool,
            auth: Arc::new(JwtAuthProvider::new(config.security.clone())),
            notifier,
            media,
            gateway: Arc::new(MpesaGateway::new(config.mpesa.clone())?),
            cache,
            config: Arc::new(config),
        })
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
