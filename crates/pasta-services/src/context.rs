//! Shared collaborators for the lifecycle services.

use pasta_core::{AppError, Clock, Config};
use pasta_db::{ApiKeyRepository, PasteRepository, ShortlinkRepository};
use pasta_infra::{RateLimitSubject, RateLimiter};
use pasta_storage::Storage;
use std::sync::Arc;

use crate::ids::IdGenerator;

/// Attempts at drawing an unused short id before giving up with `Conflict`.
pub const MAX_ID_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListLimits {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl ListLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_limit: config.list_default_limit(),
            max_limit: config.list_max_limit(),
        }
    }
}

/// Repositories, storage and infrastructure handles shared by every service.
#[derive(Clone)]
pub struct ServiceContext {
    pub pastes: Arc<dyn PasteRepository>,
    pub shortlinks: Arc<dyn ShortlinkRepository>,
    pub api_keys: Arc<dyn ApiKeyRepository>,
    pub storage: Arc<dyn Storage>,
    pub ids: Arc<dyn IdGenerator>,
    pub clock: Arc<dyn Clock>,
    /// Key-scoped limiter for authenticated mutating calls.
    pub rate_limiter: Arc<RateLimiter>,
    pub list_limits: ListLimits,
}

impl ServiceContext {
    /// Pastes and shortlinks share one id namespace.
    pub(crate) async fn is_id_taken(&self, id: &str) -> Result<bool, AppError> {
        Ok(self.pastes.exists(id).await? || self.shortlinks.exists(id).await?)
    }

    pub(crate) async fn check_rate_limit(&self, key: &str) -> Result<(), AppError> {
        self.rate_limiter
            .allow(&RateLimitSubject::ApiKey(key.to_string()))
            .await
            .map(|_| ())
    }
}
