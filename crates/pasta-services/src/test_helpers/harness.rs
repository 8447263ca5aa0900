use bytes::Bytes;
use pasta_core::models::{ApiKey, Paste};
use pasta_core::{AppError, Clock, Config, ManualClock, ServiceConfig};
use pasta_db::{ApiKeyRepository, MemoryApiKeyRepository};
use pasta_infra::RateLimiter;
use pasta_storage::MemoryStorage;
use std::sync::Arc;

use super::doubles::{
    FailingPasteRepository, FlakyShortlinkRepository, FlakyStorage, RecordingNotifier,
    SequenceIdGenerator, StubFetcher,
};
use crate::api_key::VerificationNotifier;
use crate::app::PastaServices;
use crate::context::{ListLimits, ServiceContext};
use crate::ids::{generate_id, API_KEY_LENGTH};
use crate::ingest::{UploadEnvelope, UploadOptions};

/// Every service wired against in-memory backends and a manual clock.
pub struct TestHarness {
    pub config: Config,
    pub clock: ManualClock,
    /// Backing store behind `storage`; inspect it to check for orphans.
    pub memory: MemoryStorage,
    pub storage: Arc<FlakyStorage>,
    pub pastes: Arc<FailingPasteRepository>,
    pub shortlinks: Arc<FlakyShortlinkRepository>,
    pub api_keys: Arc<MemoryApiKeyRepository>,
    pub fetcher: StubFetcher,
    pub notifier: Arc<RecordingNotifier>,
    pub ids: Arc<SequenceIdGenerator>,
    pub services: PastaServices,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(ServiceConfig::default())
    }

    pub fn with_config(config: ServiceConfig) -> Self {
        let config = Config::new(config);
        let clock = ManualClock::starting_now();
        let memory = MemoryStorage::new();
        let storage = Arc::new(FlakyStorage::new(Arc::new(memory.clone())));
        let pastes = Arc::new(FailingPasteRepository::default());
        let shortlinks = Arc::new(FlakyShortlinkRepository::default());
        let api_keys = Arc::new(MemoryApiKeyRepository::new());
        let fetcher = StubFetcher::default();
        let notifier = Arc::new(RecordingNotifier::default());
        let ids = Arc::new(SequenceIdGenerator::default());

        let rate_limiter = Arc::new(RateLimiter::new(
            "mutations",
            config.rate_limit_per_window(),
            config.rate_limit_window_secs(),
            Arc::new(clock.clone()),
        ));
        let context = ServiceContext {
            pastes: pastes.clone(),
            shortlinks: shortlinks.clone(),
            api_keys: api_keys.clone(),
            storage: storage.clone(),
            ids: ids.clone(),
            clock: Arc::new(clock.clone()),
            rate_limiter,
            list_limits: ListLimits::from_config(&config),
        };
        let services = PastaServices::new(
            &config,
            context,
            Arc::new(fetcher.clone()),
            Some(notifier.clone() as Arc<dyn VerificationNotifier>),
        );

        Self {
            config,
            clock,
            memory,
            storage,
            pastes,
            shortlinks,
            api_keys,
            fetcher,
            notifier,
            ids,
            services,
        }
    }

    /// Insert a verified key directly, bypassing the email flow.
    pub async fn verified_key(&self, email: &str, allow_shortlinks: bool) -> ApiKey {
        let key = ApiKey {
            key: generate_id(API_KEY_LENGTH),
            email: email.to_string(),
            name: email.split('@').next().unwrap_or(email).to_string(),
            verified: true,
            verify_token: None,
            verify_expiry: None,
            allow_shortlinks,
            created_at: self.clock.now(),
        };
        self.api_keys
            .insert(&key)
            .await
            .expect("insert verified key");
        key
    }

    pub fn text(content: &str) -> UploadEnvelope {
        Self::text_with(content, UploadOptions::default())
    }

    pub fn text_with(content: &str, options: UploadOptions) -> UploadEnvelope {
        UploadEnvelope::Raw {
            body: Bytes::copy_from_slice(content.as_bytes()),
            content_type: None,
            options,
        }
    }

    pub async fn upload(
        &self,
        envelope: UploadEnvelope,
        caller: Option<&ApiKey>,
    ) -> Result<Paste, AppError> {
        self.services.upload(envelope, caller.cloned()).await
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
