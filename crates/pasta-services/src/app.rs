//! Wiring of the lifecycle services into one facade.

use pasta_core::models::{ApiKey, Paste};
use pasta_core::{AppError, Config};
use pasta_infra::RateLimiter;
use std::sync::Arc;
use std::time::Duration;

use crate::api_key::{ApiKeyService, VerificationNotifier};
use crate::cleanup::CleanupService;
use crate::context::ServiceContext;
use crate::ingest::{ContentFetcher, IngestNormalizer, UploadEnvelope};
use crate::paste::{require_usable, PasteService};
use crate::resolver::Resolver;
use crate::retention::RetentionPolicy;
use crate::shortlink::ShortlinkService;
use crate::stats::StatsService;

pub struct PastaServices {
    pub context: ServiceContext,
    pub normalizer: IngestNormalizer,
    pub pastes: Arc<PasteService>,
    pub shortlinks: Arc<ShortlinkService>,
    pub resolver: Resolver,
    pub api_keys: ApiKeyService,
    pub stats: StatsService,
    pub cleanup: Arc<CleanupService>,
}

impl PastaServices {
    pub fn new(
        config: &Config,
        context: ServiceContext,
        fetcher: Arc<dyn ContentFetcher>,
        notifier: Option<Arc<dyn VerificationNotifier>>,
    ) -> Self {
        let key_request_limiter = Arc::new(RateLimiter::new(
            "api_key_request",
            config.key_request_limit_per_window(),
            config.key_request_window_secs(),
            Arc::clone(&context.clock),
        ));

        let normalizer = IngestNormalizer::new(fetcher, config.max_upload_size_bytes());
        let pastes = Arc::new(PasteService::new(
            context.clone(),
            RetentionPolicy::from_config(config),
        ));
        let shortlinks = Arc::new(ShortlinkService::new(context.clone()));
        let resolver = Resolver::new(Arc::clone(&pastes), Arc::clone(&shortlinks));
        let api_keys = ApiKeyService::new(
            Arc::clone(&context.api_keys),
            notifier,
            Arc::clone(&key_request_limiter),
            Arc::clone(&context.ids),
            Arc::clone(&context.clock),
            config.base_url(),
        );
        let stats = StatsService::new(Arc::clone(&context.pastes), Arc::clone(&context.shortlinks));
        let cleanup = Arc::new(CleanupService::new(
            Arc::clone(&context.pastes),
            Arc::clone(&context.shortlinks),
            Arc::clone(&pastes),
            Arc::clone(&shortlinks),
            vec![Arc::clone(&context.rate_limiter), key_request_limiter],
            Arc::clone(&context.clock),
            Duration::from_secs(config.cleanup_interval_secs()),
            config.cleanup_batch_size(),
        ));

        Self {
            context,
            normalizer,
            pastes,
            shortlinks,
            resolver,
            api_keys,
            stats,
            cleanup,
        }
    }

    /// Normalize an upload from any ingestion path and create the paste.
    pub async fn upload(
        &self,
        envelope: UploadEnvelope,
        caller: Option<ApiKey>,
    ) -> Result<Paste, AppError> {
        if let Some(caller) = &caller {
            require_usable(caller)?;
        }
        let upload = self.normalizer.normalize(envelope, caller).await?;
        self.pastes.create(upload).await
    }
}
