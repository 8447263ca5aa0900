//! Pasta Services Layer
//!
//! Ingestion, retention and lifecycle management for pastes and shortlinks,
//! the API key request flow, usage statistics and the cleanup scheduler.
//! Storage and metadata are reached only through the `Storage` and
//! repository traits, so every service runs against in-memory backends in
//! tests.

pub mod api_key;
pub mod app;
pub mod cleanup;
pub mod context;
pub mod duration;
pub mod ids;
pub mod ingest;
pub mod paste;
pub mod resolver;
pub mod retention;
pub mod shortlink;
pub mod stats;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use api_key::{ApiKeyService, EmailNotifier, KeyRequest, VerificationNotifier};
pub use app::PastaServices;
pub use cleanup::{CleanupReport, CleanupService, CleanupState};
pub use context::{ListLimits, ServiceContext};
pub use duration::parse_duration;
pub use ids::{IdGenerator, RandomIdGenerator};
pub use ingest::{
    ContentFetcher, HttpFetcher, IngestNormalizer, JsonUploadRequest, NormalizedUpload,
    UploadEnvelope, UploadOptions,
};
pub use paste::{DeleteAuth, PasteService};
pub use resolver::{Resolved, Resolver};
pub use retention::{RetentionPolicy, RetentionSample};
pub use shortlink::{CreateShortlinkRequest, ShortlinkService};
pub use stats::{StatsService, UsageStats};
