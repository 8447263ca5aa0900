//! Repository traits
//!
//! The lifecycle services only see these traits, which keeps them testable
//! without a database. Reads here return rows as stored; lazy expiry is the
//! caller's concern.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pasta_core::models::{ApiKey, PageRequest, Paste, Shortlink};
use pasta_core::AppError;

/// Resume point for an expiry-ordered scan. Rows are returned strictly after
/// `(expires_at, id)`, so rows that stay behind (e.g. a failed delete) are
/// not returned again within the same scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryCursor {
    pub expires_at: DateTime<Utc>,
    pub id: String,
}

impl ExpiryCursor {
    pub fn new(expires_at: DateTime<Utc>, id: impl Into<String>) -> Self {
        Self {
            expires_at,
            id: id.into(),
        }
    }

    /// Whether a row keyed `(expires_at, id)` comes after this cursor.
    pub fn precedes(&self, expires_at: DateTime<Utc>, id: &str) -> bool {
        (expires_at, id) > (self.expires_at, self.id.as_str())
    }
}

#[async_trait]
pub trait PasteRepository: Send + Sync {
    /// Insert a new paste. A duplicate id is reported as `Conflict`.
    async fn insert(&self, paste: &Paste) -> Result<(), AppError>;

    async fn get(&self, id: &str) -> Result<Option<Paste>, AppError>;

    async fn exists(&self, id: &str) -> Result<bool, AppError>;

    async fn update_expiry(
        &self,
        id: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Paste>, AppError>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: &str) -> Result<bool, AppError>;

    /// Unexpired pastes owned by `owner_key`, plus the total matching count.
    async fn list_by_owner(
        &self,
        owner_key: &str,
        page: &PageRequest,
        now: DateTime<Utc>,
    ) -> Result<(Vec<Paste>, i64), AppError>;

    /// Pastes with `expires_at <= now`, ordered by `(expires_at, id)` and
    /// starting after `after` when given.
    async fn list_expired(
        &self,
        now: DateTime<Utc>,
        after: Option<&ExpiryCursor>,
        limit: u32,
    ) -> Result<Vec<Paste>, AppError>;

    async fn count(&self) -> Result<i64, AppError>;

    /// Sum of stored content sizes in bytes.
    async fn total_size(&self) -> Result<i64, AppError>;
}

#[async_trait]
pub trait ShortlinkRepository: Send + Sync {
    async fn insert(&self, link: &Shortlink) -> Result<(), AppError>;

    async fn get(&self, id: &str) -> Result<Option<Shortlink>, AppError>;

    async fn exists(&self, id: &str) -> Result<bool, AppError>;

    async fn update_expiry(
        &self,
        id: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Shortlink>, AppError>;

    async fn delete(&self, id: &str) -> Result<bool, AppError>;

    /// Atomically add one click and stamp `last_click`. Returns whether an
    /// unexpired link was counted; links with `expires_at <= at` are left alone.
    async fn record_click(&self, id: &str, at: DateTime<Utc>) -> Result<bool, AppError>;

    async fn list_by_owner(
        &self,
        owner_key: &str,
        page: &PageRequest,
        now: DateTime<Utc>,
    ) -> Result<(Vec<Shortlink>, i64), AppError>;

    /// Same ordering and cursor semantics as [`PasteRepository::list_expired`].
    async fn list_expired(
        &self,
        now: DateTime<Utc>,
        after: Option<&ExpiryCursor>,
        limit: u32,
    ) -> Result<Vec<Shortlink>, AppError>;

    async fn count(&self) -> Result<i64, AppError>;
}

#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    async fn insert(&self, key: &ApiKey) -> Result<(), AppError>;

    async fn get(&self, key: &str) -> Result<Option<ApiKey>, AppError>;

    async fn find_verified_by_email(&self, email: &str) -> Result<Option<ApiKey>, AppError>;

    /// Unverified key holding `token` whose verification window ends after `now`.
    async fn find_pending_by_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ApiKey>, AppError>;

    /// Flip an unverified key to verified and clear its token. Returns `false`
    /// if the key was already verified (or does not exist).
    async fn mark_verified(&self, key: &str) -> Result<bool, AppError>;

    /// Grant or revoke the shortlink capability. Returns whether the key exists.
    async fn set_shortlink_access(&self, key: &str, allowed: bool) -> Result<bool, AppError>;

    async fn delete(&self, key: &str) -> Result<bool, AppError>;
}
