//! Paste lifecycle
//!
//! Content is written to storage before its metadata row exists, and removed
//! from storage before its metadata row is deleted. There is no transaction
//! spanning both stores, so a failed insert is followed by a compensating
//! storage delete, and a failed storage delete leaves the row in place.

use bytes::Bytes;
use pasta_core::models::{ApiKey, ExpiryRequest, ListQuery, Page, PageRequest, Paste, StorageLocation};
use pasta_core::AppError;
use pasta_storage::ByteStream;
use subtle::ConstantTimeEq;

use crate::context::{ServiceContext, MAX_ID_ATTEMPTS};
use crate::ids::DELETE_KEY_LENGTH;
use crate::ingest::NormalizedUpload;
use crate::retention::RetentionPolicy;

/// Proof that a caller may delete a paste. Either path is sufficient.
#[derive(Clone, Copy)]
pub enum DeleteAuth<'a> {
    /// The caller's API key owns the paste.
    Owner(&'a ApiKey),
    /// The per-paste delete key handed out at creation.
    DeleteKey(&'a str),
}

pub struct PasteService {
    ctx: ServiceContext,
    retention: RetentionPolicy,
}

impl PasteService {
    pub fn new(ctx: ServiceContext, retention: RetentionPolicy) -> Self {
        Self { ctx, retention }
    }

    pub fn retention(&self) -> &RetentionPolicy {
        &self.retention
    }

    /// Store a normalized upload and persist its metadata.
    #[tracing::instrument(skip(self, upload), fields(size_bytes = upload.size(), mime_type = %upload.mime_type))]
    pub async fn create(&self, upload: NormalizedUpload) -> Result<Paste, AppError> {
        let owner_key = match &upload.caller {
            Some(caller) => {
                require_usable(caller)?;
                self.ctx.check_rate_limit(&caller.key).await?;
                Some(caller.key.clone())
            }
            None => None,
        };

        let now = self.ctx.clock.now();
        let expiry = self.retention.evaluate(
            upload.size(),
            owner_key.is_some(),
            upload.options.expires_in.as_ref(),
            now,
        )?;

        let location = self
            .ctx
            .storage
            .put(upload.bytes.clone(), &upload.mime_type)
            .await?;

        let draft = Paste {
            id: String::new(),
            location: location.clone(),
            filename: upload.filename,
            extension: upload.options.extension,
            mime_type: upload.mime_type,
            size: upload.bytes.len() as i64,
            owner_key,
            delete_key: self.ctx.ids.secret(DELETE_KEY_LENGTH),
            private: upload.options.private,
            created_at: now,
            expires_at: expiry.as_timestamp(),
        };

        match self.insert_with_unique_id(draft).await {
            Ok(paste) => {
                tracing::info!(
                    paste_id = %paste.id,
                    storage_key = %paste.location.key,
                    expires_at = ?paste.expires_at,
                    anonymous = paste.owner_key.is_none(),
                    "Paste created"
                );
                Ok(paste)
            }
            Err(err) => Err(self.release_orphan(&location, err).await),
        }
    }

    /// Insert `draft` under a freshly drawn id, regenerating on collision.
    async fn insert_with_unique_id(&self, mut draft: Paste) -> Result<Paste, AppError> {
        for attempt in 1..=MAX_ID_ATTEMPTS {
            draft.id = self.ctx.ids.short_id();
            if self.ctx.is_id_taken(&draft.id).await? {
                tracing::debug!(attempt, "Paste id collision, regenerating");
                continue;
            }
            match self.ctx.pastes.insert(&draft).await {
                Ok(()) => return Ok(draft),
                Err(AppError::Conflict(_)) => {
                    tracing::debug!(attempt, "Paste id taken concurrently, regenerating");
                }
                Err(err) => return Err(err),
            }
        }
        Err(AppError::Conflict(
            "Could not allocate a unique paste id".to_string(),
        ))
    }

    /// Compensating delete for content whose metadata never made it in.
    /// Returns the error to surface: the original one, or `Persistence` if
    /// the object could not be released either.
    async fn release_orphan(&self, location: &StorageLocation, cause: AppError) -> AppError {
        match self.ctx.storage.delete(location).await {
            Ok(()) => {
                tracing::warn!(
                    storage_key = %location.key,
                    error = %cause,
                    "Paste metadata insert failed, stored content released"
                );
                cause
            }
            Err(cleanup_err) => {
                tracing::error!(
                    storage_key = %location.key,
                    error = %cause,
                    cleanup_error = %cleanup_err,
                    "Paste metadata insert failed and stored content could not be released"
                );
                AppError::Persistence(format!(
                    "Orphaned storage object {} after failed insert ({}); release failed: {}",
                    location, cause, cleanup_err
                ))
            }
        }
    }

    /// Look up a paste. Expired pastes are `NotFound` even before they are swept.
    pub async fn get(&self, id: &str) -> Result<Paste, AppError> {
        let now = self.ctx.clock.now();
        self.ctx
            .pastes
            .get(id)
            .await?
            .filter(|paste| !paste.is_expired(now))
            .ok_or_else(|| not_found(id))
    }

    /// Paste metadata together with its full content.
    pub async fn read(&self, id: &str) -> Result<(Paste, Bytes), AppError> {
        let paste = self.get(id).await?;
        let bytes = self.ctx.storage.get(&paste.location).await?;
        Ok((paste, bytes))
    }

    /// Paste metadata together with a content stream.
    pub async fn open(&self, id: &str) -> Result<(Paste, ByteStream), AppError> {
        let paste = self.get(id).await?;
        let stream = self.ctx.storage.get_stream(&paste.location).await?;
        Ok((paste, stream))
    }

    #[tracing::instrument(skip(self, caller), fields(paste_id = %id))]
    pub async fn update_expiry(
        &self,
        id: &str,
        caller: &ApiKey,
        request: ExpiryRequest,
    ) -> Result<Paste, AppError> {
        require_usable(caller)?;
        let paste = self.get(id).await?;
        if !paste.is_owned_by(&caller.key) {
            return Err(AppError::Forbidden(
                "Only the owner can change a paste's expiry".to_string(),
            ));
        }
        self.ctx.check_rate_limit(&caller.key).await?;

        let now = self.ctx.clock.now();
        let expiry = self
            .retention
            .evaluate(paste.size.max(0) as u64, true, Some(&request), now)?;

        let updated = self
            .ctx
            .pastes
            .update_expiry(id, expiry.as_timestamp())
            .await?
            .ok_or_else(|| not_found(id))?;
        tracing::info!(expires_at = ?updated.expires_at, "Paste expiry updated");
        Ok(updated)
    }

    /// Delete a paste with either ownership or its delete key.
    ///
    /// The row is looked up without the expiry filter, so an expired paste
    /// that has not been swept yet can still be removed by its owner.
    #[tracing::instrument(skip(self, auth), fields(paste_id = %id))]
    pub async fn delete(&self, id: &str, auth: DeleteAuth<'_>) -> Result<(), AppError> {
        let paste = self.ctx.pastes.get(id).await?.ok_or_else(|| not_found(id))?;

        let authorized = match auth {
            DeleteAuth::Owner(caller) => {
                require_usable(caller)?;
                paste.is_owned_by(&caller.key)
            }
            DeleteAuth::DeleteKey(key) => {
                bool::from(key.as_bytes().ct_eq(paste.delete_key.as_bytes()))
            }
        };
        if !authorized {
            return Err(AppError::Forbidden(
                "Not authorized to delete this paste".to_string(),
            ));
        }
        if let DeleteAuth::Owner(caller) = auth {
            self.ctx.check_rate_limit(&caller.key).await?;
        }

        self.remove(&paste).await
    }

    /// Remove an expired paste. Returns `false` if it is gone or no longer expired.
    pub async fn purge_expired(&self, id: &str) -> Result<bool, AppError> {
        let now = self.ctx.clock.now();
        match self.ctx.pastes.get(id).await? {
            Some(paste) if paste.is_expired(now) => {
                self.remove(&paste).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Storage first, then metadata. A storage failure keeps the row.
    async fn remove(&self, paste: &Paste) -> Result<(), AppError> {
        if let Err(e) = self.ctx.storage.delete(&paste.location).await {
            tracing::error!(
                paste_id = %paste.id,
                storage_key = %paste.location.key,
                error = %e,
                "Failed to delete paste content, keeping metadata"
            );
            return Err(e.into());
        }

        if !self.ctx.pastes.delete(&paste.id).await? {
            tracing::debug!(paste_id = %paste.id, "Paste row already removed");
        }
        tracing::info!(paste_id = %paste.id, storage_key = %paste.location.key, "Paste deleted");
        Ok(())
    }

    /// The caller's own unexpired pastes, private ones included.
    pub async fn list(&self, caller: &ApiKey, query: &ListQuery) -> Result<Page<Paste>, AppError> {
        require_usable(caller)?;
        let mut page = PageRequest::resolve(
            query,
            self.ctx.list_limits.default_limit,
            self.ctx.list_limits.max_limit,
        )?;
        page.sort = page.sort.for_pastes()?;

        let now = self.ctx.clock.now();
        let (items, total) = self
            .ctx
            .pastes
            .list_by_owner(&caller.key, &page, now)
            .await?;
        Ok(Page {
            items,
            total,
            page: page.page,
            limit: page.limit,
        })
    }
}

pub(crate) fn require_usable(caller: &ApiKey) -> Result<(), AppError> {
    if caller.is_usable() {
        Ok(())
    } else {
        Err(AppError::Unauthorized(
            "API key has not been verified".to_string(),
        ))
    }
}

fn not_found(id: &str) -> AppError {
    AppError::NotFound(format!("Paste '{}' not found", id))
}
