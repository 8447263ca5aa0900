//! Shortlink lifecycle and click tracking.

use pasta_core::models::{
    ApiKey, Expiry, ExpiryRequest, ListQuery, Page, PageRequest, Shortlink, ShortlinkStats,
};
use pasta_core::AppError;
use serde::Deserialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use validator::Validate;

use crate::context::{ServiceContext, MAX_ID_ATTEMPTS};
use crate::duration::parse_duration;
use crate::paste::require_usable;

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateShortlinkRequest {
    #[validate(length(min = 1, max = 2048))]
    pub url: String,
    #[serde(default)]
    #[validate(length(max = 255))]
    pub title: Option<String>,
    #[serde(default)]
    pub expires_in: Option<String>,
}

pub struct ShortlinkService {
    ctx: ServiceContext,
}

impl ShortlinkService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Create a shortlink. The capability check runs before the URL is looked at.
    #[tracing::instrument(skip(self, caller, request))]
    pub async fn create(
        &self,
        caller: &ApiKey,
        request: CreateShortlinkRequest,
    ) -> Result<Shortlink, AppError> {
        require_usable(caller)?;
        if !caller.allow_shortlinks {
            return Err(AppError::Forbidden(
                "API key does not allow URL shortening".to_string(),
            ));
        }
        self.ctx.check_rate_limit(&caller.key).await?;

        request.validate()?;
        let target_url = validate_target_url(&request.url)?;
        let title = request
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let now = self.ctx.clock.now();
        let expiry = self.resolve_expiry(ExpiryRequest::from_field(request.expires_in.as_deref()))?;

        let mut link = Shortlink {
            id: String::new(),
            target_url,
            title,
            owner_key: caller.key.clone(),
            clicks: 0,
            last_click: None,
            created_at: now,
            expires_at: expiry.as_timestamp(),
        };

        for attempt in 1..=MAX_ID_ATTEMPTS {
            link.id = self.ctx.ids.short_id();
            if self.ctx.is_id_taken(&link.id).await? {
                tracing::debug!(attempt, "Shortlink id collision, regenerating");
                continue;
            }
            match self.ctx.shortlinks.insert(&link).await {
                Ok(()) => {
                    tracing::info!(
                        shortlink_id = %link.id,
                        target_url = %link.target_url,
                        expires_at = ?link.expires_at,
                        "Shortlink created"
                    );
                    return Ok(link);
                }
                Err(AppError::Conflict(_)) => {
                    tracing::debug!(attempt, "Shortlink id taken concurrently, regenerating");
                }
                Err(err) => return Err(err),
            }
        }
        Err(AppError::Conflict(
            "Could not allocate a unique shortlink id".to_string(),
        ))
    }

    /// Shortlinks without a requested expiry never expire.
    fn resolve_expiry(&self, request: Option<ExpiryRequest>) -> Result<Expiry, AppError> {
        match request {
            None | Some(ExpiryRequest::Never) => Ok(Expiry::Never),
            Some(ExpiryRequest::Duration(raw)) => {
                Ok(Expiry::At(self.ctx.clock.now() + parse_duration(&raw)?))
            }
        }
    }

    /// Look up a shortlink, treating expired ones as absent.
    pub async fn get(&self, id: &str) -> Result<Shortlink, AppError> {
        let now = self.ctx.clock.now();
        self.ctx
            .shortlinks
            .get(id)
            .await?
            .filter(|link| !link.is_expired(now))
            .ok_or_else(|| not_found(id))
    }

    /// Count a click. Failures are logged and dropped so redirects never fail
    /// because of tracking.
    pub async fn record_click(&self, id: &str) {
        let at = self.ctx.clock.now();
        match self.ctx.shortlinks.record_click(id, at).await {
            Ok(true) => tracing::debug!(shortlink_id = %id, "Click recorded"),
            Ok(false) => tracing::debug!(shortlink_id = %id, "Click for unknown or expired shortlink ignored"),
            Err(e) => tracing::error!(shortlink_id = %id, error = %e, "Failed to record click"),
        }
    }

    /// Record a click on a detached task.
    pub fn spawn_click(self: &Arc<Self>, id: impl Into<String>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let id = id.into();
        tokio::spawn(async move {
            service.record_click(&id).await;
        })
    }

    /// Click analytics, visible to the owning key only.
    pub async fn stats(&self, id: &str, caller: &ApiKey) -> Result<ShortlinkStats, AppError> {
        let link = self.get(id).await?;
        if !link.is_owned_by(&caller.key) {
            return Err(AppError::Forbidden(
                "Not authorized to view these stats".to_string(),
            ));
        }
        Ok(ShortlinkStats::from(&link))
    }

    pub async fn list(
        &self,
        caller: &ApiKey,
        query: &ListQuery,
    ) -> Result<Page<Shortlink>, AppError> {
        require_usable(caller)?;
        let mut page = PageRequest::resolve(
            query,
            self.ctx.list_limits.default_limit,
            self.ctx.list_limits.max_limit,
        )?;
        page.sort = page.sort.for_shortlinks()?;

        let (items, total) = self
            .ctx
            .shortlinks
            .list_by_owner(&caller.key, &page, self.ctx.clock.now())
            .await?;
        Ok(Page {
            items,
            total,
            page: page.page,
            limit: page.limit,
        })
    }

    #[tracing::instrument(skip(self, caller, request), fields(shortlink_id = %id))]
    pub async fn update_expiry(
        &self,
        id: &str,
        caller: &ApiKey,
        request: ExpiryRequest,
    ) -> Result<Shortlink, AppError> {
        require_usable(caller)?;
        let link = self.get(id).await?;
        if !link.is_owned_by(&caller.key) {
            return Err(AppError::Forbidden(
                "Only the owner can change a shortlink's expiry".to_string(),
            ));
        }
        self.ctx.check_rate_limit(&caller.key).await?;

        let expiry = self.resolve_expiry(Some(request))?;
        self.ctx
            .shortlinks
            .update_expiry(id, expiry.as_timestamp())
            .await?
            .ok_or_else(|| not_found(id))
    }

    /// Owner-only delete. Expired but unswept links can still be removed.
    #[tracing::instrument(skip(self, caller), fields(shortlink_id = %id))]
    pub async fn delete(&self, id: &str, caller: &ApiKey) -> Result<(), AppError> {
        require_usable(caller)?;
        let link = self
            .ctx
            .shortlinks
            .get(id)
            .await?
            .ok_or_else(|| not_found(id))?;
        if !link.is_owned_by(&caller.key) {
            return Err(AppError::Forbidden(
                "Not authorized to delete this shortlink".to_string(),
            ));
        }
        self.ctx.check_rate_limit(&caller.key).await?;

        self.ctx.shortlinks.delete(id).await?;
        tracing::info!("Shortlink deleted");
        Ok(())
    }

    /// Remove an expired shortlink. Returns `false` if it is gone or no longer expired.
    pub async fn purge_expired(&self, id: &str) -> Result<bool, AppError> {
        let now = self.ctx.clock.now();
        match self.ctx.shortlinks.get(id).await? {
            Some(link) if link.is_expired(now) => Ok(self.ctx.shortlinks.delete(id).await?),
            _ => Ok(false),
        }
    }
}

/// Absolute http(s) URL with a host, normalised by the URL parser.
fn validate_target_url(raw: &str) -> Result<String, AppError> {
    let parsed = reqwest::Url::parse(raw.trim())
        .map_err(|e| AppError::InvalidInput(format!("Invalid URL: {}", e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AppError::InvalidInput(format!(
            "Unsupported URL scheme '{}'",
            parsed.scheme()
        )));
    }
    if parsed.host_str().filter(|h| !h.is_empty()).is_none() {
        return Err(AppError::InvalidInput("URL must have a host".to_string()));
    }
    Ok(parsed.to_string())
}

fn not_found(id: &str) -> AppError {
    AppError::NotFound(format!("Shortlink '{}' not found", id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_target_url() {
        assert_eq!(
            validate_target_url(" https://example.com/a?b=c ").unwrap(),
            "https://example.com/a?b=c"
        );
        assert!(validate_target_url("ftp://example.com").is_err());
        assert!(validate_target_url("javascript:alert(1)").is_err());
        assert!(validate_target_url("/relative/path").is_err());
        assert!(validate_target_url("").is_err());
    }
}
