//! API key request and verification
//!
//! A key is created unverified together with a single-use token valid for
//! 24 hours. The token is delivered by a [`VerificationNotifier`]; if
//! delivery fails the key is rolled back. Presenting the token flips the key
//! to verified exactly once.

mod notifier;

pub use notifier::{EmailNotifier, VerificationNotifier};

use chrono::Duration;
use pasta_core::models::ApiKey;
use pasta_core::{AppError, Clock};
use pasta_db::ApiKeyRepository;
use pasta_infra::{RateLimitSubject, RateLimiter};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::ids::{IdGenerator, API_KEY_LENGTH, VERIFY_TOKEN_LENGTH};

const VERIFY_TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct KeyRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
}

pub struct ApiKeyService {
    repository: Arc<dyn ApiKeyRepository>,
    notifier: Option<Arc<dyn VerificationNotifier>>,
    /// IP-scoped limiter for anonymous key requests.
    request_limiter: Arc<RateLimiter>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    base_url: String,
}

impl ApiKeyService {
    pub fn new(
        repository: Arc<dyn ApiKeyRepository>,
        notifier: Option<Arc<dyn VerificationNotifier>>,
        request_limiter: Arc<RateLimiter>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            notifier,
            request_limiter,
            ids,
            clock,
            base_url: base_url.into(),
        }
    }

    /// Create an unverified key and send its verification link.
    #[tracing::instrument(skip(self, request), fields(client_ip = %client_ip))]
    pub async fn request_key(&self, request: KeyRequest, client_ip: &str) -> Result<ApiKey, AppError> {
        let notifier = self.notifier.as_ref().ok_or_else(|| {
            AppError::ServiceUnavailable(
                "Email verification is not available. Please contact the administrator."
                    .to_string(),
            )
        })?;
        self.request_limiter
            .allow(&RateLimitSubject::Ip(client_ip.to_string()))
            .await?;

        let request = KeyRequest {
            email: request.email.trim().to_string(),
            name: request.name.trim().to_string(),
        };
        request.validate()?;

        if self
            .repository
            .find_verified_by_email(&request.email)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(
                "An API key already exists for this email address".to_string(),
            ));
        }

        let now = self.clock.now();
        let token = self.ids.secret(VERIFY_TOKEN_LENGTH);
        let key = ApiKey {
            key: self.ids.secret(API_KEY_LENGTH),
            email: request.email,
            name: request.name,
            verified: false,
            verify_token: Some(token.clone()),
            verify_expiry: Some(now + Duration::hours(VERIFY_TOKEN_TTL_HOURS)),
            allow_shortlinks: false,
            created_at: now,
        };
        self.repository.insert(&key).await?;

        let verify_url = format!("{}/verify/{}", self.base_url.trim_end_matches('/'), token);
        if let Err(e) = notifier
            .send_verification(&key.email, &key.name, &verify_url)
            .await
        {
            tracing::error!(error = %e, "Failed to send verification, rolling back key");
            if let Err(rollback_err) = self.repository.delete(&key.key).await {
                tracing::error!(error = %rollback_err, "Failed to roll back unverified key");
            }
            return Err(e);
        }

        tracing::info!("API key requested, verification pending");
        Ok(key)
    }

    /// Redeem a verification token. Unknown, expired or used tokens are `NotFound`.
    #[tracing::instrument(skip(self, token))]
    pub async fn verify(&self, token: &str) -> Result<ApiKey, AppError> {
        let invalid = || AppError::NotFound("Invalid or expired verification token".to_string());
        let now = self.clock.now();

        let pending = self
            .repository
            .find_pending_by_token(token, now)
            .await?
            .ok_or_else(invalid)?;
        if !self.repository.mark_verified(&pending.key).await? {
            return Err(invalid());
        }

        tracing::info!("API key verified");
        self.repository
            .get(&pending.key)
            .await?
            .ok_or_else(invalid)
    }

    /// Caller identity for a presented key. Unknown keys are `Unauthorized`.
    pub async fn resolve(&self, key: &str) -> Result<ApiKey, AppError> {
        self.repository
            .get(key)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid API key".to_string()))
    }

    /// Operator switch for the shortlink capability.
    pub async fn set_shortlink_access(&self, key: &str, allowed: bool) -> Result<(), AppError> {
        if self.repository.set_shortlink_access(key, allowed).await? {
            tracing::info!(allowed, "Shortlink access updated");
            Ok(())
        } else {
            Err(AppError::NotFound("API key not found".to_string()))
        }
    }
}
