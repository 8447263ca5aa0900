//! API key repository: CRUD and verification for the api_keys table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pasta_core::models::ApiKey;
use pasta_core::AppError;
use sqlx::{PgPool, Postgres};

use super::map_insert_error;
use crate::traits::ApiKeyRepository;

const API_KEY_COLUMNS: &str =
    "key, email, name, verified, verify_token, verify_expiry, allow_shortlinks, created_at";

#[derive(sqlx::FromRow)]
struct ApiKeyRow {
    key: String,
    email: String,
    name: String,
    verified: bool,
    verify_token: Option<String>,
    verify_expiry: Option<DateTime<Utc>>,
    allow_shortlinks: bool,
    created_at: DateTime<Utc>,
}

impl From<ApiKeyRow> for ApiKey {
    fn from(row: ApiKeyRow) -> Self {
        ApiKey {
            key: row.key,
            email: row.email,
            name: row.name,
            verified: row.verified,
            verify_token: row.verify_token,
            verify_expiry: row.verify_expiry,
            allow_shortlinks: row.allow_shortlinks,
            created_at: row.created_at,
        }
    }
}

#[derive(Clone)]
pub struct PgApiKeyRepository {
    pool: PgPool,
}

impl PgApiKeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApiKeyRepository for PgApiKeyRepository {
    #[tracing::instrument(skip(self, key), fields(db.table = "api_keys", db.operation = "insert"))]
    async fn insert(&self, key: &ApiKey) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO api_keys (key, email, name, verified, verify_token, verify_expiry,
                allow_shortlinks, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&key.key)
        .bind(&key.email)
        .bind(&key.name)
        .bind(key.verified)
        .bind(&key.verify_token)
        .bind(key.verify_expiry)
        .bind(key.allow_shortlinks)
        .bind(key.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, "API key"))?;
        Ok(())
    }

    #[tracing::instrument(skip(self, key), fields(db.table = "api_keys", db.operation = "select"))]
    async fn get(&self, key: &str) -> Result<Option<ApiKey>, AppError> {
        let row = sqlx::query_as::<Postgres, ApiKeyRow>(&format!(
            "SELECT {} FROM api_keys WHERE key = $1",
            API_KEY_COLUMNS
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ApiKey::from))
    }

    #[tracing::instrument(skip(self, email), fields(db.table = "api_keys", db.operation = "select"))]
    async fn find_verified_by_email(&self, email: &str) -> Result<Option<ApiKey>, AppError> {
        let row = sqlx::query_as::<Postgres, ApiKeyRow>(&format!(
            "SELECT {} FROM api_keys WHERE email = $1 AND verified = TRUE LIMIT 1",
            API_KEY_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ApiKey::from))
    }

    #[tracing::instrument(skip(self, token), fields(db.table = "api_keys", db.operation = "select"))]
    async fn find_pending_by_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ApiKey>, AppError> {
        let row = sqlx::query_as::<Postgres, ApiKeyRow>(&format!(
            r#"
            SELECT {} FROM api_keys
            WHERE verify_token = $1 AND verified = FALSE AND verify_expiry > $2
            "#,
            API_KEY_COLUMNS
        ))
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ApiKey::from))
    }

    #[tracing::instrument(skip(self, key), fields(db.table = "api_keys", db.operation = "update"))]
    async fn mark_verified(&self, key: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE api_keys
            SET verified = TRUE, verify_token = NULL, verify_expiry = NULL
            WHERE key = $1 AND verified = FALSE
            "#,
        )
        .bind(key)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self, key), fields(db.table = "api_keys", db.operation = "update"))]
    async fn set_shortlink_access(&self, key: &str, allowed: bool) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE api_keys SET allow_shortlinks = $2 WHERE key = $1")
            .bind(key)
            .bind(allowed)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self, key), fields(db.table = "api_keys", db.operation = "delete"))]
    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM api_keys WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
