//! Paste repository: CRUD for the pastes table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pasta_core::models::{PageRequest, Paste, StorageLocation};
use pasta_core::{AppError, StorageBackend};
use sqlx::{PgPool, Postgres};

use super::map_insert_error;
use crate::traits::{ExpiryCursor, PasteRepository};

const PASTE_COLUMNS: &str = "id, storage_backend, storage_bucket, storage_key, filename, \
     extension, mime_type, size, owner_key, delete_key, private, created_at, expires_at";

/// Row type for the pastes table (for FromRow).
#[derive(Debug, sqlx::FromRow)]
struct PasteRow {
    id: String,
    storage_backend: StorageBackend,
    storage_bucket: Option<String>,
    storage_key: String,
    filename: String,
    extension: Option<String>,
    mime_type: String,
    size: i64,
    owner_key: Option<String>,
    delete_key: String,
    private: bool,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl From<PasteRow> for Paste {
    fn from(row: PasteRow) -> Self {
        Paste {
            id: row.id,
            location: StorageLocation::new(row.storage_backend, row.storage_bucket, row.storage_key),
            filename: row.filename,
            extension: row.extension,
            mime_type: row.mime_type,
            size: row.size,
            owner_key: row.owner_key,
            delete_key: row.delete_key,
            private: row.private,
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}

#[derive(Clone)]
pub struct PgPasteRepository {
    pool: PgPool,
}

impl PgPasteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PasteRepository for PgPasteRepository {
    #[tracing::instrument(skip(self, paste), fields(db.table = "pastes", db.operation = "insert", paste_id = %paste.id))]
    async fn insert(&self, paste: &Paste) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO pastes (id, storage_backend, storage_bucket, storage_key, filename,
                extension, mime_type, size, owner_key, delete_key, private, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(&paste.id)
        .bind(paste.location.backend)
        .bind(&paste.location.bucket)
        .bind(&paste.location.key)
        .bind(&paste.filename)
        .bind(&paste.extension)
        .bind(&paste.mime_type)
        .bind(paste.size)
        .bind(&paste.owner_key)
        .bind(&paste.delete_key)
        .bind(paste.private)
        .bind(paste.created_at)
        .bind(paste.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, "Paste"))?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "pastes", db.operation = "select"))]
    async fn get(&self, id: &str) -> Result<Option<Paste>, AppError> {
        let row = sqlx::query_as::<Postgres, PasteRow>(&format!(
            "SELECT {} FROM pastes WHERE id = $1",
            PASTE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Paste::from))
    }

    #[tracing::instrument(skip(self), fields(db.table = "pastes", db.operation = "exists"))]
    async fn exists(&self, id: &str) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pastes WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    #[tracing::instrument(skip(self), fields(db.table = "pastes", db.operation = "update"))]
    async fn update_expiry(
        &self,
        id: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Paste>, AppError> {
        let row = sqlx::query_as::<Postgres, PasteRow>(&format!(
            "UPDATE pastes SET expires_at = $2 WHERE id = $1 RETURNING {}",
            PASTE_COLUMNS
        ))
        .bind(id)
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Paste::from))
    }

    #[tracing::instrument(skip(self), fields(db.table = "pastes", db.operation = "delete"))]
    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM pastes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self, owner_key), fields(db.table = "pastes", db.operation = "list", db.page = page.page, db.limit = page.limit))]
    async fn list_by_owner(
        &self,
        owner_key: &str,
        page: &PageRequest,
        now: DateTime<Utc>,
    ) -> Result<(Vec<Paste>, i64), AppError> {
        // SortSpec only renders whitelisted columns.
        let rows = sqlx::query_as::<Postgres, PasteRow>(&format!(
            r#"
            SELECT {} FROM pastes
            WHERE owner_key = $1 AND (expires_at IS NULL OR expires_at > $2)
            ORDER BY {} NULLS LAST, id ASC
            LIMIT $3 OFFSET $4
            "#,
            PASTE_COLUMNS, page.sort
        ))
        .bind(owner_key)
        .bind(now)
        .bind(page.limit as i64)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pastes WHERE owner_key = $1 AND (expires_at IS NULL OR expires_at > $2)",
        )
        .bind(owner_key)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok((rows.into_iter().map(Paste::from).collect(), total))
    }

    #[tracing::instrument(skip(self), fields(db.table = "pastes", db.operation = "list_expired"))]
    async fn list_expired(
        &self,
        now: DateTime<Utc>,
        after: Option<&ExpiryCursor>,
        limit: u32,
    ) -> Result<Vec<Paste>, AppError> {
        let rows = sqlx::query_as::<Postgres, PasteRow>(&format!(
            r#"
            SELECT {} FROM pastes
            WHERE expires_at IS NOT NULL AND expires_at <= $1
              AND ($2::timestamptz IS NULL OR (expires_at, id) > ($2::timestamptz, $3::text))
            ORDER BY expires_at ASC, id ASC
            LIMIT $4
            "#,
            PASTE_COLUMNS
        ))
        .bind(now)
        .bind(after.map(|c| c.expires_at))
        .bind(after.map(|c| c.id.as_str()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Paste::from).collect())
    }

    #[tracing::instrument(skip(self), fields(db.table = "pastes", db.operation = "count"))]
    async fn count(&self) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pastes")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    #[tracing::instrument(skip(self), fields(db.table = "pastes", db.operation = "sum"))]
    async fn total_size(&self) -> Result<i64, AppError> {
        let total: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(size), 0)::BIGINT FROM pastes")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }
}
