//! Shortlink repository: CRUD and click counting for the shortlinks table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pasta_core::models::{PageRequest, Shortlink};
use pasta_core::AppError;
use sqlx::{PgPool, Postgres};

use super::map_insert_error;
use crate::traits::{ExpiryCursor, ShortlinkRepository};

const SHORTLINK_COLUMNS: &str =
    "id, target_url, title, owner_key, clicks, last_click, created_at, expires_at";

#[derive(Debug, sqlx::FromRow)]
struct ShortlinkRow {
    id: String,
    target_url: String,
    title: Option<String>,
    owner_key: String,
    clicks: i64,
    last_click: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl From<ShortlinkRow> for Shortlink {
    fn from(row: ShortlinkRow) -> Self {
        Shortlink {
            id: row.id,
            target_url: row.target_url,
            title: row.title,
            owner_key: row.owner_key,
            clicks: row.clicks,
            last_click: row.last_click,
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}

#[derive(Clone)]
pub struct PgShortlinkRepository {
    pool: PgPool,
}

impl PgShortlinkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ShortlinkRepository for PgShortlinkRepository {
    #[tracing::instrument(skip(self, link), fields(db.table = "shortlinks", db.operation = "insert", shortlink_id = %link.id))]
    async fn insert(&self, link: &Shortlink) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO shortlinks (id, target_url, title, owner_key, clicks, last_click,
                created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&link.id)
        .bind(&link.target_url)
        .bind(&link.title)
        .bind(&link.owner_key)
        .bind(link.clicks)
        .bind(link.last_click)
        .bind(link.created_at)
        .bind(link.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, "Shortlink"))?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "shortlinks", db.operation = "select"))]
    async fn get(&self, id: &str) -> Result<Option<Shortlink>, AppError> {
        let row = sqlx::query_as::<Postgres, ShortlinkRow>(&format!(
            "SELECT {} FROM shortlinks WHERE id = $1",
            SHORTLINK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Shortlink::from))
    }

    #[tracing::instrument(skip(self), fields(db.table = "shortlinks", db.operation = "exists"))]
    async fn exists(&self, id: &str) -> Result<bool, AppError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM shortlinks WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    #[tracing::instrument(skip(self), fields(db.table = "shortlinks", db.operation = "update"))]
    async fn update_expiry(
        &self,
        id: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Shortlink>, AppError> {
        let row = sqlx::query_as::<Postgres, ShortlinkRow>(&format!(
            "UPDATE shortlinks SET expires_at = $2 WHERE id = $1 RETURNING {}",
            SHORTLINK_COLUMNS
        ))
        .bind(id)
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Shortlink::from))
    }

    #[tracing::instrument(skip(self), fields(db.table = "shortlinks", db.operation = "delete"))]
    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM shortlinks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "shortlinks", db.operation = "click"))]
    async fn record_click(&self, id: &str, at: DateTime<Utc>) -> Result<bool, AppError> {
        // Single-statement increment; concurrent clicks never overwrite each other.
        let result = sqlx::query(
            r#"
            UPDATE shortlinks SET clicks = clicks + 1, last_click = $2
            WHERE id = $1 AND (expires_at IS NULL OR expires_at > $2)
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self, owner_key), fields(db.table = "shortlinks", db.operation = "list", db.page = page.page, db.limit = page.limit))]
    async fn list_by_owner(
        &self,
        owner_key: &str,
        page: &PageRequest,
        now: DateTime<Utc>,
    ) -> Result<(Vec<Shortlink>, i64), AppError> {
        let rows = sqlx::query_as::<Postgres, ShortlinkRow>(&format!(
            r#"
            SELECT {} FROM shortlinks
            WHERE owner_key = $1 AND (expires_at IS NULL OR expires_at > $2)
            ORDER BY {} NULLS LAST, id ASC
            LIMIT $3 OFFSET $4
            "#,
            SHORTLINK_COLUMNS, page.sort
        ))
        .bind(owner_key)
        .bind(now)
        .bind(page.limit as i64)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM shortlinks WHERE owner_key = $1 AND (expires_at IS NULL OR expires_at > $2)",
        )
        .bind(owner_key)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok((rows.into_iter().map(Shortlink::from).collect(), total))
    }

    #[tracing::instrument(skip(self), fields(db.table = "shortlinks", db.operation = "list_expired"))]
    async fn list_expired(
        &self,
        now: DateTime<Utc>,
        after: Option<&ExpiryCursor>,
        limit: u32,
    ) -> Result<Vec<Shortlink>, AppError> {
        let rows = sqlx::query_as::<Postgres, ShortlinkRow>(&format!(
            r#"
            SELECT {} FROM shortlinks
            WHERE expires_at IS NOT NULL AND expires_at <= $1
              AND ($2::timestamptz IS NULL OR (expires_at, id) > ($2::timestamptz, $3::text))
            ORDER BY expires_at ASC, id ASC
            LIMIT $4
            "#,
            SHORTLINK_COLUMNS
        ))
        .bind(now)
        .bind(after.map(|c| c.expires_at))
        .bind(after.map(|c| c.id.as_str()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Shortlink::from).collect())
    }

    #[tracing::instrument(skip(self), fields(db.table = "shortlinks", db.operation = "count"))]
    async fn count(&self) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM shortlinks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
