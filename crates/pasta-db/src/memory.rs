//! In-memory repositories
//!
//! Used by the CLI's `memory` mode and by tests. They follow the same
//! contracts as the PostgreSQL repositories, including `Conflict` on duplicate
//! ids and single-step click increments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pasta_core::models::{ApiKey, PageRequest, Paste, Shortlink, SortDirection, SortField};
use pasta_core::AppError;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::traits::{ApiKeyRepository, ExpiryCursor, PasteRepository, ShortlinkRepository};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Orders optional timestamps with `None` last, matching `NULLS LAST`.
fn cmp_nulls_last<T: Ord>(a: &Option<T>, b: &Option<T>, direction: SortDirection) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => apply_direction(a.cmp(b), direction),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn apply_direction(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

fn past_cursor(after: Option<&ExpiryCursor>, expires_at: Option<DateTime<Utc>>, id: &str) -> bool {
    match (after, expires_at) {
        (None, _) => true,
        (Some(cursor), Some(at)) => cursor.precedes(at, id),
        (Some(_), None) => false,
    }
}

fn paginate<T>(mut items: Vec<T>, page: &PageRequest) -> (Vec<T>, i64) {
    let total = items.len() as i64;
    let offset = page.offset().max(0) as usize;
    let items = if offset >= items.len() {
        Vec::new()
    } else {
        items.drain(offset..).take(page.limit as usize).collect()
    };
    (items, total)
}

#[derive(Clone, Default)]
pub struct MemoryPasteRepository {
    rows: Arc<Mutex<HashMap<String, Paste>>>,
}

impl MemoryPasteRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PasteRepository for MemoryPasteRepository {
    async fn insert(&self, paste: &Paste) -> Result<(), AppError> {
        let mut rows = lock(&self.rows);
        if rows.contains_key(&paste.id) {
            return Err(AppError::Conflict("Paste already exists".to_string()));
        }
        rows.insert(paste.id.clone(), paste.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Paste>, AppError> {
        Ok(lock(&self.rows).get(id).cloned())
    }

    async fn exists(&self, id: &str) -> Result<bool, AppError> {
        Ok(lock(&self.rows).contains_key(id))
    }

    async fn update_expiry(
        &self,
        id: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Paste>, AppError> {
        let mut rows = lock(&self.rows);
        Ok(rows.get_mut(id).map(|paste| {
            paste.expires_at = expires_at;
            paste.clone()
        }))
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        Ok(lock(&self.rows).remove(id).is_some())
    }

    async fn list_by_owner(
        &self,
        owner_key: &str,
        page: &PageRequest,
        now: DateTime<Utc>,
    ) -> Result<(Vec<Paste>, i64), AppError> {
        let mut items: Vec<Paste> = lock(&self.rows)
            .values()
            .filter(|p| p.is_owned_by(owner_key) && !p.is_expired(now))
            .cloned()
            .collect();

        let direction = page.sort.direction;
        items.sort_by(|a, b| {
            let primary = match page.sort.field {
                SortField::CreatedAt => apply_direction(a.created_at.cmp(&b.created_at), direction),
                SortField::ExpiresAt => cmp_nulls_last(&a.expires_at, &b.expires_at, direction),
                SortField::Size => apply_direction(a.size.cmp(&b.size), direction),
                SortField::Filename => apply_direction(a.filename.cmp(&b.filename), direction),
                SortField::Clicks => Ordering::Equal,
            };
            primary.then_with(|| a.id.cmp(&b.id))
        });

        Ok(paginate(items, page))
    }

    async fn list_expired(
        &self,
        now: DateTime<Utc>,
        after: Option<&ExpiryCursor>,
        limit: u32,
    ) -> Result<Vec<Paste>, AppError> {
        let mut expired: Vec<Paste> = lock(&self.rows)
            .values()
            .filter(|p| p.is_expired(now) && past_cursor(after, p.expires_at, &p.id))
            .cloned()
            .collect();
        expired.sort_by(|a, b| (a.expires_at, &a.id).cmp(&(b.expires_at, &b.id)));
        expired.truncate(limit as usize);
        Ok(expired)
    }

    async fn count(&self) -> Result<i64, AppError> {
        Ok(lock(&self.rows).len() as i64)
    }

    async fn total_size(&self) -> Result<i64, AppError> {
        Ok(lock(&self.rows).values().map(|p| p.size).sum())
    }
}

#[derive(Clone, Default)]
pub struct MemoryShortlinkRepository {
    rows: Arc<Mutex<HashMap<String, Shortlink>>>,
}

impl MemoryShortlinkRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ShortlinkRepository for MemoryShortlinkRepository {
    async fn insert(&self, link: &Shortlink) -> Result<(), AppError> {
        let mut rows = lock(&self.rows);
        if rows.contains_key(&link.id) {
            return Err(AppError::Conflict("Shortlink already exists".to_string()));
        }
        rows.insert(link.id.clone(), link.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Shortlink>, AppError> {
        Ok(lock(&self.rows).get(id).cloned())
    }

    async fn exists(&self, id: &str) -> Result<bool, AppError> {
        Ok(lock(&self.rows).contains_key(id))
    }

    async fn update_expiry(
        &self,
        id: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Shortlink>, AppError> {
        let mut rows = lock(&self.rows);
        Ok(rows.get_mut(id).map(|link| {
            link.expires_at = expires_at;
            link.clone()
        }))
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        Ok(lock(&self.rows).remove(id).is_some())
    }

    async fn record_click(&self, id: &str, at: DateTime<Utc>) -> Result<bool, AppError> {
        let mut rows = lock(&self.rows);
        match rows.get_mut(id) {
            Some(link) if !link.is_expired(at) => {
                link.clicks += 1;
                link.last_click = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_by_owner(
        &self,
        owner_key: &str,
        page: &PageRequest,
        now: DateTime<Utc>,
    ) -> Result<(Vec<Shortlink>, i64), AppError> {
        let mut items: Vec<Shortlink> = lock(&self.rows)
            .values()
            .filter(|l| l.is_owned_by(owner_key) && !l.is_expired(now))
            .cloned()
            .collect();

        let direction = page.sort.direction;
        items.sort_by(|a, b| {
            let primary = match page.sort.field {
                SortField::ExpiresAt => cmp_nulls_last(&a.expires_at, &b.expires_at, direction),
                SortField::Clicks => apply_direction(a.clicks.cmp(&b.clicks), direction),
                _ => apply_direction(a.created_at.cmp(&b.created_at), direction),
            };
            primary.then_with(|| a.id.cmp(&b.id))
        });

        Ok(paginate(items, page))
    }

    async fn list_expired(
        &self,
        now: DateTime<Utc>,
        after: Option<&ExpiryCursor>,
        limit: u32,
    ) -> Result<Vec<Shortlink>, AppError> {
        let mut expired: Vec<Shortlink> = lock(&self.rows)
            .values()
            .filter(|l| l.is_expired(now) && past_cursor(after, l.expires_at, &l.id))
            .cloned()
            .collect();
        expired.sort_by(|a, b| (a.expires_at, &a.id).cmp(&(b.expires_at, &b.id)));
        expired.truncate(limit as usize);
        Ok(expired)
    }

    async fn count(&self) -> Result<i64, AppError> {
        Ok(lock(&self.rows).len() as i64)
    }
}

#[derive(Clone, Default)]
pub struct MemoryApiKeyRepository {
    rows: Arc<Mutex<HashMap<String, ApiKey>>>,
}

impl MemoryApiKeyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.rows).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ApiKeyRepository for MemoryApiKeyRepository {
    async fn insert(&self, key: &ApiKey) -> Result<(), AppError> {
        let mut rows = lock(&self.rows);
        let token_taken = key.verify_token.is_some()
            && rows.values().any(|k| k.verify_token == key.verify_token);
        if rows.contains_key(&key.key) || token_taken {
            return Err(AppError::Conflict("API key already exists".to_string()));
        }
        rows.insert(key.key.clone(), key.clone());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<ApiKey>, AppError> {
        Ok(lock(&self.rows).get(key).cloned())
    }

    async fn find_verified_by_email(&self, email: &str) -> Result<Option<ApiKey>, AppError> {
        Ok(lock(&self.rows)
            .values()
            .find(|k| k.verified && k.email == email)
            .cloned())
    }

    async fn find_pending_by_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ApiKey>, AppError> {
        Ok(lock(&self.rows)
            .values()
            .find(|k| {
                !k.verified
                    && k.verify_token.as_deref() == Some(token)
                    && k.verify_expiry.map(|at| at > now).unwrap_or(false)
            })
            .cloned())
    }

    async fn mark_verified(&self, key: &str) -> Result<bool, AppError> {
        let mut rows = lock(&self.rows);
        match rows.get_mut(key) {
            Some(k) if !k.verified => {
                k.verified = true;
                k.verify_token = None;
                k.verify_expiry = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_shortlink_access(&self, key: &str, allowed: bool) -> Result<bool, AppError> {
        match lock(&self.rows).get_mut(key) {
            Some(k) => {
                k.allow_shortlinks = allowed;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        Ok(lock(&self.rows).remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pasta_core::models::{ListQuery, StorageLocation};
    use pasta_core::StorageBackend;

    fn paste(id: &str, owner: Option<&str>, size: i64, expires_at: Option<DateTime<Utc>>) -> Paste {
        Paste {
            id: id.to_string(),
            location: StorageLocation::new(StorageBackend::Memory, None, format!("pastes/{id}")),
            filename: format!("{id}.txt"),
            extension: None,
            mime_type: "text/plain".to_string(),
            size,
            owner_key: owner.map(str::to_string),
            delete_key: "dk".to_string(),
            private: false,
            created_at: Utc::now(),
            expires_at,
        }
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_conflict() {
        let repo = MemoryPasteRepository::new();
        repo.insert(&paste("a", None, 1, None)).await.unwrap();
        let err = repo.insert(&paste("a", None, 1, None)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_list_by_owner_scopes_sorts_and_skips_expired() {
        let repo = MemoryPasteRepository::new();
        let now = Utc::now();
        repo.insert(&paste("small", Some("k1"), 1, None)).await.unwrap();
        repo.insert(&paste("big", Some("k1"), 100, None)).await.unwrap();
        repo.insert(&paste("gone", Some("k1"), 50, Some(now - Duration::hours(1))))
            .await
            .unwrap();
        repo.insert(&paste("other", Some("k2"), 10, None)).await.unwrap();

        let page = PageRequest::resolve(
            &ListQuery {
                page: None,
                limit: None,
                sort: Some("size desc".to_string()),
            },
            20,
            100,
        )
        .unwrap();
        let (items, total) = repo.list_by_owner("k1", &page, now).await.unwrap();

        assert_eq!(total, 2);
        let ids: Vec<_> = items.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["big", "small"]);
    }

    #[tokio::test]
    async fn test_list_expired_respects_limit() {
        let repo = MemoryPasteRepository::new();
        let now = Utc::now();
        for i in 0..5 {
            repo.insert(&paste(&format!("p{i}"), None, 1, Some(now - Duration::minutes(i))))
                .await
                .unwrap();
        }
        repo.insert(&paste("live", None, 1, Some(now + Duration::days(1))))
            .await
            .unwrap();

        let expired = repo.list_expired(now, None, 3).await.unwrap();
        assert_eq!(expired.len(), 3);
        assert!(expired.iter().all(|p| p.id != "live"));
        assert_eq!(expired[0].id, "p4");
    }

    #[tokio::test]
    async fn test_list_expired_pages_past_cursor() {
        let repo = MemoryPasteRepository::new();
        let now = Utc::now();
        let at = now - Duration::minutes(5);
        for id in ["b", "a", "c"] {
            repo.insert(&paste(id, None, 1, Some(at))).await.unwrap();
        }
        repo.insert(&paste("later", None, 1, Some(now - Duration::minutes(1))))
            .await
            .unwrap();

        let first = repo.list_expired(now, None, 2).await.unwrap();
        let ids: Vec<_> = first.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        // Rows behind the cursor stay in the table but are not returned again.
        let cursor = ExpiryCursor::new(at, "b");
        let rest = repo.list_expired(now, Some(&cursor), 10).await.unwrap();
        let ids: Vec<_> = rest.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "later"]);
    }

    fn shortlink(id: &str, expires_at: Option<DateTime<Utc>>) -> Shortlink {
        Shortlink {
            id: id.to_string(),
            target_url: "https://example.com".to_string(),
            title: None,
            owner_key: "k".to_string(),
            clicks: 0,
            last_click: None,
            created_at: Utc::now(),
            expires_at,
        }
    }

    #[tokio::test]
    async fn test_record_click_ignores_expired_link() {
        let repo = MemoryShortlinkRepository::new();
        let now = Utc::now();
        repo.insert(&shortlink("live", Some(now + Duration::hours(1))))
            .await
            .unwrap();
        repo.insert(&shortlink("dead", Some(now - Duration::seconds(1))))
            .await
            .unwrap();

        assert!(repo.record_click("live", now).await.unwrap());
        assert!(!repo.record_click("dead", now).await.unwrap());
        assert_eq!(repo.get("live").await.unwrap().unwrap().clicks, 1);
        assert_eq!(repo.get("dead").await.unwrap().unwrap().clicks, 0);
    }

    #[tokio::test]
    async fn test_mark_verified_happens_once() {
        let repo = MemoryApiKeyRepository::new();
        let now = Utc::now();
        repo.insert(&ApiKey {
            key: "k".to_string(),
            email: "a@example.com".to_string(),
            name: "a".to_string(),
            verified: false,
            verify_token: Some("tok".to_string()),
            verify_expiry: Some(now + Duration::hours(24)),
            allow_shortlinks: false,
            created_at: now,
        })
        .await
        .unwrap();

        assert!(repo.find_pending_by_token("tok", now).await.unwrap().is_some());
        assert!(repo.mark_verified("k").await.unwrap());
        assert!(!repo.mark_verified("k").await.unwrap());
        assert!(repo.find_pending_by_token("tok", now).await.unwrap().is_none());
        assert!(repo
            .find_verified_by_email("a@example.com")
            .await
            .unwrap()
            .is_some());
    }
}
