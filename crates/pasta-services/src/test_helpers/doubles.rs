use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use pasta_core::models::{PageRequest, Paste, Shortlink, StorageLocation};
use pasta_core::{AppError, StorageBackend};
use pasta_db::{
    ExpiryCursor, MemoryPasteRepository, MemoryShortlinkRepository, PasteRepository,
    ShortlinkRepository,
};
use pasta_storage::{ByteStream, Storage, StorageError, StorageResult};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::api_key::VerificationNotifier;
use crate::ids::{generate_id, IdGenerator, DEFAULT_ID_LENGTH};
use crate::ingest::{ContentFetcher, FetchedContent};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Fetcher serving canned bodies. Errors are one-shot.
#[derive(Clone, Default)]
pub struct StubFetcher {
    bodies: Arc<Mutex<HashMap<String, Bytes>>>,
    errors: Arc<Mutex<HashMap<String, AppError>>>,
    calls: Arc<AtomicUsize>,
}

impl StubFetcher {
    pub fn with_response(self, url: &str, body: &[u8]) -> Self {
        self.add_response(url, body);
        self
    }

    /// Register a body on a fetcher that is already shared.
    pub fn add_response(&self, url: &str, body: &[u8]) {
        lock(&self.bodies).insert(url.to_string(), Bytes::copy_from_slice(body));
    }

    pub fn with_error(self, url: &str, error: AppError) -> Self {
        self.add_error(url, error);
        self
    }

    pub fn add_error(&self, url: &str, error: AppError) {
        lock(&self.errors).insert(url.to_string(), error);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentFetcher for StubFetcher {
    async fn fetch(&self, url: &str, max_size: u64) -> Result<FetchedContent, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = lock(&self.errors).remove(url) {
            return Err(error);
        }
        let bytes = lock(&self.bodies)
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::FetchFailed(format!("No stub for {}", url)))?;
        if bytes.len() as u64 > max_size {
            return Err(AppError::PayloadTooLarge(format!(
                "Remote content exceeds limit of {} bytes",
                max_size
            )));
        }
        let filename = url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty() && !s.contains(':'))
            .map(str::to_string);
        Ok(FetchedContent {
            bytes,
            content_type: None,
            filename,
        })
    }
}

/// Storage wrapper with switchable failures.
pub struct FlakyStorage {
    inner: Arc<dyn Storage>,
    fail_put: AtomicBool,
    fail_get: AtomicBool,
    fail_delete: AtomicBool,
    deletes: AtomicUsize,
}

impl FlakyStorage {
    pub fn new(inner: Arc<dyn Storage>) -> Self {
        Self {
            inner,
            fail_put: AtomicBool::new(false),
            fail_get: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_put.store(fail, Ordering::SeqCst);
    }

    pub fn fail_gets(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    /// Delete calls that reached the inner storage.
    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    fn unavailable(op: &str) -> StorageError {
        StorageError::Unavailable(format!("injected {} failure", op))
    }
}

#[async_trait]
impl Storage for FlakyStorage {
    async fn put(&self, data: Bytes, content_type: &str) -> StorageResult<StorageLocation> {
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(Self::unavailable("put"));
        }
        self.inner.put(data, content_type).await
    }

    async fn get(&self, location: &StorageLocation) -> StorageResult<Bytes> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(Self::unavailable("get"));
        }
        self.inner.get(location).await
    }

    async fn get_stream(&self, location: &StorageLocation) -> StorageResult<ByteStream> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(Self::unavailable("get"));
        }
        self.inner.get_stream(location).await
    }

    async fn delete(&self, location: &StorageLocation) -> StorageResult<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(Self::unavailable("delete"));
        }
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(location).await
    }

    async fn exists(&self, location: &StorageLocation) -> StorageResult<bool> {
        self.inner.exists(location).await
    }

    fn backend_type(&self) -> StorageBackend {
        self.inner.backend_type()
    }
}

/// In-memory paste repository with injectable insert failures.
#[derive(Default)]
pub struct FailingPasteRepository {
    inner: MemoryPasteRepository,
    fail_inserts: AtomicBool,
    fail_deletes: AtomicBool,
    /// Number of upcoming inserts that report `Conflict`, as if another
    /// request had taken the id first.
    pending_conflicts: AtomicUsize,
    /// Parks the next `list_expired` call: `(entered, release)`.
    sweep_gate: Mutex<Option<(Arc<Notify>, Arc<Notify>)>>,
}

impl FailingPasteRepository {
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn conflict_next_inserts(&self, n: usize) {
        self.pending_conflicts.store(n, Ordering::SeqCst);
    }

    /// Makes the next `list_expired` call signal `entered` and then wait
    /// until `release` is notified.
    pub fn hold_list_expired(&self) -> (Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        *lock(&self.sweep_gate) = Some((entered.clone(), release.clone()));
        (entered, release)
    }

    pub fn inner(&self) -> &MemoryPasteRepository {
        &self.inner
    }
}

#[async_trait]
impl PasteRepository for FailingPasteRepository {
    async fn insert(&self, paste: &Paste) -> Result<(), AppError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(AppError::Persistence("injected insert failure".to_string()));
        }
        let conflict = self
            .pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if conflict {
            return Err(AppError::Conflict("injected id conflict".to_string()));
        }
        self.inner.insert(paste).await
    }

    async fn get(&self, id: &str) -> Result<Option<Paste>, AppError> {
        self.inner.get(id).await
    }

    async fn exists(&self, id: &str) -> Result<bool, AppError> {
        self.inner.exists(id).await
    }

    async fn update_expiry(
        &self,
        id: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Paste>, AppError> {
        self.inner.update_expiry(id, expires_at).await
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(AppError::Persistence("injected delete failure".to_string()));
        }
        self.inner.delete(id).await
    }

    async fn list_by_owner(
        &self,
        owner_key: &str,
        page: &PageRequest,
        now: DateTime<Utc>,
    ) -> Result<(Vec<Paste>, i64), AppError> {
        self.inner.list_by_owner(owner_key, page, now).await
    }

    async fn list_expired(
        &self,
        now: DateTime<Utc>,
        after: Option<&ExpiryCursor>,
        limit: u32,
    ) -> Result<Vec<Paste>, AppError> {
        let gate = lock(&self.sweep_gate).take();
        if let Some((entered, release)) = gate {
            entered.notify_one();
            release.notified().await;
        }
        self.inner.list_expired(now, after, limit).await
    }

    async fn count(&self) -> Result<i64, AppError> {
        self.inner.count().await
    }

    async fn total_size(&self) -> Result<i64, AppError> {
        self.inner.total_size().await
    }
}

/// In-memory shortlink repository whose click recording can be broken.
#[derive(Default)]
pub struct FlakyShortlinkRepository {
    inner: MemoryShortlinkRepository,
    fail_clicks: AtomicBool,
}

impl FlakyShortlinkRepository {
    pub fn fail_clicks(&self, fail: bool) {
        self.fail_clicks.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ShortlinkRepository for FlakyShortlinkRepository {
    async fn insert(&self, link: &Shortlink) -> Result<(), AppError> {
        self.inner.insert(link).await
    }

    async fn get(&self, id: &str) -> Result<Option<Shortlink>, AppError> {
        self.inner.get(id).await
    }

    async fn exists(&self, id: &str) -> Result<bool, AppError> {
        self.inner.exists(id).await
    }

    async fn update_expiry(
        &self,
        id: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Shortlink>, AppError> {
        self.inner.update_expiry(id, expires_at).await
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        self.inner.delete(id).await
    }

    async fn record_click(&self, id: &str, at: DateTime<Utc>) -> Result<bool, AppError> {
        if self.fail_clicks.load(Ordering::SeqCst) {
            return Err(AppError::Persistence("injected click failure".to_string()));
        }
        self.inner.record_click(id, at).await
    }

    async fn list_by_owner(
        &self,
        owner_key: &str,
        page: &PageRequest,
        now: DateTime<Utc>,
    ) -> Result<(Vec<Shortlink>, i64), AppError> {
        self.inner.list_by_owner(owner_key, page, now).await
    }

    async fn list_expired(
        &self,
        now: DateTime<Utc>,
        after: Option<&ExpiryCursor>,
        limit: u32,
    ) -> Result<Vec<Shortlink>, AppError> {
        self.inner.list_expired(now, after, limit).await
    }

    async fn count(&self) -> Result<i64, AppError> {
        self.inner.count().await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentVerification {
    pub email: String,
    pub name: String,
    pub verify_url: String,
}

impl SentVerification {
    pub fn token(&self) -> &str {
        self.verify_url.rsplit('/').next().unwrap_or_default()
    }
}

/// Notifier that records messages instead of sending them.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentVerification>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn fail_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentVerification> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl VerificationNotifier for RecordingNotifier {
    async fn send_verification(
        &self,
        email: &str,
        name: &str,
        verify_url: &str,
    ) -> Result<(), AppError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::ServiceUnavailable("injected send failure".to_string()));
        }
        lock(&self.sent).push(SentVerification {
            email: email.to_string(),
            name: name.to_string(),
            verify_url: verify_url.to_string(),
        });
        Ok(())
    }
}

/// Hands out queued ids first, then random ones.
#[derive(Default)]
pub struct SequenceIdGenerator {
    queued: Mutex<VecDeque<String>>,
}

impl SequenceIdGenerator {
    pub fn push(&self, ids: &[&str]) {
        lock(&self.queued).extend(ids.iter().map(|id| id.to_string()));
    }
}

impl IdGenerator for SequenceIdGenerator {
    fn short_id(&self) -> String {
        lock(&self.queued)
            .pop_front()
            .unwrap_or_else(|| generate_id(DEFAULT_ID_LENGTH))
    }
}
