//! In-process storage backend for development and tests.

use crate::keys::generate_storage_key;
use crate::traits::{ensure_backend, ByteStream, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use pasta_core::models::StorageLocation;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Chunk size used when streaming an in-memory object.
const STREAM_CHUNK: usize = 64 * 1024;

#[derive(Clone, Default)]
pub struct MemoryStorage {
    objects: Arc<Mutex<HashMap<String, Bytes>>>,
    /// Total byte capacity; `None` is unbounded.
    capacity: Option<u64>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that rejects writes with `QuotaExceeded` past `capacity` bytes.
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            objects: Arc::default(),
            capacity: Some(capacity),
        }
    }

    fn objects(&self) -> MutexGuard<'_, HashMap<String, Bytes>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn object_count(&self) -> usize {
        self.objects().len()
    }

    pub fn used_bytes(&self) -> u64 {
        self.objects().values().map(|b| b.len() as u64).sum()
    }

    pub fn contains(&self, location: &StorageLocation) -> bool {
        self.objects().contains_key(&location.key)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn put(&self, data: Bytes, _content_type: &str) -> StorageResult<StorageLocation> {
        let location = StorageLocation::new(StorageBackend::Memory, None, generate_storage_key());
        let mut objects = self.objects();

        if let Some(capacity) = self.capacity {
            let used: u64 = objects.values().map(|b| b.len() as u64).sum();
            if used + data.len() as u64 > capacity {
                return Err(StorageError::QuotaExceeded(format!(
                    "{} bytes requested, {} of {} bytes in use",
                    data.len(),
                    used,
                    capacity
                )));
            }
        }

        tracing::debug!(key = %location.key, size_bytes = data.len(), "Memory storage write");
        objects.insert(location.key.clone(), data);
        Ok(location)
    }

    async fn get(&self, location: &StorageLocation) -> StorageResult<Bytes> {
        ensure_backend(location, StorageBackend::Memory)?;
        self.objects()
            .get(&location.key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(location.key.clone()))
    }

    async fn get_stream(&self, location: &StorageLocation) -> StorageResult<ByteStream> {
        let data = self.get(location).await?;
        let chunks: Vec<StorageResult<Bytes>> = (0..data.len())
            .step_by(STREAM_CHUNK)
            .map(|start| Ok(data.slice(start..(start + STREAM_CHUNK).min(data.len()))))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn delete(&self, location: &StorageLocation) -> StorageResult<()> {
        ensure_backend(location, StorageBackend::Memory)?;
        self.objects().remove(&location.key);
        Ok(())
    }

    async fn exists(&self, location: &StorageLocation) -> StorageResult<bool> {
        ensure_backend(location, StorageBackend::Memory)?;
        Ok(self.objects().contains_key(&location.key))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_put_get_delete() {
        let storage = MemoryStorage::new();
        let location = storage.put(Bytes::from_static(b"hello"), "text/plain").await.unwrap();

        assert_eq!(storage.get(&location).await.unwrap(), &b"hello"[..]);
        storage.delete(&location).await.unwrap();
        assert!(!storage.exists(&location).await.unwrap());
        assert!(matches!(
            storage.get(&location).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_capacity_is_enforced() {
        let storage = MemoryStorage::with_capacity(8);
        storage.put(Bytes::from_static(b"12345"), "text/plain").await.unwrap();

        let result = storage.put(Bytes::from_static(b"6789"), "text/plain").await;
        assert!(matches!(result, Err(StorageError::QuotaExceeded(_))));
        assert_eq!(storage.object_count(), 1);
        assert_eq!(storage.used_bytes(), 5);
    }

    #[tokio::test]
    async fn test_stream_chunks_cover_object() {
        let storage = MemoryStorage::new();
        let payload = Bytes::from(vec![1u8; STREAM_CHUNK * 2 + 10]);
        let location = storage.put(payload.clone(), "application/octet-stream").await.unwrap();

        let chunks: Vec<_> = storage.get_stream(&location).await.unwrap().collect().await;
        assert_eq!(chunks.len(), 3);
        let total: usize = chunks.iter().map(|c| c.as_ref().unwrap().len()).sum();
        assert_eq!(total, payload.len());
    }
}
