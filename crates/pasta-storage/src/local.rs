use crate::keys::generate_storage_key;
use crate::traits::{ensure_backend, ByteStream, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use pasta_core::models::StorageLocation;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Local filesystem storage implementation
#[derive(Clone, Debug)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at `base_path`, creating the directory if needed.
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Convert a storage handle to a filesystem path that stays inside `base_path`.
    fn location_to_path(&self, location: &StorageLocation) -> StorageResult<PathBuf> {
        ensure_backend(location, StorageBackend::Local)?;

        let path = self.base_path.join(&location.key);

        let base_canonical = self.base_path.canonicalize().map_err(|e| {
            StorageError::ConfigError(format!("Failed to canonicalize base path: {}", e))
        })?;

        // Only existing files can be canonicalized; new keys were already checked by ensure_backend.
        if let Ok(canonical) = path.canonicalize() {
            if canonical.strip_prefix(&base_canonical).is_err() {
                return Err(StorageError::InvalidKey(
                    "Storage key resolves outside storage directory".to_string(),
                ));
            }
        }

        Ok(path)
    }

    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::from_io(e, parent.display()))?;
        }
        Ok(())
    }

    async fn write_file(path: &Path, data: &[u8]) -> StorageResult<()> {
        let context = path.display();
        let mut file = fs::File::create(path)
            .await
            .map_err(|e| StorageError::from_io(e, format!("create {}", context)))?;
        file.write_all(data)
            .await
            .map_err(|e| StorageError::from_io(e, format!("write {}", context)))?;
        file.sync_all()
            .await
            .map_err(|e| StorageError::from_io(e, format!("sync {}", context)))?;
        Ok(())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn put(&self, data: Bytes, _content_type: &str) -> StorageResult<StorageLocation> {
        let location = StorageLocation::new(StorageBackend::Local, None, generate_storage_key());
        let path = self.location_to_path(&location)?;
        let size = data.len();
        let start = std::time::Instant::now();

        self.ensure_parent_dir(&path).await?;

        if let Err(e) = Self::write_file(&path, &data).await {
            // Do not leave a truncated file behind.
            let _ = fs::remove_file(&path).await;
            tracing::error!(
                error = %e,
                path = %path.display(),
                size_bytes = size,
                "Local storage write failed"
            );
            return Err(e);
        }

        tracing::info!(
            path = %path.display(),
            key = %location.key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage write successful"
        );

        Ok(location)
    }

    async fn get(&self, location: &StorageLocation) -> StorageResult<Bytes> {
        let path = self.location_to_path(location)?;
        let start = std::time::Instant::now();

        let data = fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(location.key.clone()),
            _ => StorageError::from_io(e, format!("read {}", path.display())),
        })?;

        tracing::debug!(
            key = %location.key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage read successful"
        );

        Ok(Bytes::from(data))
    }

    async fn get_stream(&self, location: &StorageLocation) -> StorageResult<ByteStream> {
        let path = self.location_to_path(location)?;

        let file = fs::File::open(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(location.key.clone()),
            _ => StorageError::from_io(e, format!("open {}", path.display())),
        })?;

        let key = location.key.clone();
        let stream = tokio_util::io::ReaderStream::new(file).map(move |result| {
            result.map_err(|e| {
                tracing::error!(error = %e, key = %key, "Local storage stream read error");
                StorageError::Unavailable(format!("Failed to read chunk: {}", e))
            })
        });

        Ok(Box::pin(stream))
    }

    async fn delete(&self, location: &StorageLocation) -> StorageResult<()> {
        let path = self.location_to_path(location)?;
        let start = std::time::Instant::now();

        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(key = %location.key, "Local object already absent");
                return Ok(());
            }
            Err(e) => return Err(StorageError::from_io(e, format!("delete {}", path.display()))),
        }

        tracing::info!(
            path = %path.display(),
            key = %location.key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage delete successful"
        );

        Ok(())
    }

    async fn exists(&self, location: &StorageLocation) -> StorageResult<bool> {
        let path = self.location_to_path(location)?;
        fs::try_exists(&path)
            .await
            .map_err(|e| StorageError::from_io(e, path.display()))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_local_storage_put_get() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let location = storage
            .put(Bytes::from_static(b"test data"), "text/plain")
            .await
            .unwrap();

        assert_eq!(location.backend, StorageBackend::Local);
        assert!(location.key.starts_with("pastes/"));
        assert_eq!(storage.get(&location).await.unwrap(), &b"test data"[..]);
        assert!(storage.exists(&location).await.unwrap());
    }

    #[tokio::test]
    async fn test_each_put_gets_its_own_object() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let a = storage.put(Bytes::from_static(b"same"), "text/plain").await.unwrap();
        let b = storage.put(Bytes::from_static(b"same"), "text/plain").await.unwrap();
        assert_ne!(a.key, b.key);

        storage.delete(&a).await.unwrap();
        assert!(storage.exists(&b).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let location = storage.put(Bytes::from_static(b"x"), "text/plain").await.unwrap();
        storage.delete(&location).await.unwrap();
        storage.delete(&location).await.unwrap();

        assert!(matches!(
            storage.get(&location).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let evil = StorageLocation::new(StorageBackend::Local, None, "../../../etc/passwd");
        assert!(matches!(
            storage.get(&evil).await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            storage.delete(&evil).await,
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_stream_yields_full_content() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        let payload = vec![7u8; 20_000];

        let location = storage
            .put(Bytes::from(payload.clone()), "application/octet-stream")
            .await
            .unwrap();

        let mut stream = storage.get_stream(&location).await.unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, payload);
    }
}
