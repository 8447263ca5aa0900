use crate::keys::generate_storage_key;
use crate::traits::{ensure_backend, ByteStream, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{ObjectStoreExt, PutPayload, Result as ObjectResult};
use pasta_core::models::StorageLocation;

/// S3 storage implementation (AWS or any S3-compatible provider)
#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// `endpoint_url` selects an S3-compatible provider such as MinIO
    /// (e.g. "http://localhost:9000"); credentials come from the environment.
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
    ) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region)
            .with_bucket_name(bucket.clone());

        if let Some(ref endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3Storage { store, bucket })
    }

    fn object_path(&self, location: &StorageLocation) -> StorageResult<Path> {
        ensure_backend(location, StorageBackend::S3)?;
        if location.bucket.as_deref() != Some(self.bucket.as_str()) {
            return Err(StorageError::InvalidKey(format!(
                "{} is not in bucket {}",
                location, self.bucket
            )));
        }
        Ok(Path::from(location.key.as_str()))
    }
}

/// Maps object store failures; out-of-space conditions are not reported
/// distinctly by S3, so everything but NotFound is `Unavailable`.
fn map_store_error(err: ObjectStoreError, key: &str) -> StorageError {
    match err {
        ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
        other => StorageError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn put(&self, data: Bytes, _content_type: &str) -> StorageResult<StorageLocation> {
        let location = StorageLocation::new(
            StorageBackend::S3,
            Some(self.bucket.clone()),
            generate_storage_key(),
        );
        let path = self.object_path(&location)?;
        let size = data.len() as u64;
        let start = std::time::Instant::now();

        let result: ObjectResult<_> = self.store.put(&path, PutPayload::from(data)).await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %location.key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 put failed"
            );
            StorageError::Unavailable(e.to_string())
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %location.key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 put successful"
        );

        Ok(location)
    }

    async fn get(&self, location: &StorageLocation) -> StorageResult<Bytes> {
        let path = self.object_path(location)?;
        let start = std::time::Instant::now();

        let result: ObjectResult<_> = self.store.get(&path).await;
        let result = result.map_err(|e| map_store_error(e, &location.key))?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| map_store_error(e, &location.key))?;

        tracing::debug!(
            bucket = %self.bucket,
            key = %location.key,
            size_bytes = bytes.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 get successful"
        );

        Ok(bytes)
    }

    async fn get_stream(&self, location: &StorageLocation) -> StorageResult<ByteStream> {
        let path = self.object_path(location)?;

        let result: ObjectResult<_> = self.store.get(&path).await;
        let result = result.map_err(|e| map_store_error(e, &location.key))?;

        let bucket = self.bucket.clone();
        let key = location.key.clone();
        let stream = result.into_stream().map(move |res| {
            res.map_err(|e| {
                tracing::error!(error = %e, bucket = %bucket, key = %key, "S3 stream read error");
                StorageError::Unavailable(e.to_string())
            })
        });

        Ok(Box::pin(stream))
    }

    async fn delete(&self, location: &StorageLocation) -> StorageResult<()> {
        let path = self.object_path(location)?;
        let start = std::time::Instant::now();

        let result: ObjectResult<_> = self.store.delete(&path).await;

        match result {
            Ok(()) => {}
            Err(ObjectStoreError::NotFound { .. }) => return Ok(()),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %location.key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 delete failed"
                );
                return Err(StorageError::Unavailable(e.to_string()));
            }
        }

        tracing::info!(
            bucket = %self.bucket,
            key = %location.key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );

        Ok(())
    }

    async fn exists(&self, location: &StorageLocation) -> StorageResult<bool> {
        let path = self.object_path(location)?;
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::Unavailable(e.to_string())),
        }
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_foreign_bucket_is_rejected() {
        let storage = S3Storage::new("pastes".to_string(), "us-east-1".to_string(), None)
            .await
            .unwrap();
        let foreign = StorageLocation::new(StorageBackend::S3, Some("other".into()), "pastes/x");
        assert!(matches!(
            storage.object_path(&foreign),
            Err(StorageError::InvalidKey(_))
        ));

        let own = StorageLocation::new(StorageBackend::S3, Some("pastes".into()), "pastes/x");
        assert_eq!(storage.object_path(&own).unwrap().as_ref(), "pastes/x");
    }

    #[test]
    fn test_not_found_maps_to_not_found() {
        let err = ObjectStoreError::NotFound {
            path: "pastes/x".to_string(),
            source: "missing".into(),
        };
        assert!(matches!(
            map_store_error(err, "pastes/x"),
            StorageError::NotFound(_)
        ));
    }
}
