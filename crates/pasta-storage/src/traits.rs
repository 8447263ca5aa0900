//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use pasta_core::models::StorageLocation;
use pasta_core::{AppError, StorageBackend};
use std::io;
use std::pin::Pin;
use thiserror::Error;

// Linux errno values for a full device and an exhausted disk quota
const ENOSPC: i32 = 28;
const EDQUOT: i32 = 122;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    /// Classify an I/O failure, keeping out-of-space conditions distinct.
    pub fn from_io(err: io::Error, context: impl std::fmt::Display) -> Self {
        match err.raw_os_error() {
            Some(ENOSPC) | Some(EDQUOT) => StorageError::QuotaExceeded(format!("{context}: {err}")),
            _ if err.kind() == io::ErrorKind::NotFound => {
                StorageError::NotFound(context.to_string())
            }
            _ => StorageError::Unavailable(format!("{context}: {err}")),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::NotFound(format!("Stored object {}", key)),
            StorageError::QuotaExceeded(msg) => AppError::QuotaExceeded(msg),
            StorageError::InvalidKey(msg) => AppError::Internal(format!("Invalid storage key: {}", msg)),
            other => AppError::StorageUnavailable(other.to_string()),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Chunked content stream returned by [`Storage::get_stream`].
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Storage abstraction trait
///
/// Every backend (filesystem, S3, memory) implements this trait so the paste
/// lifecycle never couples to a specific backend.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store bytes under a newly generated key and return the handle.
    ///
    /// Fails with `Unavailable` or `QuotaExceeded`.
    async fn put(&self, data: Bytes, content_type: &str) -> StorageResult<StorageLocation>;

    /// Read a whole object. Fails with `NotFound` or `Unavailable`.
    async fn get(&self, location: &StorageLocation) -> StorageResult<Bytes>;

    /// Read an object as a stream of chunks.
    async fn get_stream(&self, location: &StorageLocation) -> StorageResult<ByteStream>;

    /// Release an object. A missing object counts as already deleted and
    /// returns `Ok(())`.
    async fn delete(&self, location: &StorageLocation) -> StorageResult<()>;

    /// Check if an object exists
    async fn exists(&self, location: &StorageLocation) -> StorageResult<bool>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}

/// Reject handles created by a different backend.
pub(crate) fn ensure_backend(
    location: &StorageLocation,
    expected: StorageBackend,
) -> StorageResult<()> {
    if location.backend != expected {
        return Err(StorageError::InvalidKey(format!(
            "{} belongs to the {} backend, not {}",
            location, location.backend, expected
        )));
    }
    crate::keys::validate_key(&location.key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_space_maps_to_quota() {
        let err = StorageError::from_io(io::Error::from_raw_os_error(ENOSPC), "write pastes/a");
        assert!(matches!(err, StorageError::QuotaExceeded(_)));
        assert!(matches!(AppError::from(err), AppError::QuotaExceeded(_)));
    }

    #[test]
    fn test_other_io_errors_are_unavailable() {
        let err = StorageError::from_io(
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
            "write pastes/a",
        );
        assert!(matches!(
            AppError::from(err),
            AppError::StorageUnavailable(_)
        ));
    }

    #[test]
    fn test_backend_mismatch_is_rejected() {
        let location = StorageLocation::new(StorageBackend::S3, Some("b".into()), "pastes/x");
        assert!(ensure_backend(&location, StorageBackend::Local).is_err());
        assert!(ensure_backend(&location, StorageBackend::S3).is_ok());
    }
}
