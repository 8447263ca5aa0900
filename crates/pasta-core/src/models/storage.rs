//! Storage location model: backend-agnostic reference to where content is stored.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::storage_types::StorageBackend;

/// Handle to a stored object.
///
/// Carries the backend identity alongside the opaque key so the object can be
/// released (or a compensating delete retried) without the owning paste row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageLocation {
    pub backend: StorageBackend,
    pub bucket: Option<String>,
    pub key: String,
}

impl StorageLocation {
    pub fn new(backend: StorageBackend, bucket: Option<String>, key: impl Into<String>) -> Self {
        Self {
            backend,
            bucket,
            key: key.into(),
        }
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.bucket {
            Some(bucket) => write!(f, "{}://{}/{}", self.backend, bucket, self.key),
            None => write!(f, "{}://{}", self.backend, self.key),
        }
    }
}
