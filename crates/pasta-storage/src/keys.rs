//! Shared key generation for storage backends.

use uuid::Uuid;

use crate::traits::{StorageError, StorageResult};

const KEY_PREFIX: &str = "pastes";

/// Generate a fresh storage key (`pastes/{uuid}`).
pub fn generate_storage_key() -> String {
    format!("{}/{}", KEY_PREFIX, Uuid::new_v4())
}

/// Reject keys that could escape the backend's namespace.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.contains("..") || key.starts_with('/') || key.contains('\\') {
        return Err(StorageError::InvalidKey(format!(
            "Storage key contains invalid characters: {}",
            key
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_are_unique_and_valid() {
        let a = generate_storage_key();
        let b = generate_storage_key();
        assert_ne!(a, b);
        assert!(a.starts_with("pastes/"));
        assert!(validate_key(&a).is_ok());
    }

    #[test]
    fn test_traversal_is_rejected() {
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("/abs").is_err());
        assert!(validate_key("").is_err());
    }
}
