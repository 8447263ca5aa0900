//! Identifier and secret generation
//!
//! Short ids are public and only need to be collision-resistant; callers
//! retry on collision. Delete keys, API keys and verification tokens are
//! bearer secrets. Everything is drawn from the thread-local CSPRNG.

use rand::distr::Alphanumeric;
use rand::Rng;

pub const DEFAULT_ID_LENGTH: usize = 8;
pub const DELETE_KEY_LENGTH: usize = 32;
pub const API_KEY_LENGTH: usize = 32;
pub const VERIFY_TOKEN_LENGTH: usize = 64;

/// Random URL-safe alphanumeric string of `len` characters.
pub fn generate_id(len: usize) -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Source of identifiers for pastes and shortlinks.
pub trait IdGenerator: Send + Sync {
    /// Short public identifier.
    fn short_id(&self) -> String;

    /// High-entropy secret of the given length.
    fn secret(&self, len: usize) -> String {
        generate_id(len)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RandomIdGenerator {
    id_length: usize,
}

impl RandomIdGenerator {
    pub fn new(id_length: usize) -> Self {
        Self { id_length }
    }
}

impl Default for RandomIdGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_ID_LENGTH)
    }
}

impl IdGenerator for RandomIdGenerator {
    fn short_id(&self) -> String {
        generate_id(self.id_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_have_requested_length_and_alphabet() {
        let id = generate_id(DEFAULT_ID_LENGTH);
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(generate_id(VERIFY_TOKEN_LENGTH).len(), 64);
    }

    #[test]
    fn test_secrets_do_not_repeat() {
        let generator = RandomIdGenerator::default();
        let secrets: HashSet<String> = (0..1000).map(|_| generator.secret(DELETE_KEY_LENGTH)).collect();
        assert_eq!(secrets.len(), 1000);
    }
}
