//! Pasta Storage Library
//!
//! Storage abstraction for paste content, with filesystem, S3-compatible and
//! in-memory backends.
//!
//! # Storage key format
//!
//! Every stored object gets a fresh key of the form `pastes/{uuid}`. Keys are
//! never derived from content, so one key always belongs to exactly one paste
//! and releasing it cannot affect another paste. Keys must not contain `..` or
//! a leading `/`; generation and validation live in the `keys` module.

pub mod factory;
pub(crate) mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use pasta_core::models::StorageLocation;
pub use pasta_core::StorageBackend;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{ByteStream, Storage, StorageError, StorageResult};
