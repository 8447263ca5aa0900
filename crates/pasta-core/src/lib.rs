//! Pasta Core Library
//!
//! Domain models, error types, configuration and the clock abstraction shared
//! by every Pasta component.

pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ServiceConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use storage_types::StorageBackend;
