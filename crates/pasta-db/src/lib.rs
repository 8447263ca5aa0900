//! Pasta DB Library
//!
//! Metadata store for pastes, shortlinks and API keys. Services depend on the
//! repository traits; PostgreSQL and in-memory implementations are provided.

pub mod memory;
pub mod postgres;
pub mod setup;
pub mod traits;

pub use memory::{MemoryApiKeyRepository, MemoryPasteRepository, MemoryShortlinkRepository};
pub use postgres::{PgApiKeyRepository, PgPasteRepository, PgShortlinkRepository};
pub use setup::{connect, run_migrations, setup_database};
pub use traits::{ApiKeyRepository, ExpiryCursor, PasteRepository, ShortlinkRepository};
