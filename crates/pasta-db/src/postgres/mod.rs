mod api_key;
mod paste;
mod shortlink;

pub use api_key::PgApiKeyRepository;
pub use paste::PgPasteRepository;
pub use shortlink::PgShortlinkRepository;

use pasta_core::AppError;

/// Unique-key violations become `Conflict`; everything else stays a database error.
pub(crate) fn map_insert_error(err: sqlx::Error, what: &str) -> AppError {
    let is_unique = err
        .as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false);
    if is_unique {
        AppError::Conflict(format!("{} already exists", what))
    } else {
        AppError::Database(err)
    }
}
