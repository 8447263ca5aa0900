//! Usage statistics.

use pasta_core::AppError;
use pasta_db::{PasteRepository, ShortlinkRepository};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageStats {
    pub pastes: i64,
    pub shortlinks: i64,
    pub stored_bytes: i64,
}

pub struct StatsService {
    pastes: Arc<dyn PasteRepository>,
    shortlinks: Arc<dyn ShortlinkRepository>,
}

impl StatsService {
    pub fn new(pastes: Arc<dyn PasteRepository>, shortlinks: Arc<dyn ShortlinkRepository>) -> Self {
        Self { pastes, shortlinks }
    }

    /// Counts include expired rows that have not been swept yet.
    #[tracing::instrument(skip(self))]
    pub async fn collect(&self) -> Result<UsageStats, AppError> {
        let (pastes, shortlinks, stored_bytes) = tokio::try_join!(
            self.pastes.count(),
            self.shortlinks.count(),
            self.pastes.total_size(),
        )?;
        Ok(UsageStats {
            pastes,
            shortlinks,
            stored_bytes,
        })
    }
}
