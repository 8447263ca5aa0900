use pasta_core::{AppError, Clock};
use pasta_db::{ExpiryCursor, PasteRepository, ShortlinkRepository};
use pasta_infra::RateLimiter;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{interval, MissedTickBehavior};

use crate::paste::PasteService;
use crate::shortlink::ShortlinkService;

/// Upper bound on batches per entity kind in one run.
const MAX_BATCHES_PER_RUN: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupState {
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub pastes_deleted: usize,
    pub pastes_failed: usize,
    pub shortlinks_deleted: usize,
    pub shortlinks_failed: usize,
    pub rate_limit_buckets_evicted: usize,
}

impl CleanupReport {
    pub fn total_deleted(&self) -> usize {
        self.pastes_deleted + self.shortlinks_deleted
    }

    pub fn total_failed(&self) -> usize {
        self.pastes_failed + self.shortlinks_failed
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct SweepCount {
    deleted: usize,
    failed: usize,
}

/// Periodic sweep of expired pastes and shortlinks.
///
/// Items are removed through the same public purge operations used by the
/// lifecycle services, so storage is always released before metadata.
pub struct CleanupService {
    paste_repository: Arc<dyn PasteRepository>,
    shortlink_repository: Arc<dyn ShortlinkRepository>,
    pastes: Arc<PasteService>,
    shortlinks: Arc<ShortlinkService>,
    rate_limiters: Vec<Arc<RateLimiter>>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    batch_size: u32,
    running: AtomicBool,
}

/// Resets the running flag when a run ends, including by panic.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl CleanupService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        paste_repository: Arc<dyn PasteRepository>,
        shortlink_repository: Arc<dyn ShortlinkRepository>,
        pastes: Arc<PasteService>,
        shortlinks: Arc<ShortlinkService>,
        rate_limiters: Vec<Arc<RateLimiter>>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        batch_size: u32,
    ) -> Self {
        Self {
            paste_repository,
            shortlink_repository,
            pastes,
            shortlinks,
            rate_limiters,
            clock,
            interval: interval.max(Duration::from_secs(1)),
            batch_size: batch_size.max(1),
            running: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> CleanupState {
        if self.running.load(Ordering::Acquire) {
            CleanupState::Running
        } else {
            CleanupState::Idle
        }
    }

    /// Start the background sweep. Each tick runs on its own task; a tick that
    /// fires while the previous run is still going is skipped.
    /// Returns a JoinHandle for graceful shutdown
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut cleanup_interval = interval(self.interval);
            cleanup_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                cleanup_interval.tick().await;
                let service = Arc::clone(&self);
                tokio::spawn(async move {
                    service.run_once().await;
                });
            }
        })
    }

    /// Run one sweep. Returns `None` if another sweep is already running.
    #[tracing::instrument(skip(self), fields(cleanup.operation = "expire_all"))]
    pub async fn run_once(&self) -> Option<CleanupReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!("Previous cleanup still running, skipping this tick");
            return None;
        }
        let _guard = RunGuard(&self.running);

        let started = Instant::now();
        tracing::info!("Starting scheduled cleanup of expired content");

        let pastes = self.sweep_pastes().await;
        let shortlinks = self.sweep_shortlinks().await;

        let mut rate_limit_buckets_evicted = 0;
        for limiter in &self.rate_limiters {
            rate_limit_buckets_evicted += limiter.cleanup_expired_buckets().await;
        }

        let report = CleanupReport {
            pastes_deleted: pastes.deleted,
            pastes_failed: pastes.failed,
            shortlinks_deleted: shortlinks.deleted,
            shortlinks_failed: shortlinks.failed,
            rate_limit_buckets_evicted,
        };
        tracing::info!(
            pastes_deleted = report.pastes_deleted,
            pastes_failed = report.pastes_failed,
            shortlinks_deleted = report.shortlinks_deleted,
            shortlinks_failed = report.shortlinks_failed,
            rate_limit_buckets_evicted,
            duration_ms = started.elapsed().as_millis() as u64,
            "Cleanup completed"
        );
        Some(report)
    }

    /// Pages through expired pastes by `(expires_at, id)`. Rows that fail
    /// to delete stay behind the cursor and are retried on the next run.
    #[tracing::instrument(skip(self), fields(cleanup.kind = "pastes"))]
    async fn sweep_pastes(&self) -> SweepCount {
        let mut count = SweepCount::default();
        let now = self.clock.now();
        let mut cursor: Option<ExpiryCursor> = None;
        for _ in 0..MAX_BATCHES_PER_RUN {
            let expired = match self
                .paste_repository
                .list_expired(now, cursor.as_ref(), self.batch_size)
                .await
            {
                Ok(expired) => expired,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to list expired pastes");
                    break;
                }
            };
            let batch_len = expired.len();
            let next = expired
                .last()
                .and_then(|p| p.expires_at.map(|at| ExpiryCursor::new(at, p.id.clone())));

            for paste in expired {
                tracing::info!(
                    paste_id = %paste.id,
                    storage_key = %paste.location.key,
                    expires_at = ?paste.expires_at,
                    "Deleting expired paste"
                );
                record(&mut count, self.pastes.purge_expired(&paste.id).await, &paste.id);
            }

            match next {
                Some(next) if batch_len >= self.batch_size as usize => cursor = Some(next),
                _ => break,
            }
        }
        count
    }

    #[tracing::instrument(skip(self), fields(cleanup.kind = "shortlinks"))]
    async fn sweep_shortlinks(&self) -> SweepCount {
        let mut count = SweepCount::default();
        let now = self.clock.now();
        let mut cursor: Option<ExpiryCursor> = None;
        for _ in 0..MAX_BATCHES_PER_RUN {
            let expired = match self
                .shortlink_repository
                .list_expired(now, cursor.as_ref(), self.batch_size)
                .await
            {
                Ok(expired) => expired,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to list expired shortlinks");
                    break;
                }
            };
            let batch_len = expired.len();
            let next = expired
                .last()
                .and_then(|l| l.expires_at.map(|at| ExpiryCursor::new(at, l.id.clone())));

            for link in expired {
                tracing::info!(shortlink_id = %link.id, expires_at = ?link.expires_at, "Deleting expired shortlink");
                record(&mut count, self.shortlinks.purge_expired(&link.id).await, &link.id);
            }

            match next {
                Some(next) if batch_len >= self.batch_size as usize => cursor = Some(next),
                _ => break,
            }
        }
        count
    }
}

fn record(count: &mut SweepCount, outcome: Result<bool, AppError>, id: &str) {
    match outcome {
        Ok(true) => count.deleted += 1,
        Ok(false) => tracing::debug!(id = %id, "Already removed or no longer expired"),
        Err(e) => {
            count.failed += 1;
            tracing::warn!(id = %id, error = %e, "Failed to delete expired item, continuing");
        }
    }
}
