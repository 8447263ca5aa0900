//! Retention policy evaluation
//!
//! Turns an upload's size, ownership and optional expiry request into a
//! concrete [`Expiry`]. Default retention shrinks with size:
//!
//! ```text
//! days = min + (min - max) * (size / max_size - 1)^3
//! ```
//!
//! clamped to `[min, max]`, so empty-ish uploads get close to `max` days and
//! uploads at the size limit get `min` days.

use chrono::{DateTime, Duration, Utc};
use pasta_core::config::RetentionRange;
use pasta_core::models::{Expiry, ExpiryRequest};
use pasta_core::{AppError, Config};
use serde::Serialize;

use crate::duration::parse_duration;

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    no_key: RetentionRange,
    with_key: RetentionRange,
    max_size: u64,
}

/// One row of the published retention table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RetentionSample {
    pub size_bytes: u64,
    pub no_key_days: f64,
    pub with_key_days: f64,
}

impl RetentionPolicy {
    pub fn new(no_key: RetentionRange, with_key: RetentionRange, max_size: u64) -> Self {
        Self {
            no_key,
            with_key,
            max_size: max_size.max(1),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.retention_no_key(),
            config.retention_with_key(),
            config.max_upload_size_bytes(),
        )
    }

    fn range(&self, has_owner: bool) -> RetentionRange {
        if has_owner {
            self.with_key
        } else {
            self.no_key
        }
    }

    /// Default retention in days for an upload of `size` bytes.
    pub fn default_days(&self, size: u64, has_owner: bool) -> f64 {
        let range = self.range(has_owner);
        let min = range.min_days as f64;
        let max = range.max_days as f64;
        let ratio = (size as f64 / self.max_size as f64).min(1.0);
        let days = min + (min - max) * (ratio - 1.0).powi(3);
        days.clamp(min, max)
    }

    pub fn default_retention(&self, size: u64, has_owner: bool) -> Duration {
        days_to_duration(self.default_days(size, has_owner))
    }

    /// Hard ceiling applied to every anonymous upload.
    pub fn max_anonymous_retention(&self) -> Duration {
        Duration::days(self.no_key.max_days as i64)
    }

    /// Resolve the effective expiry for an upload.
    ///
    /// `never` is only granted to owners; anonymous durations are capped at
    /// [`max_anonymous_retention`](Self::max_anonymous_retention).
    pub fn evaluate(
        &self,
        size: u64,
        has_owner: bool,
        requested: Option<&ExpiryRequest>,
        now: DateTime<Utc>,
    ) -> Result<Expiry, AppError> {
        match requested {
            Some(ExpiryRequest::Never) if has_owner => Ok(Expiry::Never),
            Some(ExpiryRequest::Never) => Err(AppError::PolicyRejected(
                "Pastes without an API key cannot be kept forever".to_string(),
            )),
            Some(ExpiryRequest::Duration(raw)) => {
                let mut duration = parse_duration(raw)?;
                if !has_owner {
                    duration = duration.min(self.max_anonymous_retention());
                }
                Ok(Expiry::At(now + duration))
            }
            None => Ok(Expiry::At(now + self.default_retention(size, has_owner))),
        }
    }

    /// Evenly spaced samples across `0..=max_size`.
    pub fn table(&self, points: usize) -> Vec<RetentionSample> {
        let points = points.max(2);
        (0..points)
            .map(|i| {
                let size_bytes = self.max_size * i as u64 / (points as u64 - 1);
                RetentionSample {
                    size_bytes,
                    no_key_days: self.default_days(size_bytes, false),
                    with_key_days: self.default_days(size_bytes, true),
                }
            })
            .collect()
    }
}

fn days_to_duration(days: f64) -> Duration {
    Duration::seconds((days * SECONDS_PER_DAY) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn policy() -> RetentionPolicy {
        RetentionPolicy::new(
            RetentionRange {
                min_days: 7,
                max_days: 128,
            },
            RetentionRange {
                min_days: 30,
                max_days: 730,
            },
            64 * MIB,
        )
    }

    #[test]
    fn test_default_days_bounds() {
        let p = policy();
        assert_eq!(p.default_days(0, false), 128.0);
        assert_eq!(p.default_days(64 * MIB, false), 7.0);
        assert_eq!(p.default_days(0, true), 730.0);
        assert_eq!(p.default_days(64 * MIB, true), 30.0);
        // Sizes above the limit clamp to the minimum.
        assert_eq!(p.default_days(128 * MIB, false), 7.0);
    }

    #[test]
    fn test_default_days_non_increasing() {
        let p = policy();
        let mut previous = f64::MAX;
        for size in (0..=64 * MIB).step_by(MIB as usize) {
            let days = p.default_days(size, false);
            assert!(days <= previous);
            previous = days;
        }
    }

    #[test]
    fn test_never_requires_owner() {
        let p = policy();
        let now = Utc::now();
        assert_eq!(
            p.evaluate(10, true, Some(&ExpiryRequest::Never), now).unwrap(),
            Expiry::Never
        );
        let err = p
            .evaluate(10, false, Some(&ExpiryRequest::Never), now)
            .unwrap_err();
        assert!(matches!(err, AppError::PolicyRejected(_)));
    }

    #[test]
    fn test_anonymous_duration_is_capped() {
        let p = policy();
        let now = Utc::now();
        let request = ExpiryRequest::Duration("52w".to_string());
        let anonymous = p.evaluate(10, false, Some(&request), now).unwrap();
        assert_eq!(anonymous, Expiry::At(now + Duration::days(128)));
        let keyed = p.evaluate(10, true, Some(&request), now).unwrap();
        assert_eq!(keyed, Expiry::At(now + Duration::weeks(52)));
    }

    #[test]
    fn test_bad_duration_is_distinct_from_policy() {
        let p = policy();
        let err = p
            .evaluate(
                10,
                false,
                Some(&ExpiryRequest::Duration("soon".to_string())),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidDuration(_)));
    }

    #[test]
    fn test_table_spans_full_range() {
        let table = policy().table(5);
        assert_eq!(table.len(), 5);
        assert_eq!(table[0].size_bytes, 0);
        assert_eq!(table[4].size_bytes, 64 * MIB);
        assert_eq!(table[4].no_key_days, 7.0);
    }
}
