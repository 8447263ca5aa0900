use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Caller's expiry request, before policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryRequest {
    /// Keep until explicitly deleted. Only callers with an API key may ask for this.
    Never,
    /// A duration such as `"24h"` or `"1d12h"`, parsed by the retention policy.
    Duration(String),
}

impl ExpiryRequest {
    /// Interprets an optional `expires_in` field; blank values mean "no request".
    pub fn from_field(value: Option<&str>) -> Option<Self> {
        let value = value?.trim();
        if value.is_empty() {
            None
        } else if value.eq_ignore_ascii_case("never") {
            Some(ExpiryRequest::Never)
        } else {
            Some(ExpiryRequest::Duration(value.to_string()))
        }
    }
}

/// Resolved expiry: always concrete, never a duration left to resolve later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expiry {
    Never,
    At(DateTime<Utc>),
}

impl Expiry {
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Expiry::Never => None,
            Expiry::At(at) => Some(*at),
        }
    }
}

impl From<Option<DateTime<Utc>>> for Expiry {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        value.map(Expiry::At).unwrap_or(Expiry::Never)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_field() {
        assert_eq!(ExpiryRequest::from_field(None), None);
        assert_eq!(ExpiryRequest::from_field(Some("  ")), None);
        assert_eq!(
            ExpiryRequest::from_field(Some("NEVER")),
            Some(ExpiryRequest::Never)
        );
        assert_eq!(
            ExpiryRequest::from_field(Some("24h")),
            Some(ExpiryRequest::Duration("24h".to_string()))
        );
    }
}
