use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// API key used as a bearer credential by authenticated callers.
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub key: String,
    pub email: String,
    pub name: String,
    pub verified: bool,
    #[serde(skip_serializing)]
    pub verify_token: Option<String>,
    pub verify_expiry: Option<DateTime<Utc>>,
    pub allow_shortlinks: bool,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    /// Unverified keys cannot be used for mutating operations.
    pub fn is_usable(&self) -> bool {
        self.verified
    }
}

// Keys and tokens are credentials and stay out of logs.
impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("key", &"[redacted]")
            .field("email", &self.email)
            .field("name", &self.name)
            .field("verified", &self.verified)
            .field("allow_shortlinks", &self.allow_shortlinks)
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let key = ApiKey {
            key: "supersecretvalue".to_string(),
            email: "dev@example.com".to_string(),
            name: "dev".to_string(),
            verified: false,
            verify_token: Some("token".to_string()),
            verify_expiry: None,
            allow_shortlinks: false,
            created_at: Utc::now(),
        };
        let rendered = format!("{:?}", key);
        assert!(!rendered.contains("supersecretvalue"));
        assert!(!rendered.contains("\"token\""));
    }
}
