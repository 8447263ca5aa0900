use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Redirect from a short id to a target URL, with click counting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shortlink {
    pub id: String,
    pub target_url: String,
    pub title: Option<String>,
    pub owner_key: String,
    pub clicks: i64,
    pub last_click: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Shortlink {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }

    pub fn is_owned_by(&self, key: &str) -> bool {
        self.owner_key == key
    }
}

/// Owner-visible analytics for a shortlink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortlinkStats {
    pub id: String,
    pub target_url: String,
    pub title: Option<String>,
    pub clicks: i64,
    pub last_click: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<&Shortlink> for ShortlinkStats {
    fn from(link: &Shortlink) -> Self {
        Self {
            id: link.id.clone(),
            target_url: link.target_url.clone(),
            title: link.title.clone(),
            clicks: link.clicks,
            last_click: link.last_click,
            created_at: link.created_at,
            expires_at: link.expires_at,
        }
    }
}
