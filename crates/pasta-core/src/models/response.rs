use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Paste, Shortlink};

/// Paste as returned to clients, with absolute links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasteResponse {
    pub id: String,
    pub filename: String,
    pub extension: Option<String>,
    pub mime_type: String,
    pub size: i64,
    pub private: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub url: String,
    pub raw_url: String,
    pub download_url: String,
    /// Only present in the creation response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_url: Option<String>,
}

impl PasteResponse {
    pub fn from_paste(paste: &Paste, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            id: paste.id.clone(),
            filename: paste.filename.clone(),
            extension: paste.extension.clone(),
            mime_type: paste.mime_type.clone(),
            size: paste.size,
            private: paste.private,
            created_at: paste.created_at,
            expires_at: paste.expires_at,
            url: format!("{}/{}", base, paste.id),
            raw_url: format!("{}/raw/{}", base, paste.id),
            download_url: format!("{}/download/{}", base, paste.id),
            delete_url: None,
        }
    }

    pub fn with_delete_url(mut self, paste: &Paste, base_url: &str) -> Self {
        self.delete_url = Some(format!(
            "{}/delete/{}/{}",
            base_url.trim_end_matches('/'),
            paste.id,
            paste.delete_key
        ));
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortlinkResponse {
    pub id: String,
    pub target_url: String,
    pub title: Option<String>,
    pub clicks: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub url: String,
}

impl ShortlinkResponse {
    pub fn from_shortlink(link: &Shortlink, base_url: &str) -> Self {
        Self {
            id: link.id.clone(),
            target_url: link.target_url.clone(),
            title: link.title.clone(),
            clicks: link.clicks,
            created_at: link.created_at,
            expires_at: link.expires_at,
            url: format!("{}/{}", base_url.trim_end_matches('/'), link.id),
        }
    }
}
