use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::StorageLocation;

/// A stored content object addressable by its short id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paste {
    pub id: String,
    pub location: StorageLocation,
    pub filename: String,
    pub extension: Option<String>,
    pub mime_type: String,
    pub size: i64,
    pub owner_key: Option<String>,
    #[serde(skip_serializing)]
    pub delete_key: String,
    pub private: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Paste {
    /// Lazy expiry: a paste past its expiry is treated as absent.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }

    pub fn is_owned_by(&self, key: &str) -> bool {
        self.owner_key.as_deref() == Some(key)
    }

    pub fn is_text(&self) -> bool {
        self.mime_type.starts_with("text/")
    }

    /// Content type for raw responses. Text is always served as plain UTF-8.
    pub fn display_content_type(&self) -> &str {
        if self.is_text() {
            "text/plain; charset=utf-8"
        } else {
            &self.mime_type
        }
    }

    /// Filename for download responses, with the declared extension appended
    /// when the filename does not already carry it.
    pub fn download_filename(&self) -> String {
        match self.extension.as_deref() {
            Some(ext) if !ext.is_empty() && !self.filename.ends_with(&format!(".{ext}")) => {
                format!("{}.{}", self.filename, ext)
            }
            _ => self.filename.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageBackend;
    use chrono::Duration;

    fn paste(mime: &str, filename: &str, extension: Option<&str>) -> Paste {
        let now = Utc::now();
        Paste {
            id: "abcd1234".to_string(),
            location: StorageLocation::new(StorageBackend::Memory, None, "pastes/x"),
            filename: filename.to_string(),
            extension: extension.map(str::to_string),
            mime_type: mime.to_string(),
            size: 3,
            owner_key: None,
            delete_key: "secret".to_string(),
            private: false,
            created_at: now,
            expires_at: Some(now + Duration::days(1)),
        }
    }

    #[test]
    fn test_text_is_served_as_plain_utf8() {
        assert_eq!(
            paste("text/markdown", "readme", None).display_content_type(),
            "text/plain; charset=utf-8"
        );
        assert_eq!(
            paste("image/png", "cat", None).display_content_type(),
            "image/png"
        );
    }

    #[test]
    fn test_download_filename_appends_extension_once() {
        assert_eq!(paste("text/plain", "main", Some("rs")).download_filename(), "main.rs");
        assert_eq!(paste("text/plain", "main.rs", Some("rs")).download_filename(), "main.rs");
        assert_eq!(paste("text/plain", "paste", None).download_filename(), "paste");
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let p = paste("text/plain", "paste", None);
        let at = p.expires_at.unwrap();
        assert!(!p.is_expired(at - Duration::seconds(1)));
        assert!(p.is_expired(at));
    }

    #[test]
    fn test_delete_key_is_never_serialized() {
        let json = serde_json::to_string(&paste("text/plain", "paste", None)).unwrap();
        assert!(!json.contains("secret"));
    }
}
