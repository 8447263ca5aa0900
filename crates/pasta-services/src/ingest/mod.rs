//! Ingestion normalizer
//!
//! The four upload paths (multipart form, raw body, JSON with inline content,
//! JSON with a source URL) are represented by [`UploadEnvelope`] and converted
//! into one [`NormalizedUpload`] before any lifecycle logic runs.

mod fetch;
mod sniff;
mod ssrf;

pub use fetch::{ContentFetcher, FetchedContent, HttpFetcher};
pub use sniff::{declared_mime_type, sniff_mime_type};
pub use ssrf::{validate_fetch_url, FetchTarget};

use bytes::Bytes;
use pasta_core::models::{ApiKey, ExpiryRequest};
use pasta_core::AppError;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use validator::Validate;

pub const DEFAULT_FILENAME: &str = "paste";
const MAX_EXTENSION_LEN: usize = 16;

/// Caller-supplied upload options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOptions {
    pub extension: Option<String>,
    pub expires_in: Option<ExpiryRequest>,
    pub private: bool,
    pub filename: Option<String>,
}

impl UploadOptions {
    /// Read options from form fields or query parameters
    /// (`ext`, `expires`, `private`, `filename`).
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, AppError> {
        let get = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| fields.get(*name))
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        let private = match get(&["private"]).map(str::to_lowercase).as_deref() {
            None | Some("false") | Some("0") | Some("no") | Some("off") => false,
            Some("true") | Some("1") | Some("yes") | Some("on") => true,
            Some(other) => {
                return Err(AppError::InvalidInput(format!(
                    "Invalid value for private: '{}'",
                    other
                )))
            }
        };

        Ok(Self {
            extension: get(&["ext", "extension"]).map(str::to_string),
            expires_in: ExpiryRequest::from_field(get(&["expires", "expires_in"])),
            private,
            filename: get(&["filename"]).map(str::to_string),
        })
    }
}

/// JSON upload body: exactly one of `content` or `url`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct JsonUploadRequest {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    #[validate(length(max = 2048))]
    pub url: Option<String>,
    #[serde(default)]
    #[validate(length(max = 255))]
    pub filename: Option<String>,
    #[serde(default)]
    #[validate(length(max = 16))]
    pub extension: Option<String>,
    #[serde(default)]
    pub expires_in: Option<String>,
    #[serde(default)]
    pub private: bool,
}

/// One incoming upload, before normalization.
#[derive(Debug, Clone)]
pub enum UploadEnvelope {
    Multipart {
        file: Bytes,
        filename: Option<String>,
        content_type: Option<String>,
        fields: HashMap<String, String>,
    },
    Raw {
        body: Bytes,
        content_type: Option<String>,
        options: UploadOptions,
    },
    JsonContent {
        content: String,
        options: UploadOptions,
    },
    JsonUrl {
        url: String,
        options: UploadOptions,
    },
}

impl UploadEnvelope {
    /// Classify a JSON body. Supplying both `content` and `url`, or neither,
    /// is a validation error.
    pub fn from_json(request: JsonUploadRequest) -> Result<Self, AppError> {
        request.validate()?;

        let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());
        let content = non_empty(request.content);
        let url = non_empty(request.url).map(|u| u.trim().to_string());

        let options = UploadOptions {
            extension: non_empty(request.extension),
            expires_in: ExpiryRequest::from_field(request.expires_in.as_deref()),
            private: request.private,
            filename: non_empty(request.filename),
        };

        match (content, url) {
            (Some(_), Some(_)) => Err(AppError::InvalidInput(
                "Provide either content or url, not both".to_string(),
            )),
            (None, None) => Err(AppError::InvalidInput(
                "Either content or url must be provided".to_string(),
            )),
            (Some(content), None) => Ok(UploadEnvelope::JsonContent { content, options }),
            (None, Some(url)) => Ok(UploadEnvelope::JsonUrl { url, options }),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            UploadEnvelope::Multipart { .. } => "multipart",
            UploadEnvelope::Raw { .. } => "raw",
            UploadEnvelope::JsonContent { .. } => "json_content",
            UploadEnvelope::JsonUrl { .. } => "json_url",
        }
    }
}

/// Canonical new-content request shared by every upload path.
#[derive(Debug, Clone)]
pub struct NormalizedUpload {
    pub bytes: Bytes,
    pub filename: String,
    pub mime_type: String,
    pub options: UploadOptions,
    pub caller: Option<ApiKey>,
}

impl NormalizedUpload {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

pub struct IngestNormalizer {
    fetcher: Arc<dyn ContentFetcher>,
    max_size: u64,
}

impl IngestNormalizer {
    pub fn new(fetcher: Arc<dyn ContentFetcher>, max_size: u64) -> Self {
        Self { fetcher, max_size }
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    #[tracing::instrument(skip(self, envelope, caller), fields(upload.kind = envelope.kind()))]
    pub async fn normalize(
        &self,
        envelope: UploadEnvelope,
        caller: Option<ApiKey>,
    ) -> Result<NormalizedUpload, AppError> {
        let (bytes, source_filename, declared_type, options) = match envelope {
            UploadEnvelope::Multipart {
                file,
                filename,
                content_type,
                fields,
            } => (file, filename, content_type, UploadOptions::from_fields(&fields)?),
            UploadEnvelope::Raw {
                body,
                content_type,
                options,
            } => (body, None, content_type, options),
            UploadEnvelope::JsonContent { content, options } => {
                (Bytes::from(content), None, None, options)
            }
            UploadEnvelope::JsonUrl { url, options } => {
                let fetched = self.fetcher.fetch(&url, self.max_size).await?;
                (fetched.bytes, fetched.filename, fetched.content_type, options)
            }
        };

        if bytes.is_empty() {
            return Err(AppError::InvalidInput("Empty content".to_string()));
        }
        if bytes.len() as u64 > self.max_size {
            return Err(AppError::PayloadTooLarge(format!(
                "Content is {} bytes, limit is {}",
                bytes.len(),
                self.max_size
            )));
        }

        let mut options = options;
        options.extension = options
            .extension
            .as_deref()
            .map(normalize_extension)
            .transpose()?
            .flatten();

        let filename = options
            .filename
            .as_deref()
            .or(source_filename.as_deref())
            .and_then(sanitize_filename)
            .unwrap_or_else(|| DEFAULT_FILENAME.to_string());

        let mime_type = declared_mime_type(declared_type.as_deref())
            .unwrap_or_else(|| sniff_mime_type(&bytes).to_string());

        tracing::debug!(
            size_bytes = bytes.len(),
            mime_type = %mime_type,
            filename = %filename,
            "Upload normalized"
        );

        Ok(NormalizedUpload {
            bytes,
            filename,
            mime_type,
            options,
            caller,
        })
    }
}

/// Strip directory components and control characters. `None` if nothing is left.
fn sanitize_filename(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let cleaned: String = base.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        None
    } else {
        Some(cleaned.chars().take(255).collect())
    }
}

fn normalize_extension(raw: &str) -> Result<Option<String>, AppError> {
    let ext = raw.trim().trim_start_matches('.').to_lowercase();
    if ext.is_empty() {
        return Ok(None);
    }
    if ext.len() > MAX_EXTENSION_LEN
        || !ext
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '_')
    {
        return Err(AppError::InvalidInput(format!("Invalid extension '{}'", raw)));
    }
    Ok(Some(ext))
}
