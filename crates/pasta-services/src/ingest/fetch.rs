//! Remote content fetching for URL uploads.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use pasta_core::{AppError, Config};
use std::time::Duration;

use super::ssrf::{validate_fetch_url, FetchTarget};

/// Body and headers of a successful fetch.
#[derive(Debug, Clone)]
pub struct FetchedContent {
    pub bytes: Bytes,
    pub content_type: Option<String>,
    /// Last path segment of the URL, if any.
    pub filename: Option<String>,
}

/// Downloads content for the URL ingestion path.
///
/// Implementations must enforce their own deadline and size limit. Failures
/// are reported as `FetchFailed`, `FetchStatus` or `PayloadTooLarge` and are
/// never retried here.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str, max_size: u64) -> Result<FetchedContent, AppError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
    allow_private_ips: bool,
    allowlist: Option<Vec<String>>,
}

// Redirects would bypass the SSRF check on the final host.
fn client_builder(timeout: Duration) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(concat!("pasta/", env!("CARGO_PKG_VERSION")))
}

fn build_client(builder: reqwest::ClientBuilder) -> Result<reqwest::Client, AppError> {
    builder
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))
}

impl HttpFetcher {
    pub fn new(
        timeout: Duration,
        allow_private_ips: bool,
        allowlist: Option<Vec<String>>,
    ) -> Result<Self, AppError> {
        Ok(Self {
            client: build_client(client_builder(timeout))?,
            timeout,
            allow_private_ips,
            allowlist,
        })
    }

    /// Client that connects to the validated address rather than resolving
    /// the hostname again.
    fn client_for(&self, target: &FetchTarget) -> Result<reqwest::Client, AppError> {
        match &target.pinned {
            Some((host, addr)) => {
                build_client(client_builder(self.timeout).resolve(host, *addr))
            }
            None => Ok(self.client.clone()),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::new(
            Duration::from_secs(config.fetch_timeout_secs()),
            config.fetch_allow_private(),
            config.fetch_allowlist().map(<[String]>::to_vec),
        )
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    #[tracing::instrument(skip(self), fields(fetch.url = %url))]
    async fn fetch(&self, url: &str, max_size: u64) -> Result<FetchedContent, AppError> {
        let target =
            validate_fetch_url(url, self.allow_private_ips, self.allowlist.as_deref()).await?;
        if let Some((host, addr)) = &target.pinned {
            tracing::debug!(host = %host, addr = %addr, "Pinned fetch to validated address");
        }
        let parsed_url = target.url.clone();

        let response = self
            .client_for(&target)?
            .get(parsed_url.clone())
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, url = %url, "Failed to download from URL");
                if e.is_timeout() {
                    AppError::FetchFailed("Timed out fetching URL".to_string())
                } else {
                    AppError::FetchFailed(format!("Failed to download from URL: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::FetchStatus {
                status: status.as_u16(),
            });
        }

        if let Some(length) = response.content_length() {
            if length > max_size {
                return Err(AppError::PayloadTooLarge(format!(
                    "Remote content is {} bytes, limit is {}",
                    length, max_size
                )));
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);

        // Content-Length can be absent or wrong, so the limit is enforced on the stream.
        let mut body = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                if e.is_timeout() {
                    AppError::FetchFailed("Timed out reading remote content".to_string())
                } else {
                    AppError::FetchFailed(format!("Failed to read response body: {}", e))
                }
            })?;
            if body.len() as u64 + chunk.len() as u64 > max_size {
                return Err(AppError::PayloadTooLarge(format!(
                    "Remote content exceeds limit of {} bytes",
                    max_size
                )));
            }
            body.extend_from_slice(&chunk);
        }

        let filename = parsed_url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        tracing::info!(size_bytes = body.len(), "Fetched remote content");

        Ok(FetchedContent {
            bytes: body.freeze(),
            content_type,
            filename,
        })
    }
}
