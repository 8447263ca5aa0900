//! Wiring shared by the `pasta` binary: service construction from
//! configuration, upload argument handling and output helpers.

use anyhow::Context;
use bytes::Bytes;
use pasta_core::{Config, SystemClock};
use pasta_db::{PgApiKeyRepository, PgPasteRepository, PgShortlinkRepository};
use pasta_infra::RateLimiter;
use pasta_services::{
    EmailNotifier, HttpFetcher, JsonUploadRequest, ListLimits, PastaServices, RandomIdGenerator,
    ServiceContext, UploadEnvelope, VerificationNotifier,
};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Connect to the database and storage backend and build every service.
/// Migrations are not applied here; `pasta migrate` does that.
pub async fn build_services(config: &Config) -> anyhow::Result<PastaServices> {
    let pool = pasta_db::connect(config).await?;
    let storage = pasta_storage::create_storage(config)
        .await
        .context("Failed to initialize storage backend")?;
    tracing::info!(backend = ?config.storage_backend(), "Storage backend ready");

    let clock = SystemClock::shared();
    let rate_limiter = Arc::new(RateLimiter::new(
        "mutations",
        config.rate_limit_per_window(),
        config.rate_limit_window_secs(),
        Arc::clone(&clock),
    ));
    let context = ServiceContext {
        pastes: Arc::new(PgPasteRepository::new(pool.clone())),
        shortlinks: Arc::new(PgShortlinkRepository::new(pool.clone())),
        api_keys: Arc::new(PgApiKeyRepository::new(pool)),
        storage,
        ids: Arc::new(RandomIdGenerator::new(config.id_length())),
        clock,
        rate_limiter,
        list_limits: ListLimits::from_config(config),
    };

    let fetcher = Arc::new(HttpFetcher::from_config(config).context("Failed to build HTTP fetcher")?);
    let notifier = EmailNotifier::from_config(config)
        .context("Failed to configure SMTP")?
        .map(|n| Arc::new(n) as Arc<dyn VerificationNotifier>);

    Ok(PastaServices::new(config, context, fetcher, notifier))
}

/// Options accepted by `pasta upload`.
#[derive(Debug, Clone, Default)]
pub struct UploadArgs {
    pub file: Option<PathBuf>,
    pub url: Option<String>,
    pub filename: Option<String>,
    pub extension: Option<String>,
    pub expires: Option<String>,
    pub private: bool,
}

impl UploadArgs {
    /// A URL becomes a JSON url upload, a file a multipart upload, and
    /// anything else is read from `stdin` as a raw body.
    pub fn into_envelope(
        self,
        stdin: impl FnOnce() -> std::io::Result<Vec<u8>>,
    ) -> anyhow::Result<UploadEnvelope> {
        if let Some(url) = self.url {
            if self.file.is_some() {
                anyhow::bail!("Pass either a file or --url, not both");
            }
            let envelope = UploadEnvelope::from_json(JsonUploadRequest {
                content: None,
                url: Some(url),
                filename: self.filename,
                extension: self.extension,
                expires_in: self.expires,
                private: self.private,
            })?;
            return Ok(envelope);
        }

        let mut fields = HashMap::new();
        if let Some(ext) = self.extension {
            fields.insert("ext".to_string(), ext);
        }
        if let Some(expires) = self.expires {
            fields.insert("expires".to_string(), expires);
        }
        if self.private {
            fields.insert("private".to_string(), "true".to_string());
        }

        let (file, filename) = match self.file {
            Some(path) => {
                let bytes = std::fs::read(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let name = self.filename.or_else(|| {
                    path.file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                });
                (bytes, name)
            }
            None => (stdin().context("Failed to read stdin")?, self.filename),
        };

        Ok(UploadEnvelope::Multipart {
            file: Bytes::from(file),
            filename,
            content_type: None,
            fields,
        })
    }
}

pub fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}
