//! Configuration module
//!
//! Settings are read from the environment (after loading a `.env` file when
//! present). Every value has a development default except `DATABASE_URL`.

use std::env;
use std::str::FromStr;

use crate::storage_types::StorageBackend;

const MAX_CONNECTIONS: u32 = 10;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const MAX_UPLOAD_SIZE_MB: u64 = 64;
const FETCH_TIMEOUT_SECS: u64 = 30;
const ID_LENGTH: usize = 8;
const NO_KEY_MIN_DAYS: u32 = 7;
const NO_KEY_MAX_DAYS: u32 = 128;
const WITH_KEY_MIN_DAYS: u32 = 30;
const WITH_KEY_MAX_DAYS: u32 = 730;
const LIST_DEFAULT_LIMIT: u32 = 20;
const LIST_MAX_LIMIT: u32 = 100;
const CLEANUP_INTERVAL_SECS: u64 = 3600;
const CLEANUP_BATCH_SIZE: u32 = 500;
const RATE_LIMIT_PER_WINDOW: u32 = 60;
const RATE_LIMIT_WINDOW_SECS: u64 = 60;
const KEY_REQUEST_LIMIT_PER_WINDOW: u32 = 3;
const KEY_REQUEST_WINDOW_SECS: u64 = 3600;
const SMTP_PORT: u16 = 587;

/// Inclusive retention window in days.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetentionRange {
    pub min_days: u32,
    pub max_days: u32,
}

/// Log output format
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(anyhow::anyhow!("Invalid log format: {}", s)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub environment: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    /// Public base URL used to build paste and shortlink links
    pub base_url: String,
    // Storage configuration
    pub storage_backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers
    pub aws_region: Option<String>,
    pub local_storage_path: String,
    // Ingestion
    pub max_upload_size_bytes: u64,
    pub fetch_timeout_secs: u64,
    pub fetch_allow_private: bool,
    // If set, URL uploads are limited to these domains
    pub fetch_allowlist: Option<Vec<String>>,
    pub id_length: usize,
    // Retention
    pub retention_no_key: RetentionRange,
    pub retention_with_key: RetentionRange,
    // Listing
    pub list_default_limit: u32,
    pub list_max_limit: u32,
    // Cleanup scheduler
    pub cleanup_enabled: bool,
    pub cleanup_interval_secs: u64,
    pub cleanup_batch_size: u32,
    // Rate limiting
    pub rate_limit_per_window: u32,
    pub rate_limit_window_secs: u64,
    pub key_request_limit_per_window: u32,
    pub key_request_window_secs: u64,
    // Verification mail
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
    pub smtp_tls: bool,
    pub log_format: LogFormat,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            database_url: "postgresql://localhost/pasta".to_string(),
            db_max_connections: MAX_CONNECTIONS,
            db_timeout_seconds: CONNECTION_TIMEOUT_SECS,
            base_url: "http://localhost:3000".to_string(),
            storage_backend: StorageBackend::Local,
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            aws_region: None,
            local_storage_path: "./uploads".to_string(),
            max_upload_size_bytes: MAX_UPLOAD_SIZE_MB * 1024 * 1024,
            fetch_timeout_secs: FETCH_TIMEOUT_SECS,
            fetch_allow_private: false,
            fetch_allowlist: None,
            id_length: ID_LENGTH,
            retention_no_key: RetentionRange {
                min_days: NO_KEY_MIN_DAYS,
                max_days: NO_KEY_MAX_DAYS,
            },
            retention_with_key: RetentionRange {
                min_days: WITH_KEY_MIN_DAYS,
                max_days: WITH_KEY_MAX_DAYS,
            },
            list_default_limit: LIST_DEFAULT_LIMIT,
            list_max_limit: LIST_MAX_LIMIT,
            cleanup_enabled: true,
            cleanup_interval_secs: CLEANUP_INTERVAL_SECS,
            cleanup_batch_size: CLEANUP_BATCH_SIZE,
            rate_limit_per_window: RATE_LIMIT_PER_WINDOW,
            rate_limit_window_secs: RATE_LIMIT_WINDOW_SECS,
            key_request_limit_per_window: KEY_REQUEST_LIMIT_PER_WINDOW,
            key_request_window_secs: KEY_REQUEST_WINDOW_SECS,
            smtp_host: None,
            smtp_port: SMTP_PORT,
            smtp_user: None,
            smtp_password: None,
            smtp_from: None,
            smtp_tls: true,
            log_format: LogFormat::Pretty,
        }
    }
}

fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().to_lowercase().parse().ok())
        .unwrap_or(default)
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let defaults = ServiceConfig::default();

        let storage_backend = match env::var("STORAGE_BACKEND") {
            Ok(value) => value.parse::<StorageBackend>()?,
            Err(_) => defaults.storage_backend,
        };

        let log_format = match env::var("LOG_FORMAT") {
            Ok(value) => value.parse::<LogFormat>()?,
            Err(_) => defaults.log_format,
        };

        Ok(ServiceConfig {
            environment: env::var("ENVIRONMENT")
                .or_else(|_| env::var("APP_ENV"))
                .unwrap_or(defaults.environment),
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            db_timeout_seconds: env_parse("DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),
            base_url: env::var("BASE_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            storage_backend,
            s3_bucket: env::var("S3_BUCKET").ok(),
            s3_region: env::var("S3_REGION").ok(),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            aws_region: env::var("AWS_REGION").ok(),
            local_storage_path: env::var("LOCAL_STORAGE_PATH")
                .unwrap_or(defaults.local_storage_path),
            max_upload_size_bytes: env_parse("MAX_UPLOAD_SIZE_MB", MAX_UPLOAD_SIZE_MB)
                * 1024
                * 1024,
            fetch_timeout_secs: env_parse("FETCH_TIMEOUT_SECS", FETCH_TIMEOUT_SECS),
            fetch_allow_private: env_bool("FETCH_ALLOW_PRIVATE", false),
            fetch_allowlist: env::var("FETCH_ALLOWLIST").ok().map(|s| {
                s.split(',')
                    .map(|domain| domain.trim().to_lowercase())
                    .filter(|domain| !domain.is_empty())
                    .collect()
            }),
            id_length: env_parse("ID_LENGTH", ID_LENGTH),
            retention_no_key: RetentionRange {
                min_days: env_parse("RETENTION_NO_KEY_MIN_DAYS", NO_KEY_MIN_DAYS),
                max_days: env_parse("RETENTION_NO_KEY_MAX_DAYS", NO_KEY_MAX_DAYS),
            },
            retention_with_key: RetentionRange {
                min_days: env_parse("RETENTION_WITH_KEY_MIN_DAYS", WITH_KEY_MIN_DAYS),
                max_days: env_parse("RETENTION_WITH_KEY_MAX_DAYS", WITH_KEY_MAX_DAYS),
            },
            list_default_limit: env_parse("LIST_DEFAULT_LIMIT", LIST_DEFAULT_LIMIT),
            list_max_limit: env_parse("LIST_MAX_LIMIT", LIST_MAX_LIMIT),
            cleanup_enabled: env_bool("CLEANUP_ENABLED", true),
            cleanup_interval_secs: env_parse("CLEANUP_INTERVAL_SECS", CLEANUP_INTERVAL_SECS),
            cleanup_batch_size: env_parse("CLEANUP_BATCH_SIZE", CLEANUP_BATCH_SIZE),
            rate_limit_per_window: env_parse("RATE_LIMIT_PER_WINDOW", RATE_LIMIT_PER_WINDOW),
            rate_limit_window_secs: env_parse("RATE_LIMIT_WINDOW_SECS", RATE_LIMIT_WINDOW_SECS),
            key_request_limit_per_window: env_parse(
                "KEY_REQUEST_LIMIT_PER_WINDOW",
                KEY_REQUEST_LIMIT_PER_WINDOW,
            ),
            key_request_window_secs: env_parse("KEY_REQUEST_WINDOW_SECS", KEY_REQUEST_WINDOW_SECS),
            smtp_host: env::var("SMTP_HOST").ok(),
            smtp_port: env_parse("SMTP_PORT", SMTP_PORT),
            smtp_user: env::var("SMTP_USER").ok(),
            smtp_password: env::var("SMTP_PASSWORD").ok(),
            smtp_from: env::var("SMTP_FROM").ok(),
            smtp_tls: env_bool("SMTP_TLS", true),
            log_format,
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.database_url.starts_with("postgres://")
            && !self.database_url.starts_with("postgresql://")
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        for (label, range) in [
            ("RETENTION_NO_KEY", self.retention_no_key),
            ("RETENTION_WITH_KEY", self.retention_with_key),
        ] {
            if range.min_days == 0 || range.min_days > range.max_days {
                return Err(anyhow::anyhow!(
                    "{label}_MIN_DAYS must be positive and not exceed {label}_MAX_DAYS"
                ));
            }
        }

        if self.max_upload_size_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_UPLOAD_SIZE_MB must be positive"));
        }

        if !(4..=32).contains(&self.id_length) {
            return Err(anyhow::anyhow!("ID_LENGTH must be between 4 and 32"));
        }

        if self.list_default_limit == 0 || self.list_default_limit > self.list_max_limit {
            return Err(anyhow::anyhow!(
                "LIST_DEFAULT_LIMIT must be positive and not exceed LIST_MAX_LIMIT"
            ));
        }

        if self.cleanup_enabled && self.cleanup_interval_secs == 0 {
            return Err(anyhow::anyhow!(
                "CLEANUP_INTERVAL_SECS must be positive when cleanup is enabled"
            ));
        }

        if self.smtp_host.is_some() && self.smtp_from.is_none() {
            return Err(anyhow::anyhow!("SMTP_HOST requires SMTP_FROM to be set"));
        }

        if self.storage_backend == StorageBackend::S3 {
            if self.s3_bucket.is_none() {
                return Err(anyhow::anyhow!(
                    "S3_BUCKET must be set when using S3 storage backend"
                ));
            }
            if self.s3_region.is_none() && self.aws_region.is_none() {
                return Err(anyhow::anyhow!(
                    "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                ));
            }
        }

        let is_production = matches!(
            self.environment.to_lowercase().as_str(),
            "production" | "prod"
        );
        if is_production && !self.base_url.starts_with("https://") {
            return Err(anyhow::anyhow!("BASE_URL must use https in production"));
        }

        Ok(())
    }
}

/// Application configuration.
#[derive(Clone, Debug, Default)]
pub struct Config(pub Box<ServiceConfig>);

impl Config {
    fn inner(&self) -> &ServiceConfig {
        &self.0
    }

    pub fn new(config: ServiceConfig) -> Self {
        Config(Box::new(config))
    }

    /// Loads `.env` (if present) and then reads the process environment.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let _ = dotenvy::dotenv();
        let config = ServiceConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.inner().validate()
    }

    pub fn is_production(&self) -> bool {
        matches!(
            self.inner().environment.to_lowercase().as_str(),
            "production" | "prod"
        )
    }

    pub fn environment(&self) -> &str {
        &self.inner().environment
    }

    pub fn database_url(&self) -> &str {
        &self.inner().database_url
    }

    pub fn db_max_connections(&self) -> u32 {
        self.inner().db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.inner().db_timeout_seconds
    }

    pub fn base_url(&self) -> &str {
        &self.inner().base_url
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.inner().storage_backend
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.inner().s3_bucket.as_deref()
    }

    pub fn s3_region(&self) -> Option<&str> {
        self.inner().s3_region.as_deref()
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.inner().s3_endpoint.as_deref()
    }

    pub fn aws_region(&self) -> Option<&str> {
        self.inner().aws_region.as_deref()
    }

    pub fn local_storage_path(&self) -> &str {
        &self.inner().local_storage_path
    }

    pub fn max_upload_size_bytes(&self) -> u64 {
        self.inner().max_upload_size_bytes
    }

    pub fn fetch_timeout_secs(&self) -> u64 {
        self.inner().fetch_timeout_secs
    }

    pub fn fetch_allow_private(&self) -> bool {
        self.inner().fetch_allow_private
    }

    pub fn fetch_allowlist(&self) -> Option<&[String]> {
        self.inner().fetch_allowlist.as_deref()
    }

    pub fn id_length(&self) -> usize {
        self.inner().id_length
    }

    pub fn retention_no_key(&self) -> RetentionRange {
        self.inner().retention_no_key
    }

    pub fn retention_with_key(&self) -> RetentionRange {
        self.inner().retention_with_key
    }

    pub fn list_default_limit(&self) -> u32 {
        self.inner().list_default_limit
    }

    pub fn list_max_limit(&self) -> u32 {
        self.inner().list_max_limit
    }

    pub fn cleanup_enabled(&self) -> bool {
        self.inner().cleanup_enabled
    }

    pub fn cleanup_interval_secs(&self) -> u64 {
        self.inner().cleanup_interval_secs
    }

    pub fn cleanup_batch_size(&self) -> u32 {
        self.inner().cleanup_batch_size
    }

    pub fn rate_limit_per_window(&self) -> u32 {
        self.inner().rate_limit_per_window
    }

    pub fn rate_limit_window_secs(&self) -> u64 {
        self.inner().rate_limit_window_secs
    }

    pub fn key_request_limit_per_window(&self) -> u32 {
        self.inner().key_request_limit_per_window
    }

    pub fn key_request_window_secs(&self) -> u64 {
        self.inner().key_request_window_secs
    }

    pub fn smtp_host(&self) -> Option<&str> {
        self.inner().smtp_host.as_deref()
    }

    pub fn smtp_port(&self) -> u16 {
        self.inner().smtp_port
    }

    pub fn smtp_user(&self) -> Option<&str> {
        self.inner().smtp_user.as_deref()
    }

    pub fn smtp_password(&self) -> Option<&str> {
        self.inner().smtp_password.as_deref()
    }

    pub fn smtp_from(&self) -> Option<&str> {
        self.inner().smtp_from.as_deref()
    }

    pub fn smtp_tls(&self) -> bool {
        self.inner().smtp_tls
    }

    pub fn log_format(&self) -> LogFormat {
        self.inner().log_format
    }
}
