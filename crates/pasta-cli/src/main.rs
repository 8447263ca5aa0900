//! Pasta CLI: operator front-end for the pastebin and URL shortener.
//!
//! Reads configuration from the environment (and `.env`). Owner-scoped
//! commands take the caller's key from `--api-key` or `PASTA_API_KEY`.

use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pasta_cli::{build_services, print_json, UploadArgs};
use pasta_core::models::{ApiKey, ExpiryRequest, ListQuery, PasteResponse, ShortlinkResponse};
use pasta_core::Config;
use pasta_services::{
    CreateShortlinkRequest, DeleteAuth, KeyRequest, PastaServices, Resolved, RetentionPolicy,
};

#[derive(Parser)]
#[command(name = "pasta", about = "Pastebin and URL shortener administration")]
struct Cli {
    /// API key used for owner-scoped commands
    #[arg(long, env = "PASTA_API_KEY", global = true, hide_env_values = true)]
    api_key: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Create a paste from a file, a URL, or stdin
    Upload {
        /// File to upload; stdin is read when neither a file nor --url is given
        file: Option<PathBuf>,
        /// Fetch the content from this URL instead
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        filename: Option<String>,
        /// Extension used for display, e.g. `rs`
        #[arg(long)]
        ext: Option<String>,
        /// Lifetime such as `1h`, `7d` or `never`
        #[arg(long)]
        expires: Option<String>,
        #[arg(long)]
        private: bool,
    },
    /// Show paste metadata, or its content with --raw
    Show {
        id: String,
        #[arg(long)]
        raw: bool,
    },
    /// Delete a paste (with its delete key or as owner) or a shortlink (as owner)
    Delete {
        id: String,
        #[arg(long)]
        delete_key: Option<String>,
        /// Delete a shortlink instead of a paste
        #[arg(long)]
        link: bool,
    },
    /// List the caller's pastes or shortlinks
    List {
        #[arg(long)]
        links: bool,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
        /// Sort such as `"created_at desc"` or `size`
        #[arg(long)]
        sort: Option<String>,
    },
    /// Change the expiry of an owned paste or shortlink
    Expiry {
        id: String,
        /// New lifetime from now, or `never`
        expires: String,
        #[arg(long)]
        link: bool,
    },
    /// Create a shortlink
    Shorten {
        url: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        expires: Option<String>,
    },
    /// Resolve an id the way a visitor would, counting shortlink clicks
    Click { id: String },
    /// Click statistics for an owned shortlink
    LinkStats { id: String },
    /// Request an API key; a verification link is emailed
    RequestKey {
        email: String,
        name: String,
        /// Address the request is attributed to for rate limiting
        #[arg(long, default_value = "127.0.0.1")]
        ip: String,
    },
    /// Redeem a verification token
    VerifyKey { token: String },
    /// Grant or revoke the shortlink capability for a key
    GrantShortlinks {
        key: String,
        #[arg(long)]
        revoke: bool,
    },
    /// Usage totals
    Stats,
    /// Default retention by size
    Retention {
        #[arg(long, default_value = "10")]
        points: usize,
    },
    /// Run one cleanup sweep of expired content
    Sweep,
    /// Run the cleanup scheduler until interrupted
    RunCleanup,
}

async fn caller(services: &PastaServices, api_key: Option<&str>) -> anyhow::Result<Option<ApiKey>> {
    match api_key {
        Some(key) => Ok(Some(services.api_keys.resolve(key).await?)),
        None => Ok(None),
    }
}

async fn require_caller(services: &PastaServices, api_key: Option<&str>) -> anyhow::Result<ApiKey> {
    caller(services, api_key)
        .await?
        .context("This command needs an API key. Pass --api-key or set PASTA_API_KEY")
}

fn expiry_request(value: &str) -> anyhow::Result<ExpiryRequest> {
    ExpiryRequest::from_field(Some(value)).context("Expiry must not be empty")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        _ = terminate => tracing::info!("Received terminate signal"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    pasta_infra::telemetry::init_telemetry(config.log_format())
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    // Commands that need no backends.
    match &cli.command {
        Commands::Migrate => {
            pasta_db::setup_database(&config).await?;
            return print_json(&serde_json::json!({ "migrated": true }));
        }
        Commands::Retention { points } => {
            let policy = RetentionPolicy::from_config(&config);
            return print_json(&policy.table(*points));
        }
        _ => {}
    }

    let services = build_services(&config).await?;
    let base_url = config.base_url();
    let api_key = cli.api_key.as_deref();

    match cli.command {
        Commands::Migrate | Commands::Retention { .. } => {}
        Commands::Upload {
            file,
            url,
            filename,
            ext,
            expires,
            private,
        } => {
            let envelope = UploadArgs {
                file,
                url,
                filename,
                extension: ext,
                expires,
                private,
            }
            .into_envelope(|| {
                let mut buf = Vec::new();
                std::io::stdin().read_to_end(&mut buf)?;
                Ok(buf)
            })?;
            let owner = caller(&services, api_key).await?;
            let paste = services.upload(envelope, owner).await?;
            print_json(&PasteResponse::from_paste(&paste, base_url).with_delete_url(&paste, base_url))?;
        }
        Commands::Show { id, raw } => {
            if raw {
                let (_, bytes) = services.pastes.read(&id).await?;
                std::io::stdout()
                    .write_all(&bytes)
                    .context("Failed to write paste to stdout")?;
            } else {
                let paste = services.pastes.get(&id).await?;
                print_json(&PasteResponse::from_paste(&paste, base_url))?;
            }
        }
        Commands::Delete {
            id,
            delete_key,
            link,
        } => {
            if link {
                let owner = require_caller(&services, api_key).await?;
                services.shortlinks.delete(&id, &owner).await?;
            } else if let Some(delete_key) = delete_key.as_deref() {
                services
                    .pastes
                    .delete(&id, DeleteAuth::DeleteKey(delete_key))
                    .await?;
            } else {
                let owner = require_caller(&services, api_key).await?;
                services.pastes.delete(&id, DeleteAuth::Owner(&owner)).await?;
            }
            print_json(&serde_json::json!({ "deleted": id }))?;
        }
        Commands::List {
            links,
            page,
            limit,
            sort,
        } => {
            let owner = require_caller(&services, api_key).await?;
            let query = ListQuery { page, limit, sort };
            if links {
                let page = services.shortlinks.list(&owner, &query).await?;
                print_json(&page.map(|l| ShortlinkResponse::from_shortlink(&l, base_url)))?;
            } else {
                let page = services.pastes.list(&owner, &query).await?;
                print_json(&page.map(|p| PasteResponse::from_paste(&p, base_url)))?;
            }
        }
        Commands::Expiry { id, expires, link } => {
            let owner = require_caller(&services, api_key).await?;
            let request = expiry_request(&expires)?;
            if link {
                let updated = services.shortlinks.update_expiry(&id, &owner, request).await?;
                print_json(&ShortlinkResponse::from_shortlink(&updated, base_url))?;
            } else {
                let updated = services.pastes.update_expiry(&id, &owner, request).await?;
                print_json(&PasteResponse::from_paste(&updated, base_url))?;
            }
        }
        Commands::Shorten {
            url,
            title,
            expires,
        } => {
            let owner = require_caller(&services, api_key).await?;
            let link = services
                .shortlinks
                .create(
                    &owner,
                    CreateShortlinkRequest {
                        url,
                        title,
                        expires_in: expires,
                    },
                )
                .await?;
            print_json(&ShortlinkResponse::from_shortlink(&link, base_url))?;
        }
        Commands::Click { id } => match services.resolver.resolve(&id).await? {
            Resolved::Redirect(link) => {
                // Awaited rather than spawned so the count lands before exit.
                services.shortlinks.record_click(&link.id).await;
                print_json(&serde_json::json!({ "redirect": link.target_url }))?;
            }
            Resolved::Paste(paste) => {
                print_json(&PasteResponse::from_paste(&paste, base_url))?;
            }
        },
        Commands::LinkStats { id } => {
            let owner = require_caller(&services, api_key).await?;
            print_json(&services.shortlinks.stats(&id, &owner).await?)?;
        }
        Commands::RequestKey { email, name, ip } => {
            services
                .api_keys
                .request_key(KeyRequest { email, name }, &ip)
                .await?;
            print_json(&serde_json::json!({
                "message": "Verification email sent. Follow the link to activate the key."
            }))?;
        }
        Commands::VerifyKey { token } => {
            let key = services.api_keys.verify(&token).await?;
            print_json(&serde_json::json!({
                "api_key": key.key,
                "email": key.email,
                "allow_shortlinks": key.allow_shortlinks,
            }))?;
        }
        Commands::GrantShortlinks { key, revoke } => {
            services.api_keys.set_shortlink_access(&key, !revoke).await?;
            print_json(&serde_json::json!({ "allow_shortlinks": !revoke }))?;
        }
        Commands::Stats => {
            print_json(&services.stats.collect().await?)?;
        }
        Commands::Sweep => {
            let report = services
                .cleanup
                .run_once()
                .await
                .context("A cleanup sweep is already running")?;
            print_json(&report)?;
        }
        Commands::RunCleanup => {
            let handle = services.cleanup.clone().start();
            tracing::info!(
                interval_secs = config.cleanup_interval_secs(),
                "Cleanup scheduler started"
            );
            shutdown_signal().await;
            handle.abort();
            pasta_infra::telemetry::shutdown_telemetry().await;
        }
    }

    Ok(())
}
