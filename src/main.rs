//! EchoPlay -- music sharing backend.
//!
//! SIGTERM/SIGINT stop the listener from accepting connections and let
//! in-flight requests drain, bounded by `server.shutdown_timeout`.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use echoplay::config::Config;
use echoplay::metadata::store::MetadataStore;
use echoplay::storage::backend::StorageBackend;

/// Command-line arguments for the EchoPlay server.
#[derive(Parser, Debug)]
#[command(name = "echoplay", version, about = "Music sharing backend")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "echoplay.example.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn open_metadata(config: &Config) -> anyhow::Result<Arc<dyn MetadataStore>> {
    match config.metadata.engine.as_str() {
        "memory" => {
            warn!("In-memory metadata store: records are lost on restart");
            Ok(Arc::new(echoplay::metadata::memory::MemoryMetadataStore::new()))
        }
        "sqlite" => {
            let path = &config.metadata.sqlite.path;
            let store = echoplay::metadata::sqlite::SqliteMetadataStore::new(path)?;
            info!("SQLite metadata store initialized at {}", path);
            Ok(Arc::new(store))
        }
        other => anyhow::bail!("unknown metadata.engine '{other}'"),
    }
}

async fn open_storage(config: &Config) -> anyhow::Result<Arc<dyn StorageBackend>> {
    match config.storage.backend.as_str() {
        "aws" => {
            let aws_config = config.storage.aws.as_ref().ok_or_else(|| {
                anyhow::anyhow!("storage.backend is 'aws' but storage.aws config section is missing")
            })?;
            let backend = echoplay::storage::aws::AwsBackend::new(aws_config).await?;
            info!(
                "S3 storage backend initialized: bucket={} region={} prefix='{}'",
                aws_config.bucket, aws_config.region, aws_config.prefix
            );
            Ok(Arc::new(backend))
        }
        "memory" => {
            warn!("In-memory storage backend: uploads are lost on restart");
            Ok(Arc::new(echoplay::storage::memory::MemoryBackend::new(
                &config.storage.local.public_prefix,
            )))
        }
        "local" => {
            let local = &config.storage.local;
            let backend =
                echoplay::storage::local::LocalBackend::new(&local.root_dir, &local.public_prefix)?;
            info!(
                "Local storage backend initialized at {} (served under {})",
                local.root_dir, local.public_prefix
            );
            Ok(Arc::new(backend))
        }
        other => anyhow::bail!("unknown storage.backend '{other}'"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = echoplay::config::load_config(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config))?;
    init_tracing(&config);
    info!("Configuration loaded from {}", cli.config);

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    if config.observability.metrics {
        echoplay::metrics::init_metrics()?;
        echoplay::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let metadata = open_metadata(&config)?;
    let storage = open_storage(&config).await?;

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);
    let state = Arc::new(echoplay::AppState::new(config, metadata, storage));

    // Upload folders exist before the first request arrives.
    state
        .uploads
        .provision()
        .await
        .context("provisioning upload folders")?;

    let app = echoplay::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("EchoPlay listening on {}", bind_addr);

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    tokio::select! {
        result = server.into_future() => result?,
        _ = drain_deadline(shutdown_timeout) => {
            warn!("In-flight requests did not finish within {:?}", shutdown_timeout);
        }
    }

    info!("EchoPlay shut down");
    Ok(())
}

/// Resolves `timeout` after a shutdown signal, never before.
async fn drain_deadline(timeout: Duration) {
    shutdown_signal().await;
    tokio::time::sleep(timeout).await;
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }
}
