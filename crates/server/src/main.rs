//! Terrapin server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use std::sync::Arc;
use terrapin_core::AppConfig;
use terrapin_metadata::ProviderStore;
use terrapin_mirror::{MirrorService, RegistryClient, spawn_resync_task};
use terrapin_server::{AppState, create_router};
use terrapin_storage::{ArchiveStore, DownloadClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Terrapin - a network mirror for provider plugins
#[derive(Parser, Debug)]
#[command(name = "terrapind")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "TERRAPIN_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Terrapin v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration. The file is optional; environment variables can
    // provide or override everything, and the defaults run standalone.
    let mut figment = Figment::new();
    let config_path = std::path::Path::new(&args.config);
    if config_path.exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("TERRAPIN_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    terrapin_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    std::fs::create_dir_all(&config.storage.data_dir).with_context(|| {
        format!(
            "failed to create data directory {}",
            config.storage.data_dir.display()
        )
    })?;

    // Metadata store.
    let store = Arc::new(
        ProviderStore::open(config.storage.metadata_path())
            .context("failed to open metadata store")?,
    );
    store
        .health_check()
        .context("metadata store health check failed")?;
    tracing::info!(path = %config.storage.metadata_path().display(), "Metadata store initialized");

    // Upstream registry client; the downloader shares its HTTP client.
    let registry =
        RegistryClient::new(&config.upstream).context("failed to build upstream client")?;
    let downloader = DownloadClient::new(registry.http().clone());

    // Archive store.
    let implied_dir = config.storage.resolve_implied_dir();
    if let Some(dir) = &implied_dir {
        tracing::info!(dir = %dir.display(), "Using implied provider directory");
    }
    let archives = Arc::new(
        ArchiveStore::new(config.storage.providers_dir(), implied_dir, downloader)
            .context("failed to initialize archive store")?,
    );
    tracing::info!(dir = %config.storage.providers_dir().display(), "Archive store initialized");

    // Cache coordinator and its periodic resync.
    let mirror = MirrorService::new(store, registry, &config.sync);
    let resync = spawn_resync_task(mirror.clone(), config.sync.resync_interval());

    let state = AppState::new(config.clone(), mirror, archives);
    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    resync.abort();
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}
