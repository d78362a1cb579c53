//! ptk-rt - real-time performance tracking service

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ptk_common::config::{ConfigSource, ServerConfig, TomlConfig};
use ptk_common::db::{init_database, SqliteStore};
use ptk_rt::auth::JwtAuthenticator;
use ptk_rt::cli::Args;
use ptk_rt::{build_router, AppState};
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (file, source) = TomlConfig::load_or_default(args.config.as_deref())
        .context("Failed to load config file")?;
    let config = ServerConfig::resolve(args.overrides(), file).context("Invalid configuration")?;

    let level = &config.log_level;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("ptk_rt={level},ptk_common={level},tower_http={level}").into()
            }),
        )
        .init();

    // Build identification immediately after tracing init
    info!(
        "Starting PTK real-time service (ptk-rt) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    match &source {
        ConfigSource::NoConfigDir => warn!("Settings from {}", source),
        _ => info!("Settings from {}", source),
    }
    info!("Database path: {}", config.database.display());
    info!("Coach listing cutoff: {}", config.coach_cutoff.to_rfc3339());

    let pool = init_database(&config.database)
        .await
        .context("Failed to initialize database")?;
    let store = SqliteStore::new(pool)
        .await
        .context("Failed to open record store")?;
    info!("✓ Record store ready");

    let authenticator =
        JwtAuthenticator::new(&config.jwt_secret).context("Invalid JWT secret")?;

    let state = AppState::new(Arc::new(store), Arc::new(authenticator), config.coach_cutoff);
    let app = build_router(state);

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("ptk-rt listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
