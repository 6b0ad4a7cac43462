//! Box Fulfillment & Verification Engine - main entry point
//!
//! Accepts concurrent barcode scans from warehouse workers, maintains
//! per-box fulfillment state, and streams changes to supervisor
//! dashboards over SSE.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use boxline_common::config::{database_path, resolve_data_folder};
use boxline_common::db::{get_setting_i64, init_database};
use boxline_common::events::EventBus;
use boxline_engine::{build_router, AppState, Engine};

/// Command-line arguments for boxline-engine
#[derive(Parser, Debug)]
#[command(name = "boxline-engine")]
#[command(about = "Box fulfillment and verification engine")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5780", env = "BOXLINE_PORT")]
    port: u16,

    /// Address to bind
    #[arg(short, long, default_value = "0.0.0.0", env = "BOXLINE_BIND")]
    bind: String,

    /// Data folder holding the database
    #[arg(short, long, env = "BOXLINE_DATA_FOLDER")]
    data_folder: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "boxline_engine=debug,boxline_common=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Build identification first, before any database delays
    info!(
        "Starting Boxline Engine v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let data_folder = resolve_data_folder(args.data_folder.as_deref(), "BOXLINE_DATA_FOLDER");
    std::fs::create_dir_all(&data_folder)
        .with_context(|| format!("Failed to create data folder {}", data_folder.display()))?;

    let db_path = database_path(&data_folder);
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path)
        .await
        .context("Failed to initialize database")?;
    info!("Database initialized");

    let capacity = get_setting_i64(&pool, "event_bus_capacity", 1000)
        .await
        .context("Failed to read event bus capacity")?
        .max(16) as usize;
    let events = EventBus::new(capacity);

    let engine = Engine::new(pool, events)
        .await
        .context("Failed to initialize engine")?;

    let app = build_router(AppState::new(engine));

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", args.bind, args.port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("boxline-engine listening on http://{}", addr);
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
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
