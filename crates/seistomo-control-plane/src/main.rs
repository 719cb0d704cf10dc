//! Seistomo Control Plane Server

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use seistomo_control_plane::{http, workers, AppState, Args, Config, SqliteTaskStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("seistomo=info,tower_http=info")),
        )
        .with_target(true)
        .init();

    // Load config
    let config = Config::from(Args::parse());
    let http_addr: SocketAddr = config.http_addr.parse()?;
    tokio::fs::create_dir_all(&config.artifact_root).await?;

    let store = SqliteTaskStore::connect(&config.database_url).await?;
    let state = Arc::new(AppState::new(config, Arc::new(store))?);

    info!(
        http_addr = %http_addr,
        fdsn_base = %state.config.fdsn_base,
        solver = %state.config.solver_path,
        "Starting seistomo control plane"
    );

    let recovered = workers::recover_in_flight(&state).await?;
    if recovered > 0 {
        info!(count = recovered, "Recovered interrupted tasks");
    }

    let worker_handles = workers::spawn(state.clone());

    let listener = TcpListener::bind(http_addr).await?;
    info!("HTTP server listening on {}", http_addr);

    let shutdown = state.shutdown.clone();
    let server = axum::serve(listener, http::create_router(state.clone()))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown requested");
            shutdown.cancel();
        });

    if let Err(e) = server.await {
        error!(error = %e, "HTTP server error");
    }

    state.shutdown.cancel();
    for handle in worker_handles {
        if let Err(e) = handle.await {
            error!(error = %e, "Worker loop panicked");
        }
    }

    info!("Control plane stopped");
    Ok(())
}
