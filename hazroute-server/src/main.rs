//! HTTP facade over the routing engine.
//!
//! Run with: cargo run -p hazroute-server -- --config hazroute.toml

mod api;
mod config;
mod dto;

use std::sync::Arc;

use clap::Parser;
use hazroute_core::{
    RoutingEngine,
    loading::{grid_network, load_geojson_network},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{
    api::Limits,
    config::{Cli, ServerConfig},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::load(&cli)?;

    if let Some(threads) = config.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }

    let graph = match &config.network {
        Some(path) => {
            info!(path = %path.display(), "Loading road network");
            load_geojson_network(path)?
        }
        None => {
            info!(
                rows = config.grid.rows,
                cols = config.grid.cols,
                "No network file configured, serving a synthetic grid"
            );
            grid_network(&config.grid.spec())?
        }
    };
    let engine = Arc::new(RoutingEngine::new(graph, config.engine.clone())?);

    let app = api::router(
        engine,
        Limits {
            request_timeout: config.request_timeout(),
            concurrency: config.concurrency_limit,
        },
    );

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
}
