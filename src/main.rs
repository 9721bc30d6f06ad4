// src/main.rs
mod config;
mod generator;
mod parser;
mod routes;
mod types;
mod updater;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Arc::new(Config::from_env());
    let state = routes::AppState::from_config(config.clone());
    info!(endpoint = %state.updater.endpoint(), use_docker = config.use_docker, "proxy target");
    let app = routes::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(%addr, "webhook server listening");
    info!("endpoints: POST/GET /refresh, GET /health, GET /");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
