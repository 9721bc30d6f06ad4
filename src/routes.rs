// src/routes.rs
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::any::Any;
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::generator::TokenGenerator;
use crate::types::RefreshRes;
use crate::updater::ProxyUpdater;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub generator: Arc<TokenGenerator>,
    pub updater: ProxyUpdater,
}

impl AppState {
    pub fn from_config(config: Arc<Config>) -> Self {
        Self {
            generator: Arc::new(TokenGenerator::from_config(&config)),
            updater: ProxyUpdater::from_config(&config),
            config,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/refresh", get(refresh).post(refresh))
        .route("/health", get(health))
        .route("/", get(index))
        .with_state(state)
        .layer(CatchPanicLayer::custom(fault))
        .layer(TraceLayer::new_for_http())
}

// ---------- HANDLERS ---------- //

async fn refresh(State(state): State<AppState>) -> Response {
    info!("token refresh requested via webhook");

    // Detached so a dropped connection does not cancel generation or the push.
    match tokio::spawn(run_refresh(state)).await {
        Ok(res) => res.into_response(),
        Err(e) if e.is_panic() => fault(e.into_panic()),
        Err(e) => failed(&e.to_string()).into_response(),
    }
}

async fn run_refresh(state: AppState) -> (StatusCode, Json<RefreshRes>) {
    let pair = match state.generator.generate().await {
        Ok(pair) => pair,
        Err(e) => {
            error!(error = %e, "token generation failed");
            return failed("Failed to generate token");
        }
    };

    if let Err(e) = state.updater.push(&pair).await {
        error!(error = %e, "proxy update failed");
        return failed("Failed to update Lavalink");
    }

    (StatusCode::OK, Json(RefreshRes::ok("Token refreshed successfully")))
}

async fn health() -> Json<Value> {
    Json(json!({"status": "healthy"}))
}

async fn index(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": "Lavalink Token Refresh Webhook",
        "endpoints": {
            "/refresh": "POST or GET - Refresh YouTube token",
            "/health": "GET - Health check"
        },
        "lavalink_url": state.config.proxy_url,
    }))
}

fn failed(error: &str) -> (StatusCode, Json<RefreshRes>) {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(RefreshRes::failed(error)))
}

fn fault(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unexpected error".to_string()
    };
    error!(error = %message, "unexpected fault while handling request");
    failed(&message).into_response()
}
