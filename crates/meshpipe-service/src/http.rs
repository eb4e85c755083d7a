use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use meshpipe_ingest::{LinkStatus, Pipeline};

/// Configuration echo for the stats endpoint. Secrets stay out.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigEcho {
    pub mqtt_broker: String,
    pub mqtt_topic: String,
    pub shortname_pattern: String,
    pub min_storage_voltage: f64,
    pub postgres_enabled: bool,
}

#[derive(Clone)]
pub struct AppState {
    pub link: LinkStatus,
    pub pipeline: Arc<Pipeline>,
    pub config_echo: ConfigEcho,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .with_state(state)
}

/// Liveness: link state plus aggregate counters.
async fn health(State(state): State<AppState>) -> Json<Value> {
    let report = state.pipeline.status_report().await;
    Json(json!({
        "status": "healthy",
        "mqtt_connected": state.link.is_connected(),
        "pipeline": report,
    }))
}

/// Everything `/health` reports plus the configuration echo.
async fn stats(State(state): State<AppState>) -> Json<Value> {
    let report = state.pipeline.status_report().await;
    Json(json!({
        "status": "healthy",
        "mqtt_connected": state.link.is_connected(),
        "pipeline": report,
        "config": state.config_echo,
    }))
}

/// Bind and serve until the shutdown token fires.
pub async fn serve(port: u16, state: AppState, shutdown: CancellationToken) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "status surface listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
