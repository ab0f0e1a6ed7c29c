//! Administrative JSON endpoints: process status, cache and
//! worker telemetry, metrics, and the `/debug` upstream probe. Thin glue
//! over state already tracked by the core modules.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde_json::json;

use crate::web::AppState;

pub async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mut system = sysinfo::System::new();
    system.refresh_memory();

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": state.started_at.elapsed().as_secs(),
        "timestamp": Utc::now().to_rfc3339(),
        "environment": std::env::var("APP_ENV").unwrap_or_else(|_| "production".to_string()),
        "memory": {
            "used_bytes": system.used_memory(),
            "total_bytes": system.total_memory(),
        },
    }))
}

pub async fn cache_stats(State(state): State<AppState>) -> Json<crate::cache::CacheStats> {
    Json(state.pipeline.cache().stats())
}

pub async fn cache_clear(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.pipeline.cache().clear();
    Json(json!({ "success": true }))
}

pub async fn worker_stats(State(state): State<AppState>) -> Json<crate::workers::WorkerStatsSnapshot> {
    Json(state.pipeline.workers().stats())
}

pub async fn metrics(State(state): State<AppState>) -> Json<crate::metrics::MetricsSnapshot> {
    Json(state.pipeline.metrics.snapshot())
}

pub async fn metrics_reset(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.pipeline.metrics.reset();
    Json(json!({ "success": true }))
}

pub async fn debug_probe(State(state): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Json<serde_json::Value> {
    let raw_url = params.get("url").cloned().unwrap_or_default();
    Json(state.pipeline.debug_probe(&raw_url).await)
}
