use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;

use crate::server_state::ServerState;

/// Read-only view over the stored snapshots.
pub fn router(server_state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/snapshots", get(get_snapshots))
        .route("/snapshot/{snapshot_id}", get(get_snapshot))
        .with_state(server_state)
}

async fn health(State(state): State<Arc<ServerState>>) -> Response {
    Json(json!({
        "ok": true,
        "durableStore": state.data_manager.has_durable_store(),
        "connections": state.connections(),
    })).into_response()
}

async fn get_snapshots(State(state): State<Arc<ServerState>>) -> Response {
    match state.data_manager.get_snapshots().await {
        Ok(snapshots) => Json(snapshots).into_response(),
        Err(err) => {
            tracing::error!("Failed to list snapshots: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn get_snapshot(State(state): State<Arc<ServerState>>, Path(snapshot_id): Path<String>) -> Response {
    match state.data_manager.get_snapshot(&snapshot_id).await {
        Ok(Some(snapshot)) => Json(snapshot).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            tracing::error!("Failed to get snapshot {}: {err}", snapshot_id);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
