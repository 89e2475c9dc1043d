use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::core::security::require_api_key;
use crate::state::AppState;
use crate::vector::is_system_collection;

pub async fn health(State(_state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({"status": "ok", "initialized": true}))
}

/// Unauthenticated summary used by the dashboard before it has the session
/// token. Reports counts only, never data or config.
pub async fn get_status(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let (collections, degraded) = match state.index.list_collections().await {
        Ok(names) => {
            let count = names
                .iter()
                .filter(|name| !is_system_collection(name))
                .count();
            (count, false)
        }
        Err(_) => (0, true),
    };

    let active_jobs = state
        .queue
        .list()
        .await
        .iter()
        .filter(|job| !job.state.is_finished())
        .count();

    Ok(Json(json!({
        "initialized": true,
        "provider": state.provider.name(),
        "collections": collections,
        "active_jobs": active_jobs,
        "uptime_seconds": (Utc::now() - state.started_at).num_seconds(),
        "degraded": degraded
    })))
}

pub async fn shutdown(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.session_token)?;

    tracing::info!("Shutdown requested over the API");
    tokio::spawn(exit_after_grace());

    Ok(Json(json!({"status": "shutting_down"})))
}

/// Gives the acknowledgement time to flush before the process exits.
async fn exit_after_grace() {
    tokio::time::sleep(Duration::from_millis(250)).await;
    std::process::exit(0);
}
