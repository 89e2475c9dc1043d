use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::core::errors::ApiError;
use crate::core::security::require_api_key;
use crate::state::AppState;

/// Returns the merged config with secret values masked. Changes written
/// through the update endpoints apply on the next start.
pub async fn get_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.session_token)?;
    let config = state.config.load_config()?;
    Ok(Json(state.config.redact_sensitive_values(&config)))
}

/// Replaces the whole stored document.
pub async fn update_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    apply_update(&state, &headers, payload, false)
}

/// Merges the payload into the stored document.
pub async fn patch_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    apply_update(&state, &headers, payload, true)
}

fn apply_update(
    state: &AppState,
    headers: &HeaderMap,
    payload: Value,
    merge: bool,
) -> Result<Json<Value>, ApiError> {
    require_api_key(headers, &state.session_token)?;
    state.config.update_config(payload, merge)?;
    Ok(Json(json!({"status": "success"})))
}
