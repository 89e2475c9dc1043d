use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use crate::core::errors::ApiError;
use crate::core::security::require_api_key;
use crate::state::AppState;
use crate::threads::Thread;

pub async fn create_thread(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(thread): Json<Thread>,
) -> Result<Response, ApiError> {
    require_api_key(&headers, &state.session_token)?;

    state.threads.save(&thread).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({"success": true, "thread_id": thread.id})),
    )
        .into_response())
}

pub async fn list_threads(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.session_token)?;

    let threads = state.threads.list().await?;
    Ok(Json(json!({"success": true, "threads": threads})))
}

pub async fn get_thread(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(thread_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.session_token)?;

    let thread = state
        .threads
        .get(thread_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Thread not found".to_string()))?;
    Ok(Json(json!({"success": true, "thread": thread})))
}

pub async fn update_thread(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(thread_id): Path<Uuid>,
    Json(thread): Json<Thread>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.session_token)?;

    if state.threads.get(thread_id).await?.is_none() {
        return Err(ApiError::NotFound("Thread not found".to_string()));
    }

    // The path wins over whatever id the body carries.
    let mut updated = thread;
    updated.id = thread_id;
    state.threads.save(&updated).await?;
    Ok(Json(json!({"success": true, "thread_id": thread_id})))
}

pub async fn delete_thread(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(thread_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.session_token)?;

    if state.threads.get(thread_id).await?.is_none() {
        return Err(ApiError::NotFound("Thread not found".to_string()));
    }

    state.threads.delete(thread_id).await?;
    Ok(Json(json!({"success": true})))
}
