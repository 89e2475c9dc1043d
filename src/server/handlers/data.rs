use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::core::errors::ApiError;
use crate::core::security::require_api_key;
use crate::state::AppState;
use crate::vector::{is_system_collection, DeleteOutcome, ScrollFilter};

/// How many points per collection the extracted-data listing returns.
const EXTRACT_LIMIT: usize = 100;
/// How many sample chunks a file preview returns.
const PREVIEW_LIMIT: usize = 5;

pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.session_token)?;
    let jobs = state.queue.list().await;
    Ok(Json(json!({"success": true, "jobs": jobs})))
}

pub async fn get_job(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.session_token)?;
    match state.queue.get(job_id).await {
        Some(job) => Ok(Json(json!({"success": true, "job": job}))),
        None => Err(ApiError::NotFound("Job not found".to_string())),
    }
}

/// Dumps stored chunks across every data collection. Collections that fail
/// to read are logged and skipped so one bad collection does not hide the
/// rest.
pub async fn get_extracted_data(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.session_token)?;

    let collections = state.index.list_collections().await?;
    let mut data: Vec<Value> = Vec::new();
    for collection in collections.iter().filter(|name| !is_system_collection(name)) {
        match state.index.scroll(collection, None, EXTRACT_LIMIT).await {
            Ok(points) => {
                for point in points {
                    data.push(json!({
                        "filename": collection,
                        "content": point.payload.content,
                        "metadata": point.payload.metadata,
                    }));
                }
            }
            Err(err) => {
                warn!("Could not read collection '{}': {}", collection, err);
                continue;
            }
        }
    }

    Ok(Json(json!({"success": true, "data": data})))
}

/// Returns a handful of stored chunks for one filename, searched across all
/// data collections by metadata match.
pub async fn preview_file(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.session_token)?;

    let collections = state.index.list_collections().await?;
    let filter = ScrollFilter::for_filename(&filename);

    let mut preview: Vec<Value> = Vec::new();
    for collection in collections.iter().filter(|name| !is_system_collection(name)) {
        match state
            .index
            .scroll(collection, Some(&filter), PREVIEW_LIMIT)
            .await
        {
            Ok(points) => {
                for point in points {
                    preview.push(json!({
                        "content": point.payload.content,
                        "metadata": point.payload.metadata,
                    }));
                }
            }
            Err(err) => {
                warn!("Preview scroll failed for '{}': {}", collection, err);
            }
        }
        if preview.len() >= PREVIEW_LIMIT {
            preview.truncate(PREVIEW_LIMIT);
            break;
        }
    }

    if preview.is_empty() {
        return Ok(Json(json!({
            "files": [{
                "filename": filename,
                "preview": [],
                "status": "error",
                "error": "File not found in database"
            }]
        })));
    }

    Ok(Json(json!({
        "files": [{
            "filename": filename,
            "preview": preview,
            "status": "success",
            "error": null
        }]
    })))
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    pub filename: String,
}

/// Removes a file from the store: a dedicated collection when one matches,
/// otherwise any points referencing the filename in shared collections.
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<DeleteParams>,
) -> Result<Response, ApiError> {
    require_api_key(&headers, &state.session_token)?;

    match state.index.delete_by_filename(&params.filename).await? {
        DeleteOutcome::CollectionDeleted(name) => Ok(Json(json!({
            "success": true,
            "message": format!("Collection {} deleted successfully", name)
        }))
        .into_response()),
        DeleteOutcome::PointsDeleted(count) => Ok(Json(json!({
            "success": true,
            "message": format!("Deleted {} points related to {}", count, params.filename)
        }))
        .into_response()),
        DeleteOutcome::NotFound => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({
                "success": false,
                "message": format!("File {} not found in any collection", params.filename)
            })),
        )
            .into_response()),
    }
}
