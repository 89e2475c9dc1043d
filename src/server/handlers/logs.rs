use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::fs;
use std::sync::Arc;

use crate::core::errors::ApiError;
use crate::core::security::require_api_key;
use crate::state::AppState;

/// Lists log file names, newest first.
pub async fn get_logs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.session_token)?;

    let mut logs = Vec::new();
    if let Ok(entries) = fs::read_dir(&state.paths.log_dir) {
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            // Rolled files look like "server.log.2026-08-25", so match on
            // the infix rather than the extension.
            if !name.contains(".log") {
                continue;
            }
            let modified = entry.metadata().and_then(|meta| meta.modified()).ok();
            logs.push((modified, name.to_string()));
        }
    }

    logs.sort_by(|a, b| b.0.cmp(&a.0));

    let names: Vec<String> = logs.into_iter().map(|(_, name)| name).collect();
    Ok(Json(json!(names)))
}

pub async fn get_log_content(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.session_token)?;

    // Bare file names only; reject separators and parent traversal.
    let safe_name = sanitize_log_filename(&filename)
        .ok_or_else(|| ApiError::BadRequest("Invalid log filename".to_string()))?;

    match fs::read_to_string(state.paths.log_dir.join(safe_name)) {
        Ok(content) => Ok(content),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Err(ApiError::NotFound("Log file not found".to_string()))
        }
        Err(err) => Err(ApiError::internal(err)),
    }
}

fn sanitize_log_filename(filename: &str) -> Option<&str> {
    if filename.contains("..") {
        return None;
    }
    let base = std::path::Path::new(filename).file_name()?.to_str()?;
    (base == filename).then_some(base)
}
