use axum::extract::{Multipart, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::errors::ApiError;
use crate::core::security::require_api_key;
use crate::ingest::loader::mime_matches;
use crate::ingest::{IngestJob, JobState};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProcessParams {
    /// When set, the response waits for every queued job and reports the
    /// full per-file outcome instead of job ids.
    #[serde(default)]
    pub wait: bool,
}

/// Accepts multipart file uploads and queues one ingest job per valid file.
/// Rejected files are reported per file; sibling files still proceed.
pub async fn process_files(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ProcessParams>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    require_api_key(&headers, &state.session_token)?;

    let mut queued: Vec<(Uuid, String)> = Vec::new();
    let mut rejected: Vec<Value> = Vec::new();
    let mut received = 0usize;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(format!("Malformed multipart request: {}", err)))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        received += 1;
        let declared_mime = field.content_type().map(str::to_string);

        let extension = match state.pipeline.loader().validate_extension(&filename) {
            Ok(extension) => extension,
            Err(err) => {
                warn!("Rejected upload '{}': {}", filename, err);
                rejected.push(rejected_entry(&filename, &err.to_string()));
                continue;
            }
        };

        if let Some(mime) = declared_mime.as_deref() {
            if !mime_matches(&extension, mime) {
                let message =
                    format!("MIME type {} doesn't match .{} extension", mime, extension);
                warn!("Rejected upload '{}': {}", filename, message);
                rejected.push(rejected_entry(&filename, &message));
                continue;
            }
        }

        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => {
                rejected.push(rejected_entry(
                    &filename,
                    &format!("Failed to read upload: {}", err),
                ));
                continue;
            }
        };

        let temp_name = format!("{}.{}", Uuid::new_v4().simple(), extension);
        let temp_path = state.paths.uploads_dir.join(temp_name);
        if let Err(err) = tokio::fs::write(&temp_path, &bytes).await {
            rejected.push(rejected_entry(
                &filename,
                &format!("Failed to save upload: {}", err),
            ));
            continue;
        }

        let job_id = state.queue.submit(temp_path, filename.clone()).await;
        info!("Queued ingest job {} for '{}'", job_id, filename);
        queued.push((job_id, filename));
    }

    if received == 0 {
        return Err(ApiError::BadRequest(
            "No files were provided in the request.".to_string(),
        ));
    }

    if queued.is_empty() {
        let body = json!({
            "message": "No valid files could be queued for processing.",
            "files": rejected,
        });
        return Ok((StatusCode::BAD_REQUEST, Json(body)).into_response());
    }

    let mut files: Vec<Value> = Vec::new();
    for (job_id, filename) in &queued {
        if params.wait {
            match state.queue.await_job(*job_id).await {
                Some(job) => files.push(finished_entry(&job)),
                None => files.push(json!({
                    "filename": filename,
                    "job_id": job_id,
                    "status": "unknown",
                })),
            }
        } else {
            files.push(json!({
                "filename": filename,
                "job_id": job_id,
                "status": "queued",
            }));
        }
    }
    files.append(&mut rejected);

    let body = json!({
        "message": format!(
            "Received {} file(s). Queued {} for processing.",
            received,
            queued.len()
        ),
        "files": files,
    });
    Ok(Json(body).into_response())
}

fn rejected_entry(filename: &str, error: &str) -> Value {
    json!({
        "filename": filename,
        "status": "error",
        "error": error,
    })
}

fn finished_entry(job: &IngestJob) -> Value {
    match &job.state {
        JobState::Completed { report } => json!({
            "filename": job.filename,
            "job_id": job.id,
            "status": "completed",
            "collection_name": report.collection_name,
            "chunks_processed": report.chunks_processed,
            "points_stored": report.points_stored,
        }),
        JobState::Failed { error } => json!({
            "filename": job.filename,
            "job_id": job.id,
            "status": "failed",
            "error": error,
        }),
        JobState::Queued | JobState::Running => json!({
            "filename": job.filename,
            "job_id": job.id,
            "status": "running",
        }),
    }
}
