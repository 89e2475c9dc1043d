use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::core::security::API_KEY_HEADER;
use crate::server::handlers::{config, data, health, logs, query, threads, upload};
use crate::state::AppState;

/// Uploads beyond this size are rejected before the multipart stream is read.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Builds the HTTP surface: health and status probes, config and log
/// endpoints, the ingestion and query APIs, and thread persistence, with
/// CORS and request tracing layered on top.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state);
    Router::new()
        .route("/health", get(health::health))
        .route("/api/status", get(health::get_status))
        .route("/api/shutdown", post(health::shutdown))
        .route(
            "/api/data/process",
            post(upload::process_files).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/data/jobs", get(data::list_jobs))
        .route("/api/data/jobs/:job_id", get(data::get_job))
        .route("/api/data/extracted", get(data::get_extracted_data))
        .route("/api/data/preview/:filename", get(data::preview_file))
        .route("/api/data/delete", delete(data::delete_file))
        .route("/api/query/ask", post(query::ask))
        .route(
            "/api/query/ask/multi-collection",
            post(query::ask_multi_collection),
        )
        .route(
            "/api/query/ask/all-collections",
            post(query::ask_all_collections),
        )
        .route(
            "/api/recommended-questions",
            get(query::recommended_questions),
        )
        .route("/api/suggest-followups", post(query::suggest_followups))
        .route(
            "/api/threads",
            get(threads::list_threads).post(threads::create_thread),
        )
        .route(
            "/api/threads/:thread_id",
            get(threads::get_thread)
                .put(threads::update_thread)
                .delete(threads::delete_thread),
        )
        .route(
            "/api/config",
            get(config::get_config)
                .post(config::update_config)
                .patch(config::patch_config),
        )
        .route("/api/logs", get(logs::get_logs))
        .route("/api/logs/:filename", get(logs::get_log_content))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(state: &Arc<AppState>) -> CorsLayer {
    let config = state.config.load_config().unwrap_or_else(|err| {
        tracing::warn!(
            "Could not read config while setting up CORS: {err}; allowing local origins only"
        );
        Value::Null
    });

    let mut origins = header_values(&allowed_origins(&config));
    if origins.is_empty() {
        origins = header_values(&default_local_origins());
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ACCEPT,
            header::CONTENT_TYPE,
            header::HeaderName::from_static(API_KEY_HEADER),
        ])
}

fn header_values(origins: &[String]) -> Vec<HeaderValue> {
    origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect()
}

/// Reads `server.cors_allowed_origins` (or the older `allowed_origins` key)
/// and falls back to the local dashboard origins when nothing usable is set.
fn allowed_origins(config: &Value) -> Vec<String> {
    let configured = config
        .get("server")
        .and_then(Value::as_object)
        .and_then(|server| {
            server
                .get("cors_allowed_origins")
                .or_else(|| server.get("allowed_origins"))
        })
        .and_then(Value::as_array);

    let mut origins = Vec::new();
    for entry in configured.into_iter().flatten() {
        if let Some(origin) = entry.as_str() {
            let origin = origin.trim();
            if !origin.is_empty() {
                origins.push(origin.to_string());
            }
        }
    }

    if origins.is_empty() {
        default_local_origins()
    } else {
        origins
    }
}

fn default_local_origins() -> Vec<String> {
    [
        "http://localhost",
        "http://localhost:3000",
        "http://localhost:5173",
        "http://127.0.0.1",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:5173",
        "http://127.0.0.1:8000",
    ]
    .map(String::from)
    .to_vec()
}
