use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::core::errors::ApiError;
use crate::core::security::require_api_key;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AskParams {
    pub collection_name: String,
}

#[derive(Debug, Deserialize)]
pub struct AskBody {
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct MultiAskBody {
    pub query: String,
    #[serde(default)]
    pub collections: Vec<String>,
}

pub async fn ask(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<AskParams>,
    Json(body): Json<AskBody>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.session_token)?;

    let retrieved = state
        .retriever
        .retrieve(&params.collection_name, &body.query)
        .await?;
    let answer = state.answers.answer(&body.query, &retrieved).await?;
    Ok(Json(json!({"answer": answer, "sources": retrieved.sources})))
}

pub async fn ask_multi_collection(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<MultiAskBody>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.session_token)?;

    let retrieved = state
        .retriever
        .retrieve_multi(&body.collections, &body.query)
        .await?;
    let answer = state.answers.answer(&body.query, &retrieved).await?;
    Ok(Json(json!({"answer": answer, "sources": retrieved.sources})))
}

pub async fn ask_all_collections(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<AskBody>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.session_token)?;

    let retrieved = state.retriever.retrieve_all(&body.query).await?;
    let answer = state.answers.answer(&body.query, &retrieved).await?;
    Ok(Json(json!({"answer": answer, "sources": retrieved.sources})))
}

#[derive(Debug, Deserialize)]
pub struct RecommendedParams {
    #[serde(default = "default_recommended_count")]
    pub count: usize,
}

fn default_recommended_count() -> usize {
    5
}

pub async fn recommended_questions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<RecommendedParams>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.session_token)?;

    let recommendations = state.suggester.recommended(params.count).await?;
    Ok(Json(
        json!({"success": true, "recommendations": recommendations}),
    ))
}

#[derive(Debug, Deserialize)]
pub struct FollowupBody {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: String,
}

pub async fn suggest_followups(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<FollowupBody>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.session_token)?;

    if body.question.trim().is_empty() || body.answer.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Question and answer are required".to_string(),
        ));
    }

    let suggestions = state.suggester.followups(&body.question, &body.answer).await;
    Ok(Json(json!({"success": true, "suggestions": suggestions})))
}
