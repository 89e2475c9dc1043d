use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// HTTP-facing error type shared by all handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unprocessable: {0}")]
    Unprocessable(String),
    #[error("upstream service error: {0}")]
    BadGateway(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        // Response bodies carry the bare message, without the variant prefix.
        let message = match self {
            ApiError::Unauthorized => "Unauthorized".to_string(),
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::Unprocessable(msg)
            | ApiError::BadGateway(msg)
            | ApiError::Internal(msg) => msg,
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Failures of the ingestion/retrieval pipeline.
///
/// Per-chunk validation problems (empty text, wrong vector dimension) are not
/// errors at this level; they are dropped and counted by the callers. These
/// variants cover the failures that abort an operation.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Unsupported file type: '{0}'")]
    UnsupportedFileType(String),
    #[error("Failed to load file '{file}': {reason}")]
    FileLoad { file: String, reason: String },
    #[error(
        "texts ({texts}), metadatas ({metadatas}) and vectors ({vectors}) must have equal lengths"
    )]
    ArgumentMismatch {
        texts: usize,
        metadatas: usize,
        vectors: usize,
    },
    #[error("Embedding service error: {0}")]
    EmbeddingService(String),
    #[error("No valid points to store in '{0}'")]
    NoValidPoints(String),
    #[error("Collection not found: '{0}'")]
    CollectionNotFound(String),
    #[error("No collections available in the vector store")]
    NoCollectionsAvailable,
    #[error("Query must not be empty")]
    EmptyQuery,
    #[error("Vector store error: {0}")]
    VectorStore(String),
    #[error("Chat service error: {0}")]
    ChatService(String),
}

impl PipelineError {
    pub fn vector_store<E: std::fmt::Display>(err: E) -> Self {
        PipelineError::VectorStore(err.to_string())
    }

    pub fn embedding<E: std::fmt::Display>(err: E) -> Self {
        PipelineError::EmbeddingService(err.to_string())
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let message = err.to_string();
        match err {
            PipelineError::UnsupportedFileType(_)
            | PipelineError::ArgumentMismatch { .. }
            | PipelineError::EmptyQuery => ApiError::BadRequest(message),
            PipelineError::CollectionNotFound(_) | PipelineError::NoCollectionsAvailable => {
                ApiError::NotFound(message)
            }
            PipelineError::FileLoad { .. } | PipelineError::NoValidPoints(_) => {
                ApiError::Unprocessable(message)
            }
            PipelineError::EmbeddingService(_)
            | PipelineError::VectorStore(_)
            | PipelineError::ChatService(_) => ApiError::BadGateway(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_side_pipeline_errors_map_to_bad_request() {
        let unsupported: ApiError = PipelineError::UnsupportedFileType(".pdf".to_string()).into();
        assert!(matches!(unsupported, ApiError::BadRequest(_)));

        let empty: ApiError = PipelineError::EmptyQuery.into();
        assert!(matches!(empty, ApiError::BadRequest(_)));

        let mismatch: ApiError = PipelineError::ArgumentMismatch {
            texts: 3,
            metadatas: 2,
            vectors: 3,
        }
        .into();
        assert!(matches!(mismatch, ApiError::BadRequest(_)));
    }

    #[test]
    fn missing_collections_map_to_not_found() {
        let missing: ApiError = PipelineError::CollectionNotFound("sales".to_string()).into();
        assert!(matches!(missing, ApiError::NotFound(_)));

        let none: ApiError = PipelineError::NoCollectionsAvailable.into();
        assert!(matches!(none, ApiError::NotFound(_)));
    }

    #[test]
    fn remote_service_errors_map_to_bad_gateway() {
        let embed: ApiError = PipelineError::EmbeddingService("quota".to_string()).into();
        assert!(matches!(embed, ApiError::BadGateway(_)));

        let store: ApiError = PipelineError::VectorStore("timeout".to_string()).into();
        assert!(matches!(store, ApiError::BadGateway(_)));

        let chat: ApiError = PipelineError::ChatService("503".to_string()).into();
        assert!(matches!(chat, ApiError::BadGateway(_)));
    }

    #[test]
    fn argument_mismatch_message_reports_all_lengths() {
        let err = PipelineError::ArgumentMismatch {
            texts: 5,
            metadatas: 4,
            vectors: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("5"));
        assert!(msg.contains("4"));
        assert!(msg.contains("3"));
    }
}
