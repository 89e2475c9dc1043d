use std::sync::Arc;

use tracing::warn;

use super::provider::LlmProvider;
use crate::core::errors::PipelineError;

/// Embedding front-end used by ingestion and retrieval. Knows the configured
/// vector dimension so mismatches fail here instead of inside the index.
#[derive(Clone)]
pub struct EmbeddingClient {
    provider: Arc<dyn LlmProvider>,
    dimension: usize,
}

impl EmbeddingClient {
    pub fn new(provider: Arc<dyn LlmProvider>, dimension: usize) -> Self {
        Self {
            provider,
            dimension,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        let vectors = self.provider.embed(&[text.to_string()]).await?;
        let vector = vectors.into_iter().next().ok_or_else(|| {
            PipelineError::EmbeddingService(
                "embedding service returned no vector for the query".to_string(),
            )
        })?;

        if vector.len() != self.dimension {
            return Err(PipelineError::EmbeddingService(format!(
                "query embedding has dimension {} but the index expects {}",
                vector.len(),
                self.dimension
            )));
        }
        Ok(vector)
    }

    /// Embeds a batch of document texts. Blank entries are dropped before
    /// the remote call; the returned vectors line up with the surviving
    /// inputs, so callers that need strict alignment must pass validated
    /// texts.
    pub async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        let valid: Vec<String> = texts
            .iter()
            .filter(|text| !text.trim().is_empty())
            .cloned()
            .collect();

        let dropped = texts.len() - valid.len();
        if dropped > 0 {
            warn!("Dropped {} blank texts from embedding batch", dropped);
        }
        if valid.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self.provider.embed(&valid).await?;
        if vectors.len() != valid.len() {
            return Err(PipelineError::EmbeddingService(format!(
                "embedding count mismatch: {} inputs but {} vectors",
                valid.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::FakeProvider;

    #[tokio::test]
    async fn blank_document_texts_are_dropped_before_the_remote_call() {
        let provider = Arc::new(FakeProvider::with_dimension(3));
        let client = EmbeddingClient::new(provider, 3);

        let texts = vec![
            "Region: EMEA".to_string(),
            "   ".to_string(),
            String::new(),
            "Region: APAC".to_string(),
        ];
        let vectors = client.embed_documents(&texts).await.unwrap();

        assert_eq!(vectors.len(), 2);
        assert!(vectors.iter().all(|v| v.len() == 3));
    }

    #[tokio::test]
    async fn all_blank_batch_returns_empty_without_calling_the_provider() {
        let provider = Arc::new(FakeProvider {
            fail_embed: true,
            ..FakeProvider::with_dimension(3)
        });
        let client = EmbeddingClient::new(provider, 3);

        let texts = vec!["  ".to_string(), String::new()];
        let vectors = client.embed_documents(&texts).await.unwrap();
        assert!(vectors.is_empty());
    }

    #[tokio::test]
    async fn query_embedding_with_wrong_dimension_is_rejected() {
        let provider = Arc::new(FakeProvider::with_dimension(4));
        let client = EmbeddingClient::new(provider, 8);

        let err = client.embed_query("total revenue").await.unwrap_err();
        assert!(matches!(err, PipelineError::EmbeddingService(_)));
    }

    #[tokio::test]
    async fn query_embedding_with_matching_dimension_passes() {
        let provider = Arc::new(FakeProvider::with_dimension(4));
        let client = EmbeddingClient::new(provider, 4);

        let vector = client.embed_query("total revenue").await.unwrap();
        assert_eq!(vector.len(), 4);
    }
}
