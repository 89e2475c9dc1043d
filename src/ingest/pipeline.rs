use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::chunker::Chunker;
use super::loader::FileLoader;
use crate::core::config::settings::{EngineSettings, ExistingCollectionPolicy};
use crate::core::errors::PipelineError;
use crate::llm::{EmbeddingClient, LlmProvider};
use crate::vector::VectorIndex;

/// Result of ingesting one file.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub collection_name: Option<String>,
    pub chunks_processed: usize,
    pub points_stored: usize,
}

/// Derives the collection name from a filename: the stem with every
/// non-alphanumeric character flattened to `_`, lowercased, and trimmed of
/// leading and trailing underscores. Names that sanitize to nothing get a
/// random `file_` fallback.
pub fn collection_name_for(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("");

    let sanitized: String = stem
        .chars()
        .map(|ch| if ch.is_alphanumeric() { ch } else { '_' })
        .collect::<String>()
        .to_lowercase();
    let trimmed = sanitized.trim_matches('_');

    if trimmed.is_empty() {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("file_{}", &suffix[..8])
    } else {
        trimmed.to_string()
    }
}

/// Load, chunk, embed and store: one file in, one collection of points out.
pub struct IngestPipeline {
    loader: FileLoader,
    chunker: Chunker,
    embeddings: EmbeddingClient,
    index: Arc<dyn VectorIndex>,
    on_existing: ExistingCollectionPolicy,
}

impl IngestPipeline {
    pub fn new(
        settings: &EngineSettings,
        provider: Arc<dyn LlmProvider>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            loader: FileLoader::new(&settings.ingest.allowed_extensions),
            chunker: Chunker::new(&settings.ingest),
            embeddings: EmbeddingClient::new(provider, settings.embedding_dimension),
            index,
            on_existing: settings.vector_store.on_existing,
        }
    }

    pub fn loader(&self) -> &FileLoader {
        &self.loader
    }

    /// Runs the whole ingestion for one file. `path` is the saved upload on
    /// disk, `original_name` the name the client sent; the collection name
    /// and all metadata stamps derive from the latter.
    ///
    /// Two concurrent ingests whose filenames sanitize to the same
    /// collection interleave at the ensure/write boundary; points from both
    /// end up in the collection.
    pub async fn process_and_store(
        &self,
        path: &Path,
        original_name: &str,
    ) -> Result<IngestReport, PipelineError> {
        let elements = self.loader.load(path, original_name).await?;
        let chunks = self.chunker.chunk_elements(&elements, original_name);
        if chunks.is_empty() {
            info!("No content extracted from '{}'", original_name);
            return Ok(IngestReport {
                collection_name: None,
                chunks_processed: 0,
                points_stored: 0,
            });
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embeddings.embed_documents(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(PipelineError::EmbeddingService(format!(
                "embedding count mismatch for '{}': {} chunks but {} vectors",
                original_name,
                texts.len(),
                vectors.len()
            )));
        }

        let collection = collection_name_for(original_name);
        self.index
            .ensure_collection(&collection, self.embeddings.dimension(), self.on_existing)
            .await?;

        let chunks_processed = chunks.len();
        let metadatas: Vec<BTreeMap<String, String>> =
            chunks.into_iter().map(|chunk| chunk.metadata).collect();
        let stored = self
            .index
            .store_documents(
                &collection,
                texts,
                metadatas,
                vectors,
                self.embeddings.dimension(),
            )
            .await?;

        info!(
            "Stored {} points into '{}' from '{}'",
            stored, collection, original_name
        );
        Ok(IngestReport {
            collection_name: Some(collection),
            chunks_processed,
            points_stored: stored,
        })
    }
}
