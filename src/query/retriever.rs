//! Context retrieval across one, several, or all collections.
//!
//! Each mode embeds the question once and searches the vector store; hits
//! come back in store order (descending score, no re-ranking here) and are
//! rendered into a context block per hit.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::warn;

use crate::core::config::settings::QuerySettings;
use crate::core::errors::PipelineError;
use crate::llm::EmbeddingClient;
use crate::vector::{is_system_collection, SearchHit, VectorIndex};

/// Context handed to the answer step when retrieval finds nothing. The
/// model still gets to answer, it just knows there is no data behind it.
pub const EMPTY_CONTEXT: &str = "No specific documents found in the knowledge base.";

/// Outcome of one retrieval pass.
#[derive(Debug, Clone)]
pub struct RetrievedContext {
    pub context: String,
    pub sources: Vec<String>,
}

impl RetrievedContext {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

pub struct Retriever {
    embeddings: EmbeddingClient,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
    multi_top_k: usize,
}

impl Retriever {
    pub fn new(
        settings: &QuerySettings,
        embeddings: EmbeddingClient,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            embeddings,
            index,
            top_k: settings.top_k,
            multi_top_k: settings.multi_collection_top_k,
        }
    }

    /// Searches a single collection with the full result limit. A missing
    /// collection propagates as `CollectionNotFound`.
    pub async fn retrieve(
        &self,
        collection: &str,
        query: &str,
    ) -> Result<RetrievedContext, PipelineError> {
        let vector = self.embed_query(query).await?;
        let hits = self.index.search(collection, &vector, self.top_k).await?;
        Ok(build_context(&hits))
    }

    /// Searches each named collection with a smaller per-collection limit
    /// and merges the hits. A collection whose search fails is logged and
    /// skipped so one bad collection cannot sink the whole query.
    pub async fn retrieve_multi(
        &self,
        collections: &[String],
        query: &str,
    ) -> Result<RetrievedContext, PipelineError> {
        let vector = self.embed_query(query).await?;

        let searches = collections.iter().map(|collection| {
            let vector = vector.clone();
            async move {
                (
                    collection.as_str(),
                    self.index
                        .search(collection, &vector, self.multi_top_k)
                        .await,
                )
            }
        });

        let mut hits = Vec::new();
        for (collection, outcome) in join_all(searches).await {
            match outcome {
                Ok(batch) => hits.extend(batch),
                Err(err) => warn!("Search failed for collection '{}': {}", collection, err),
            }
        }
        Ok(build_context(&hits))
    }

    /// Enumerates every non-system collection and fans the query out over
    /// them. No collections at all is an error the caller can surface.
    pub async fn retrieve_all(&self, query: &str) -> Result<RetrievedContext, PipelineError> {
        let collections: Vec<String> = self
            .index
            .list_collections()
            .await?
            .into_iter()
            .filter(|name| !is_system_collection(name))
            .collect();
        if collections.is_empty() {
            return Err(PipelineError::NoCollectionsAvailable);
        }
        self.retrieve_multi(&collections, query).await
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, PipelineError> {
        if query.trim().is_empty() {
            return Err(PipelineError::EmptyQuery);
        }
        self.embeddings.embed_query(query).await
    }
}

fn build_context(hits: &[SearchHit]) -> RetrievedContext {
    if hits.is_empty() {
        return RetrievedContext {
            context: EMPTY_CONTEXT.to_string(),
            sources: Vec::new(),
        };
    }

    let mut sources = BTreeSet::new();
    let blocks: Vec<String> = hits
        .iter()
        .map(|hit| {
            let source = hit
                .payload
                .metadata
                .get("source")
                .or_else(|| hit.payload.metadata.get("filename"))
                .map(String::as_str)
                .unwrap_or("unknown");
            sources.insert(source.to_string());
            format!("Source: {}\nContent: {}", source, hit.payload.content)
        })
        .collect();

    RetrievedContext {
        context: blocks.join("\n\n"),
        sources: sources.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::FakeProvider;
    use crate::vector::testing::FakeIndex;

    fn retriever_over(index: Arc<FakeIndex>) -> Retriever {
        let embeddings = EmbeddingClient::new(Arc::new(FakeProvider::with_dimension(4)), 4);
        Retriever::new(&QuerySettings::default(), embeddings, index)
    }

    #[tokio::test]
    async fn single_collection_context_lists_hits_in_score_order() {
        let index = Arc::new(FakeIndex::new());
        index.add_collection("sales", 4);
        index.add_point(
            "sales",
            "p1",
            vec![0.1, 0.0, 0.0, 0.0],
            "Region: EMEA Revenue: 15000",
            &[("source", "sales.csv")],
        );
        index.add_point(
            "sales",
            "p2",
            vec![1.0, 0.0, 0.0, 0.0],
            "Region: APAC Revenue: 32000",
            &[("source", "sales.csv")],
        );

        let retrieved = retriever_over(index)
            .retrieve("sales", "total revenue")
            .await
            .unwrap();

        let apac = retrieved.context.find("APAC").unwrap();
        let emea = retrieved.context.find("EMEA").unwrap();
        assert!(apac < emea);
        assert!(retrieved.context.contains("Source: sales.csv\nContent: Region: APAC"));
        assert_eq!(retrieved.sources, vec!["sales.csv".to_string()]);
    }

    #[tokio::test]
    async fn blank_questions_are_rejected_before_any_embedding() {
        let index = Arc::new(FakeIndex::new());
        index.add_collection("sales", 4);

        let err = retriever_over(index)
            .retrieve("sales", "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyQuery));
    }

    #[tokio::test]
    async fn empty_collections_yield_the_placeholder_context() {
        let index = Arc::new(FakeIndex::new());
        index.add_collection("sales", 4);

        let retrieved = retriever_over(index)
            .retrieve("sales", "total revenue")
            .await
            .unwrap();

        assert_eq!(retrieved.context, EMPTY_CONTEXT);
        assert!(retrieved.sources.is_empty());
        assert!(retrieved.is_empty());
    }

    #[tokio::test]
    async fn missing_single_collection_propagates_not_found() {
        let index = Arc::new(FakeIndex::new());
        let err = retriever_over(index)
            .retrieve("ghost", "total revenue")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::CollectionNotFound(_)));
    }

    #[tokio::test]
    async fn multi_collection_skips_failing_collections_and_dedupes_sources() {
        let index = Arc::new(FakeIndex::new());
        index.add_collection("sales", 4);
        index.add_collection("costs", 4);
        index.add_point(
            "sales",
            "p1",
            vec![1.0, 0.0, 0.0, 0.0],
            "Revenue: 15000",
            &[("source", "sales.csv")],
        );
        index.add_point(
            "costs",
            "p2",
            vec![1.0, 0.0, 0.0, 0.0],
            "Cost: 9000",
            &[("source", "costs.csv")],
        );
        index.add_point(
            "costs",
            "p3",
            vec![0.5, 0.0, 0.0, 0.0],
            "Cost: 4000",
            &[("source", "costs.csv")],
        );
        index.fail_collection("broken");

        let collections = vec![
            "sales".to_string(),
            "broken".to_string(),
            "costs".to_string(),
        ];
        let retrieved = retriever_over(index)
            .retrieve_multi(&collections, "spend")
            .await
            .unwrap();

        assert!(retrieved.context.contains("Revenue: 15000"));
        assert!(retrieved.context.contains("Cost: 9000"));
        assert_eq!(
            retrieved.sources,
            vec!["costs.csv".to_string(), "sales.csv".to_string()]
        );
    }

    #[tokio::test]
    async fn all_collections_mode_ignores_system_collections() {
        let index = Arc::new(FakeIndex::new());
        index.add_collection("tabula_threads", 4);
        index.add_collection("sales", 4);
        index.add_point(
            "sales",
            "p1",
            vec![1.0, 0.0, 0.0, 0.0],
            "Revenue: 15000",
            &[("source", "sales.csv")],
        );
        index.add_point(
            "tabula_threads",
            "t1",
            vec![1.0, 0.0, 0.0, 0.0],
            "thread payload",
            &[("source", "thread")],
        );

        let retrieved = retriever_over(index)
            .retrieve_all("total revenue")
            .await
            .unwrap();

        assert!(retrieved.context.contains("Revenue: 15000"));
        assert!(!retrieved.context.contains("thread payload"));
        assert_eq!(retrieved.sources, vec!["sales.csv".to_string()]);
    }

    #[tokio::test]
    async fn no_data_collections_at_all_is_an_error() {
        let index = Arc::new(FakeIndex::new());
        index.add_collection("tabula_threads", 4);

        let err = retriever_over(index)
            .retrieve_all("total revenue")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoCollectionsAvailable));
    }
}
