//! Chat thread persistence.
//!
//! Threads live in a reserved collection in the vector store rather than a
//! relational database. Each thread is one point: the id is the thread id,
//! the vector embeds the title so threads stay semantically searchable,
//! and the payload carries the serialized thread record.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::core::errors::PipelineError;
use crate::llm::EmbeddingClient;
use crate::vector::{NewPoint, PointPayload, VectorIndex};

/// Reserved collection holding chat threads. The system prefix keeps it out
/// of file listings, deletes, and all-collection queries.
pub const THREAD_COLLECTION: &str = "tabula_threads";

/// How many threads a listing returns at most.
const LIST_LIMIT: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub messages: Vec<ThreadMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub associated_files: Vec<String>,
}

pub struct ThreadStore {
    embeddings: EmbeddingClient,
    index: Arc<dyn VectorIndex>,
}

impl ThreadStore {
    pub fn new(embeddings: EmbeddingClient, index: Arc<dyn VectorIndex>) -> Self {
        Self { embeddings, index }
    }

    /// Creates the thread collection if it is missing. Existing collections
    /// are always kept; recreating would wipe every stored thread.
    pub async fn ensure_collection(&self) -> Result<(), PipelineError> {
        if !self.index.collection_exists(THREAD_COLLECTION).await? {
            self.index
                .create_collection(THREAD_COLLECTION, self.embeddings.dimension())
                .await?;
        }
        Ok(())
    }

    /// Writes a thread, replacing any existing point with the same id.
    pub async fn save(&self, thread: &Thread) -> Result<(), PipelineError> {
        self.ensure_collection().await?;

        let vector = self.embeddings.embed_query(&thread.title).await?;
        let point = NewPoint {
            id: thread.id.to_string(),
            vector,
            payload: encode_thread(thread)?,
        };
        self.index
            .upsert_points(THREAD_COLLECTION, vec![point])
            .await
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Thread>, PipelineError> {
        let points = match self
            .index
            .retrieve(THREAD_COLLECTION, &[id.to_string()])
            .await
        {
            Ok(points) => points,
            Err(PipelineError::CollectionNotFound(_)) => return Ok(None),
            Err(err) => return Err(err),
        };
        Ok(points
            .into_iter()
            .next()
            .and_then(|point| decode_thread(&point.payload)))
    }

    /// All stored threads, most recently updated first. Points that no
    /// longer decode are logged and skipped.
    pub async fn list(&self) -> Result<Vec<Thread>, PipelineError> {
        let points = match self.index.scroll(THREAD_COLLECTION, None, LIST_LIMIT).await {
            Ok(points) => points,
            Err(PipelineError::CollectionNotFound(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };

        let mut threads: Vec<Thread> = points
            .iter()
            .filter_map(|point| decode_thread(&point.payload))
            .collect();
        threads.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(threads)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), PipelineError> {
        self.index
            .delete_points(THREAD_COLLECTION, &[id.to_string()])
            .await
    }
}

fn encode_thread(thread: &Thread) -> Result<PointPayload, PipelineError> {
    let record = serde_json::to_string(thread).map_err(|err| {
        PipelineError::VectorStore(format!("could not serialize thread {}: {}", thread.id, err))
    })?;

    let mut metadata = std::collections::BTreeMap::new();
    metadata.insert("thread".to_string(), record);
    metadata.insert("updated_at".to_string(), thread.updated_at.to_rfc3339());
    Ok(PointPayload::new(thread.title.clone(), metadata))
}

fn decode_thread(payload: &PointPayload) -> Option<Thread> {
    let record = payload.metadata.get("thread")?;
    match serde_json::from_str(record) {
        Ok(thread) => Some(thread),
        Err(err) => {
            warn!("Skipping undecodable thread point: {}", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::FakeProvider;
    use crate::vector::testing::FakeIndex;

    fn store_over(index: Arc<FakeIndex>) -> ThreadStore {
        let embeddings = EmbeddingClient::new(Arc::new(FakeProvider::with_dimension(4)), 4);
        ThreadStore::new(embeddings, index)
    }

    fn thread_titled(title: &str, updated_at: DateTime<Utc>) -> Thread {
        Thread {
            id: Uuid::new_v4(),
            title: title.to_string(),
            messages: vec![ThreadMessage {
                role: "user".to_string(),
                content: "what was revenue?".to_string(),
                timestamp: Some(updated_at),
            }],
            created_at: updated_at,
            updated_at,
            associated_files: vec!["sales.csv".to_string()],
        }
    }

    #[tokio::test]
    async fn save_then_get_round_trips_the_record() {
        let index = Arc::new(FakeIndex::new());
        let store = store_over(index.clone());

        let thread = thread_titled("Revenue questions", Utc::now());
        store.save(&thread).await.unwrap();

        assert!(index.collection_exists(THREAD_COLLECTION).await.unwrap());
        let loaded = store.get(thread.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, thread.id);
        assert_eq!(loaded.title, "Revenue questions");
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.associated_files, vec!["sales.csv".to_string()]);
    }

    #[tokio::test]
    async fn saving_twice_replaces_instead_of_duplicating() {
        let index = Arc::new(FakeIndex::new());
        let store = store_over(index.clone());

        let mut thread = thread_titled("First title", Utc::now());
        store.save(&thread).await.unwrap();
        thread.title = "Second title".to_string();
        store.save(&thread).await.unwrap();

        assert_eq!(index.point_count(THREAD_COLLECTION), 1);
        let loaded = store.get(thread.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "Second title");
    }

    #[tokio::test]
    async fn listing_sorts_newest_updated_first_and_skips_garbage() {
        let index = Arc::new(FakeIndex::new());
        let store = store_over(index.clone());

        let older = thread_titled("Older", Utc::now() - chrono::Duration::hours(2));
        let newer = thread_titled("Newer", Utc::now());
        store.save(&older).await.unwrap();
        store.save(&newer).await.unwrap();
        index.add_point(
            THREAD_COLLECTION,
            "broken",
            vec![0.0, 0.0, 0.0, 0.0],
            "not a thread",
            &[("thread", "{malformed")],
        );

        let threads = store.list().await.unwrap();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].title, "Newer");
        assert_eq!(threads[1].title, "Older");
    }

    #[tokio::test]
    async fn missing_threads_and_missing_collection_read_as_none() {
        let store = store_over(Arc::new(FakeIndex::new()));

        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_the_point() {
        let index = Arc::new(FakeIndex::new());
        let store = store_over(index.clone());

        let thread = thread_titled("Doomed", Utc::now());
        store.save(&thread).await.unwrap();
        store.delete(thread.id).await.unwrap();

        assert_eq!(index.point_count(THREAD_COLLECTION), 0);
        assert!(store.get(thread.id).await.unwrap().is_none());
    }
}
