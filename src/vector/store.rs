//! VectorIndex, the abstract interface over the vector database.
//!
//! The primary implementation is `QdrantIndex` in the `qdrant` module;
//! tests substitute an in-memory index. Cross-collection operations that
//! only need the primitive calls (ensure, validated batch store, delete by
//! filename) are provided methods so every backend shares their semantics.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use super::types::{
    is_system_collection, NewPoint, PointPayload, ScrollFilter, SearchHit, StoredPoint,
};
use crate::core::config::settings::ExistingCollectionPolicy;
use crate::core::errors::PipelineError;

/// Outcome of removing a file's data from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The file had a whole collection to itself; it was dropped.
    CollectionDeleted(String),
    /// Matching points were removed from one or more shared collections.
    PointsDeleted(usize),
    /// Nothing referenced the file.
    NotFound,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Check whether the store answers its health probe.
    async fn health_check(&self) -> Result<bool, PipelineError>;

    /// List every collection name, system collections included.
    async fn list_collections(&self) -> Result<Vec<String>, PipelineError>;

    async fn collection_exists(&self, name: &str) -> Result<bool, PipelineError>;

    /// Create a collection holding cosine-distance vectors of the given size.
    async fn create_collection(&self, name: &str, vector_size: usize)
        -> Result<(), PipelineError>;

    async fn delete_collection(&self, name: &str) -> Result<(), PipelineError>;

    /// Write a batch of prepared points in one call.
    async fn upsert_points(
        &self,
        collection: &str,
        points: Vec<NewPoint>,
    ) -> Result<(), PipelineError>;

    /// Similarity search. A missing collection fails with
    /// `CollectionNotFound`; callers may treat that as "no results".
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>, PipelineError>;

    /// Page through points, optionally restricted by a payload filter.
    async fn scroll(
        &self,
        collection: &str,
        filter: Option<&ScrollFilter>,
        limit: usize,
    ) -> Result<Vec<StoredPoint>, PipelineError>;

    /// Fetch specific points by id. Unknown ids are simply absent from the
    /// result.
    async fn retrieve(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<Vec<StoredPoint>, PipelineError>;

    async fn delete_points(&self, collection: &str, ids: &[String]) -> Result<(), PipelineError>;

    /// Create the collection if needed. When it already exists the policy
    /// decides between keeping it (`Skip`) and rebuilding it (`Recreate`).
    async fn ensure_collection(
        &self,
        name: &str,
        vector_size: usize,
        policy: ExistingCollectionPolicy,
    ) -> Result<(), PipelineError> {
        if self.collection_exists(name).await? {
            match policy {
                ExistingCollectionPolicy::Skip => return Ok(()),
                ExistingCollectionPolicy::Recreate => self.delete_collection(name).await?,
            }
        }
        self.create_collection(name, vector_size).await
    }

    /// Validated batch store: texts, metadata maps and vectors must line up,
    /// invalid entries are dropped with a count, and each surviving point
    /// gets a fresh id. Returns how many points were written.
    async fn store_documents(
        &self,
        collection: &str,
        texts: Vec<String>,
        metadatas: Vec<BTreeMap<String, String>>,
        vectors: Vec<Vec<f32>>,
        expected_dimension: usize,
    ) -> Result<usize, PipelineError> {
        let points = prepare_points(collection, texts, metadatas, vectors, expected_dimension)?;
        let stored = points.len();
        self.upsert_points(collection, points).await?;
        Ok(stored)
    }

    /// Remove everything ingested from `filename`. First looks for a
    /// dedicated collection named after the file, then falls back to a
    /// point-level sweep over the remaining collections.
    async fn delete_by_filename(&self, filename: &str) -> Result<DeleteOutcome, PipelineError> {
        let collections = self.list_collections().await?;
        let user_collections: Vec<&String> = collections
            .iter()
            .filter(|name| !is_system_collection(name))
            .collect();

        let prefixed = format!("{}_", filename);
        for name in &user_collections {
            if name.as_str() == filename || name.starts_with(&prefixed) {
                self.delete_collection(name).await?;
                return Ok(DeleteOutcome::CollectionDeleted((*name).clone()));
            }
        }

        let filter = ScrollFilter::for_filename(filename);
        let mut removed = 0usize;
        for name in &user_collections {
            let points = match self.scroll(name, Some(&filter), 1000).await {
                Ok(points) => points,
                Err(err) => {
                    warn!("Skipping collection '{}' during delete: {}", name, err);
                    continue;
                }
            };
            if points.is_empty() {
                continue;
            }
            let ids: Vec<String> = points.iter().map(|point| point.id.clone()).collect();
            self.delete_points(name, &ids).await?;
            removed += ids.len();
        }

        if removed > 0 {
            Ok(DeleteOutcome::PointsDeleted(removed))
        } else {
            Ok(DeleteOutcome::NotFound)
        }
    }
}

/// Pairs up texts, metadata and vectors into storable points.
///
/// Entries with blank text or a vector of the wrong dimension are skipped
/// and counted; a batch with no survivors is an error rather than a silent
/// empty write.
pub fn prepare_points(
    collection: &str,
    texts: Vec<String>,
    metadatas: Vec<BTreeMap<String, String>>,
    vectors: Vec<Vec<f32>>,
    expected_dimension: usize,
) -> Result<Vec<NewPoint>, PipelineError> {
    if texts.len() != metadatas.len() || texts.len() != vectors.len() {
        return Err(PipelineError::ArgumentMismatch {
            texts: texts.len(),
            metadatas: metadatas.len(),
            vectors: vectors.len(),
        });
    }

    let total = texts.len();
    let mut points = Vec::with_capacity(total);
    let mut skipped = 0usize;

    for ((text, metadata), vector) in texts.into_iter().zip(metadatas).zip(vectors) {
        if text.trim().is_empty() || vector.len() != expected_dimension {
            skipped += 1;
            continue;
        }
        points.push(NewPoint {
            id: Uuid::new_v4().to_string(),
            vector,
            payload: PointPayload::new(text, metadata),
        });
    }

    if skipped > 0 {
        warn!(
            "Skipped {} of {} points for '{}' (blank text or wrong vector dimension)",
            skipped, total, collection
        );
    }
    if points.is_empty() {
        return Err(PipelineError::NoValidPoints(collection.to_string()));
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::testing::FakeIndex;

    fn meta(source: &str) -> BTreeMap<String, String> {
        BTreeMap::from([("source".to_string(), source.to_string())])
    }

    #[test]
    fn prepare_points_rejects_mismatched_lengths() {
        let err = prepare_points(
            "sales",
            vec!["a".to_string(), "b".to_string()],
            vec![meta("sales.csv")],
            vec![vec![0.0; 4], vec![0.0; 4]],
            4,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::ArgumentMismatch {
                texts: 2,
                metadatas: 1,
                vectors: 2
            }
        ));
    }

    #[test]
    fn prepare_points_drops_blank_texts_and_bad_dimensions() {
        let points = prepare_points(
            "sales",
            vec![
                "Region: EMEA".to_string(),
                "   ".to_string(),
                "Region: APAC".to_string(),
            ],
            vec![meta("sales.csv"), meta("sales.csv"), meta("sales.csv")],
            vec![vec![0.1; 4], vec![0.2; 4], vec![0.3; 3]],
            4,
        )
        .unwrap();

        assert_eq!(points.len(), 1);
        assert_eq!(points[0].payload.content, "Region: EMEA");
    }

    #[test]
    fn prepare_points_with_no_survivors_is_an_error() {
        let err = prepare_points(
            "sales",
            vec!["  ".to_string()],
            vec![meta("sales.csv")],
            vec![vec![0.0; 4]],
            4,
        )
        .unwrap_err();

        assert!(matches!(err, PipelineError::NoValidPoints(name) if name == "sales"));
    }

    #[test]
    fn prepare_points_assigns_unique_ids() {
        let points = prepare_points(
            "sales",
            vec!["a".to_string(), "b".to_string()],
            vec![meta("sales.csv"), meta("sales.csv")],
            vec![vec![0.1; 2], vec![0.2; 2]],
            2,
        )
        .unwrap();

        assert_ne!(points[0].id, points[1].id);
    }

    #[tokio::test]
    async fn ensure_collection_skip_keeps_existing_points() {
        let index = FakeIndex::new();
        index.add_collection("sales", 4);
        index.add_point("sales", "p1", vec![0.1; 4], "row", &[("source", "sales.csv")]);

        index
            .ensure_collection("sales", 4, ExistingCollectionPolicy::Skip)
            .await
            .unwrap();

        assert_eq!(index.point_count("sales"), 1);
    }

    #[tokio::test]
    async fn ensure_collection_recreate_drops_existing_points() {
        let index = FakeIndex::new();
        index.add_collection("sales", 4);
        index.add_point("sales", "p1", vec![0.1; 4], "row", &[("source", "sales.csv")]);

        index
            .ensure_collection("sales", 4, ExistingCollectionPolicy::Recreate)
            .await
            .unwrap();

        assert_eq!(index.point_count("sales"), 0);
    }

    #[tokio::test]
    async fn delete_by_filename_prefers_the_dedicated_collection() {
        let index = FakeIndex::new();
        index.add_collection("sales", 4);
        index.add_point("sales", "p1", vec![0.1; 4], "row", &[("source", "sales.csv")]);

        let outcome = index.delete_by_filename("sales").await.unwrap();

        assert_eq!(outcome, DeleteOutcome::CollectionDeleted("sales".to_string()));
        assert!(!index.collection_exists("sales").await.unwrap());
    }

    #[tokio::test]
    async fn delete_by_filename_sweeps_points_in_shared_collections() {
        let index = FakeIndex::new();
        index.add_collection("reports", 4);
        index.add_point(
            "reports",
            "p1",
            vec![0.1; 4],
            "row one",
            &[("source", "q1.csv")],
        );
        index.add_point(
            "reports",
            "p2",
            vec![0.2; 4],
            "row two",
            &[("source", "q2.csv")],
        );

        let outcome = index.delete_by_filename("q1.csv").await.unwrap();

        assert_eq!(outcome, DeleteOutcome::PointsDeleted(1));
        assert_eq!(index.point_count("reports"), 1);
    }

    #[tokio::test]
    async fn delete_by_filename_reports_not_found() {
        let index = FakeIndex::new();
        index.add_collection("reports", 4);

        let outcome = index.delete_by_filename("missing.csv").await.unwrap();
        assert_eq!(outcome, DeleteOutcome::NotFound);
    }

    #[tokio::test]
    async fn delete_by_filename_never_touches_system_collections() {
        let index = FakeIndex::new();
        index.add_collection("tabula_threads", 4);
        index.add_point(
            "tabula_threads",
            "t1",
            vec![0.1; 4],
            "thread",
            &[("source", "tabula")],
        );

        let outcome = index.delete_by_filename("tabula").await.unwrap();

        assert_eq!(outcome, DeleteOutcome::NotFound);
        assert_eq!(index.point_count("tabula_threads"), 1);
    }
}
