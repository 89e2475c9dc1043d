pub mod qdrant;
pub mod store;
pub mod types;

pub use qdrant::QdrantIndex;
pub use store::{DeleteOutcome, VectorIndex};
pub use types::{
    is_system_collection, NewPoint, PointPayload, ScrollFilter, SearchHit, StoredPoint,
    SYSTEM_COLLECTION_PREFIX,
};

#[cfg(test)]
pub(crate) mod testing {
    use std::cmp::Ordering;
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::store::VectorIndex;
    use super::types::{NewPoint, PointPayload, ScrollFilter, SearchHit, StoredPoint};
    use crate::core::errors::PipelineError;

    struct FakeCollection {
        #[allow(dead_code)]
        vector_size: usize,
        points: Vec<NewPoint>,
    }

    /// In-memory index mirroring the remote semantics: missing collections
    /// fail with `CollectionNotFound`, scroll honors payload filters, and
    /// upserts replace points that reuse an id. Collections can be marked
    /// as failing to exercise skip-on-error paths.
    pub(crate) struct FakeIndex {
        collections: Mutex<BTreeMap<String, FakeCollection>>,
        failing: Mutex<BTreeSet<String>>,
    }

    impl FakeIndex {
        pub(crate) fn new() -> Self {
            Self {
                collections: Mutex::new(BTreeMap::new()),
                failing: Mutex::new(BTreeSet::new()),
            }
        }

        pub(crate) fn add_collection(&self, name: &str, vector_size: usize) {
            self.collections.lock().unwrap().insert(
                name.to_string(),
                FakeCollection {
                    vector_size,
                    points: Vec::new(),
                },
            );
        }

        pub(crate) fn add_point(
            &self,
            collection: &str,
            id: &str,
            vector: Vec<f32>,
            content: &str,
            metadata: &[(&str, &str)],
        ) {
            let metadata: BTreeMap<String, String> = metadata
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect();
            let mut collections = self.collections.lock().unwrap();
            let entry = collections
                .get_mut(collection)
                .expect("collection not registered in FakeIndex");
            entry.points.push(NewPoint {
                id: id.to_string(),
                vector,
                payload: PointPayload::new(content.to_string(), metadata),
            });
        }

        /// Makes search and scroll fail for the given collection.
        pub(crate) fn fail_collection(&self, name: &str) {
            self.failing.lock().unwrap().insert(name.to_string());
        }

        pub(crate) fn point_count(&self, name: &str) -> usize {
            self.collections
                .lock()
                .unwrap()
                .get(name)
                .map(|entry| entry.points.len())
                .unwrap_or(0)
        }

        fn check_failing(&self, name: &str) -> Result<(), PipelineError> {
            if self.failing.lock().unwrap().contains(name) {
                return Err(PipelineError::VectorStore(format!(
                    "scripted failure for '{}'",
                    name
                )));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl VectorIndex for FakeIndex {
        async fn health_check(&self) -> Result<bool, PipelineError> {
            Ok(true)
        }

        async fn list_collections(&self) -> Result<Vec<String>, PipelineError> {
            Ok(self.collections.lock().unwrap().keys().cloned().collect())
        }

        async fn collection_exists(&self, name: &str) -> Result<bool, PipelineError> {
            Ok(self.collections.lock().unwrap().contains_key(name))
        }

        async fn create_collection(
            &self,
            name: &str,
            vector_size: usize,
        ) -> Result<(), PipelineError> {
            self.add_collection(name, vector_size);
            Ok(())
        }

        async fn delete_collection(&self, name: &str) -> Result<(), PipelineError> {
            let removed = self.collections.lock().unwrap().remove(name);
            if removed.is_none() {
                return Err(PipelineError::CollectionNotFound(name.to_string()));
            }
            Ok(())
        }

        async fn upsert_points(
            &self,
            collection: &str,
            points: Vec<NewPoint>,
        ) -> Result<(), PipelineError> {
            let mut collections = self.collections.lock().unwrap();
            let entry = collections
                .get_mut(collection)
                .ok_or_else(|| PipelineError::CollectionNotFound(collection.to_string()))?;

            let ids: BTreeSet<String> = points.iter().map(|point| point.id.clone()).collect();
            entry.points.retain(|point| !ids.contains(&point.id));
            entry.points.extend(points);
            Ok(())
        }

        async fn search(
            &self,
            collection: &str,
            vector: &[f32],
            limit: usize,
        ) -> Result<Vec<SearchHit>, PipelineError> {
            self.check_failing(collection)?;
            let collections = self.collections.lock().unwrap();
            let entry = collections
                .get(collection)
                .ok_or_else(|| PipelineError::CollectionNotFound(collection.to_string()))?;

            let mut hits: Vec<SearchHit> = entry
                .points
                .iter()
                .map(|point| SearchHit {
                    score: dot(&point.vector, vector),
                    payload: point.payload.clone(),
                })
                .collect();
            hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
            hits.truncate(limit);
            Ok(hits)
        }

        async fn scroll(
            &self,
            collection: &str,
            filter: Option<&ScrollFilter>,
            limit: usize,
        ) -> Result<Vec<StoredPoint>, PipelineError> {
            self.check_failing(collection)?;
            let collections = self.collections.lock().unwrap();
            let entry = collections
                .get(collection)
                .ok_or_else(|| PipelineError::CollectionNotFound(collection.to_string()))?;

            let points = entry
                .points
                .iter()
                .filter(|point| filter.map(|f| f.matches(&point.payload)).unwrap_or(true))
                .take(limit)
                .map(|point| StoredPoint {
                    id: point.id.clone(),
                    payload: point.payload.clone(),
                })
                .collect();
            Ok(points)
        }

        async fn retrieve(
            &self,
            collection: &str,
            ids: &[String],
        ) -> Result<Vec<StoredPoint>, PipelineError> {
            let collections = self.collections.lock().unwrap();
            let entry = collections
                .get(collection)
                .ok_or_else(|| PipelineError::CollectionNotFound(collection.to_string()))?;

            let points = entry
                .points
                .iter()
                .filter(|point| ids.contains(&point.id))
                .map(|point| StoredPoint {
                    id: point.id.clone(),
                    payload: point.payload.clone(),
                })
                .collect();
            Ok(points)
        }

        async fn delete_points(
            &self,
            collection: &str,
            ids: &[String],
        ) -> Result<(), PipelineError> {
            let mut collections = self.collections.lock().unwrap();
            let entry = collections
                .get_mut(collection)
                .ok_or_else(|| PipelineError::CollectionNotFound(collection.to_string()))?;
            entry.points.retain(|point| !ids.contains(&point.id));
            Ok(())
        }
    }

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }
}
