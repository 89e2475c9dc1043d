use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};

use super::store::VectorIndex;
use super::types::{NewPoint, PointPayload, ScrollFilter, SearchHit, StoredPoint};
use crate::core::config::settings::VectorStoreSettings;
use crate::core::errors::PipelineError;

/// REST client for a hosted Qdrant instance. Collection names are
/// percent-encoded into the path; the optional api-key is sent as a header
/// on every request.
#[derive(Clone)]
pub struct QdrantIndex {
    base_url: String,
    api_key: String,
    client: Client,
}

impl QdrantIndex {
    pub fn new(settings: &VectorStoreSettings) -> Self {
        Self {
            base_url: settings.endpoint.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            client: Client::new(),
        }
    }

    fn collection_path(&self, name: &str) -> String {
        format!("/collections/{}", urlencoding::encode(name))
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if !self.api_key.is_empty() {
            builder = builder.header("api-key", &self.api_key);
        }
        builder
    }
}

/// Turns a non-success response into the right error: 404 on a
/// collection-scoped call means the collection does not exist, everything
/// else is a store failure carrying the status and body.
async fn expect_success(
    res: reqwest::Response,
    collection: Option<&str>,
) -> Result<reqwest::Response, PipelineError> {
    if res.status().is_success() {
        return Ok(res);
    }
    if res.status() == StatusCode::NOT_FOUND {
        if let Some(name) = collection {
            return Err(PipelineError::CollectionNotFound(name.to_string()));
        }
    }
    let status = res.status();
    let text = res.text().await.unwrap_or_default();
    Err(PipelineError::VectorStore(format!("{} {}", status, text)))
}

fn id_to_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        _ => String::new(),
    }
}

fn payload_of(item: &Value) -> PointPayload {
    PointPayload::from_value(item.get("payload").unwrap_or(&Value::Null))
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn health_check(&self) -> Result<bool, PipelineError> {
        let res = self.request(Method::GET, "/healthz").send().await;
        match res {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn list_collections(&self) -> Result<Vec<String>, PipelineError> {
        let res = self
            .request(Method::GET, "/collections")
            .send()
            .await
            .map_err(PipelineError::vector_store)?;
        let res = expect_success(res, None).await?;

        let payload: Value = res.json().await.map_err(PipelineError::vector_store)?;
        let names = payload["result"]["collections"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(names)
    }

    async fn collection_exists(&self, name: &str) -> Result<bool, PipelineError> {
        let res = self
            .request(Method::GET, &self.collection_path(name))
            .send()
            .await
            .map_err(PipelineError::vector_store)?;

        if res.status().is_success() {
            return Ok(true);
        }
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let status = res.status();
        let text = res.text().await.unwrap_or_default();
        Err(PipelineError::VectorStore(format!("{} {}", status, text)))
    }

    async fn create_collection(
        &self,
        name: &str,
        vector_size: usize,
    ) -> Result<(), PipelineError> {
        let body = json!({
            "vectors": { "size": vector_size, "distance": "Cosine" }
        });
        let res = self
            .request(Method::PUT, &self.collection_path(name))
            .json(&body)
            .send()
            .await
            .map_err(PipelineError::vector_store)?;
        expect_success(res, None).await?;
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), PipelineError> {
        let res = self
            .request(Method::DELETE, &self.collection_path(name))
            .send()
            .await
            .map_err(PipelineError::vector_store)?;
        expect_success(res, Some(name)).await?;
        Ok(())
    }

    async fn upsert_points(
        &self,
        collection: &str,
        points: Vec<NewPoint>,
    ) -> Result<(), PipelineError> {
        let entries: Vec<Value> = points
            .into_iter()
            .map(|point| {
                json!({
                    "id": point.id,
                    "vector": point.vector,
                    "payload": point.payload,
                })
            })
            .collect();

        let path = format!("{}/points?wait=true", self.collection_path(collection));
        let res = self
            .request(Method::PUT, &path)
            .json(&json!({ "points": entries }))
            .send()
            .await
            .map_err(PipelineError::vector_store)?;
        expect_success(res, Some(collection)).await?;
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>, PipelineError> {
        let body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });

        let path = format!("{}/points/search", self.collection_path(collection));
        let res = self
            .request(Method::POST, &path)
            .json(&body)
            .send()
            .await
            .map_err(PipelineError::vector_store)?;
        let res = expect_success(res, Some(collection)).await?;

        let payload: Value = res.json().await.map_err(PipelineError::vector_store)?;
        let hits = payload["result"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(|item| SearchHit {
                        score: item["score"].as_f64().unwrap_or(0.0) as f32,
                        payload: payload_of(item),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(hits)
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: Option<&ScrollFilter>,
        limit: usize,
    ) -> Result<Vec<StoredPoint>, PipelineError> {
        let mut body = json!({
            "limit": limit,
            "with_payload": true,
            "with_vector": false,
        });
        if let (Some(filter), Some(obj)) = (filter, body.as_object_mut()) {
            obj.insert("filter".to_string(), filter.to_qdrant());
        }

        let path = format!("{}/points/scroll", self.collection_path(collection));
        let res = self
            .request(Method::POST, &path)
            .json(&body)
            .send()
            .await
            .map_err(PipelineError::vector_store)?;
        let res = expect_success(res, Some(collection)).await?;

        let payload: Value = res.json().await.map_err(PipelineError::vector_store)?;
        let points = payload["result"]["points"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(|item| StoredPoint {
                        id: id_to_string(item.get("id")),
                        payload: payload_of(item),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(points)
    }

    async fn retrieve(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<Vec<StoredPoint>, PipelineError> {
        let body = json!({ "ids": ids, "with_payload": true });

        let path = format!("{}/points", self.collection_path(collection));
        let res = self
            .request(Method::POST, &path)
            .json(&body)
            .send()
            .await
            .map_err(PipelineError::vector_store)?;
        let res = expect_success(res, Some(collection)).await?;

        let payload: Value = res.json().await.map_err(PipelineError::vector_store)?;
        let points = payload["result"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(|item| StoredPoint {
                        id: id_to_string(item.get("id")),
                        payload: payload_of(item),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(points)
    }

    async fn delete_points(&self, collection: &str, ids: &[String]) -> Result<(), PipelineError> {
        let path = format!("{}/points/delete?wait=true", self.collection_path(collection));
        let res = self
            .request(Method::POST, &path)
            .json(&json!({ "points": ids }))
            .send()
            .await
            .map_err(PipelineError::vector_store)?;
        expect_success(res, Some(collection)).await?;
        Ok(())
    }
}
