use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::provider::LlmProvider;
use super::types::ChatRequest;
use crate::core::config::settings::AzureOpenAiSettings;
use crate::core::errors::PipelineError;

/// Client for Azure OpenAI deployments. The embedding and chat models are
/// separate deployments with their own api-version pins.
#[derive(Clone)]
pub struct AzureOpenAiClient {
    endpoint: String,
    api_key: String,
    embedding_deployment: String,
    embedding_api_version: String,
    chat_deployment: String,
    chat_api_version: String,
    client: Client,
}

impl AzureOpenAiClient {
    pub fn new(settings: &AzureOpenAiSettings) -> Self {
        Self {
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            embedding_deployment: settings.embedding_deployment.clone(),
            embedding_api_version: settings.embedding_api_version.clone(),
            chat_deployment: settings.chat_deployment.clone(),
            chat_api_version: settings.chat_api_version.clone(),
            client: Client::new(),
        }
    }

    fn deployment_url(&self, deployment: &str, operation: &str, api_version: &str) -> String {
        format!(
            "{}/openai/deployments/{}/{}?api-version={}",
            self.endpoint, deployment, operation, api_version
        )
    }
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl LlmProvider for AzureOpenAiClient {
    fn name(&self) -> &str {
        "azure_openai"
    }

    async fn health_check(&self) -> Result<bool, PipelineError> {
        if self.endpoint.is_empty() {
            return Ok(false);
        }
        // Any HTTP response means the endpoint resolves and accepts
        // connections; the data-plane key is not exercised here.
        Ok(self.client.get(&self.endpoint).send().await.is_ok())
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, PipelineError> {
        let url = self.deployment_url(
            &self.chat_deployment,
            "chat/completions",
            &self.chat_api_version,
        );

        let mut body = json!({ "messages": request.messages });
        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(m) = request.max_tokens {
                obj.insert("max_tokens".to_string(), json!(m));
            }
        }

        let res = self
            .client
            .post(&url)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| PipelineError::ChatService(err.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(PipelineError::ChatService(format!(
                "Azure chat error ({}): {}",
                status, text
            )));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|err| PipelineError::ChatService(err.to_string()))?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|content| content.to_string())
            .ok_or_else(|| {
                PipelineError::ChatService("Azure chat response had no message content".to_string())
            })
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.deployment_url(
            &self.embedding_deployment,
            "embeddings",
            &self.embedding_api_version,
        );

        let res = self
            .client
            .post(&url)
            .header("api-key", &self.api_key)
            .json(&json!({ "input": inputs }))
            .send()
            .await
            .map_err(|err| PipelineError::EmbeddingService(err.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(PipelineError::EmbeddingService(format!(
                "Azure embeddings error ({}): {}",
                status, text
            )));
        }

        let response: EmbeddingsResponse = res
            .json()
            .await
            .map_err(|err| PipelineError::EmbeddingService(err.to_string()))?;

        // The API is allowed to return items out of order; the index field
        // ties each vector back to its input position.
        let mut items = response.data;
        items.sort_by_key(|item| item.index);
        Ok(items.into_iter().map(|item| item.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ChatMessage;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings_for(server: &MockServer) -> AzureOpenAiSettings {
        AzureOpenAiSettings {
            endpoint: server.uri(),
            api_key: "test-key".to_string(),
            embedding_deployment: "embed-model".to_string(),
            embedding_api_version: "2023-12-01-preview".to_string(),
            chat_deployment: "chat-model".to_string(),
            chat_api_version: "2024-05-01-preview".to_string(),
            max_answer_tokens: 800,
        }
    }

    #[tokio::test]
    async fn embed_orders_vectors_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/embed-model/embeddings"))
            .and(query_param("api-version", "2023-12-01-preview"))
            .and(header("api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    { "index": 1, "embedding": [0.4, 0.5] },
                    { "index": 0, "embedding": [0.1, 0.2] }
                ]
            })))
            .mount(&server)
            .await;

        let client = AzureOpenAiClient::new(&settings_for(&server));
        let vectors = client
            .embed(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.4, 0.5]]);
    }

    #[tokio::test]
    async fn embed_surfaces_upstream_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/embed-model/embeddings"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let client = AzureOpenAiClient::new(&settings_for(&server));
        let err = client.embed(&["text".to_string()]).await.unwrap_err();

        match err {
            PipelineError::EmbeddingService(msg) => {
                assert!(msg.contains("429"));
                assert!(msg.contains("rate limited"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn embed_skips_the_request_for_empty_batches() {
        let server = MockServer::start().await;
        // No mock mounted: a request would fail loudly.
        let client = AzureOpenAiClient::new(&settings_for(&server));
        let vectors = client.embed(&[]).await.unwrap();
        assert!(vectors.is_empty());
    }

    #[tokio::test]
    async fn chat_returns_the_first_choice_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/chat-model/chat/completions"))
            .and(query_param("api-version", "2024-05-01-preview"))
            .and(header("api-key", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "temperature": 0.0,
                "max_tokens": 800
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [
                    { "message": { "role": "assistant", "content": "Revenue rose **12%**." } }
                ]
            })))
            .mount(&server)
            .await;

        let client = AzureOpenAiClient::new(&settings_for(&server));
        let mut request = ChatRequest::new(vec![ChatMessage::user("hello")]);
        request.temperature = Some(0.0);
        request.max_tokens = Some(800);

        let answer = client.chat(request).await.unwrap();
        assert_eq!(answer, "Revenue rose **12%**.");
    }

    #[tokio::test]
    async fn chat_without_content_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/chat-model/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": []
            })))
            .mount(&server)
            .await;

        let client = AzureOpenAiClient::new(&settings_for(&server));
        let request = ChatRequest::new(vec![ChatMessage::user("hello")]);
        let err = client.chat(request).await.unwrap_err();

        assert!(matches!(err, PipelineError::ChatService(_)));
    }
}
