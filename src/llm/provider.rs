use async_trait::async_trait;

use super::types::ChatRequest;
use crate::core::errors::PipelineError;

/// A hosted model provider exposing chat completion and text embedding.
///
/// The production implementation talks to Azure OpenAI deployments; tests
/// substitute scripted providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "azure_openai")
    fn name(&self) -> &str;

    /// check if the provider endpoint is reachable
    async fn health_check(&self) -> Result<bool, PipelineError>;

    /// chat completion (non-streaming), returns the assistant message text
    async fn chat(&self, request: ChatRequest) -> Result<String, PipelineError>;

    /// embed a batch of texts, one vector per input in input order
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, PipelineError>;
}
