//! Turns a question plus retrieved context into a model answer.

use std::sync::Arc;

use tracing::warn;

use super::prompt::build_user_prompt;
use super::retriever::RetrievedContext;
use crate::core::config::settings::{ChatErrorPolicy, EngineSettings};
use crate::core::errors::PipelineError;
use crate::llm::{ChatMessage, ChatRequest, LlmProvider};

/// Canned answer returned when the chat call fails and the error policy is
/// set to apologize instead of propagate.
pub const APOLOGY: &str = "I'm sorry, I encountered an error while processing your query.";

pub struct AnswerGenerator {
    provider: Arc<dyn LlmProvider>,
    max_tokens: u32,
    on_error: ChatErrorPolicy,
}

impl AnswerGenerator {
    pub fn new(settings: &EngineSettings, provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            max_tokens: settings.azure.max_answer_tokens,
            on_error: settings.on_chat_error,
        }
    }

    /// Asks the chat deployment for an answer. Temperature is pinned to zero
    /// so the same context and question yield stable answers.
    pub async fn answer(
        &self,
        query: &str,
        retrieved: &RetrievedContext,
    ) -> Result<String, PipelineError> {
        let prompt = build_user_prompt(&retrieved.context, query);
        let request = ChatRequest {
            temperature: Some(0.0),
            max_tokens: Some(self.max_tokens),
            ..ChatRequest::new(vec![ChatMessage::user(prompt)])
        };

        match self.provider.chat(request).await {
            Ok(answer) => Ok(answer),
            Err(err) => match self.on_error {
                ChatErrorPolicy::Apology => {
                    warn!("Chat completion failed, returning canned answer: {}", err);
                    Ok(APOLOGY.to_string())
                }
                ChatErrorPolicy::Error => Err(err),
            },
        }
    }
}
