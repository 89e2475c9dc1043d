//! Question suggestions: recommended questions over the uploaded files and
//! follow-ups for an answered question.
//!
//! Both paths ask the chat deployment for JSON and fall back to canned
//! suggestions when the model returns something unparseable or the call
//! fails, so the endpoints never surface a model error to the client.

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::core::errors::PipelineError;
use crate::llm::{ChatMessage, ChatRequest, LlmProvider};
use crate::vector::{is_system_collection, VectorIndex};

const RECOMMEND_SYSTEM_PROMPT: &str = "You are a helpful AI assistant that generates relevant questions for data analysis. Always respond with valid JSON in the format: [{\"question\": \"...\", \"context\": \"...\"}]";

const FOLLOWUP_SYSTEM_PROMPT: &str = "You are a helpful AI assistant that suggests relevant follow-up questions. Always respond with valid JSON as an array of strings: [\"question 1\", \"question 2\", \"question 3\"]";

/// Answers get truncated to this many characters before being quoted back
/// to the model for follow-up generation.
const FOLLOWUP_ANSWER_CHARS: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestedQuestion {
    pub question: String,
    pub context: String,
}

pub struct QuestionSuggester {
    provider: Arc<dyn LlmProvider>,
    index: Arc<dyn VectorIndex>,
}

impl QuestionSuggester {
    pub fn new(provider: Arc<dyn LlmProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Self { provider, index }
    }

    /// Suggests questions a user might ask about the files currently in the
    /// store. Filenames come from one sampled point per data collection;
    /// with no data collections the list is empty rather than an error.
    pub async fn recommended(
        &self,
        count: usize,
    ) -> Result<Vec<SuggestedQuestion>, PipelineError> {
        let collections: Vec<String> = self
            .index
            .list_collections()
            .await?
            .into_iter()
            .filter(|name| !is_system_collection(name))
            .collect();
        if collections.is_empty() {
            return Ok(Vec::new());
        }

        let mut filenames = Vec::new();
        for collection in &collections {
            if let Some(filename) = self.sample_filename(collection).await {
                filenames.push(filename);
            }
        }
        if filenames.is_empty() {
            return Ok(Vec::new());
        }

        Ok(self.generate_recommended(&filenames, count).await)
    }

    /// Suggests three follow-up questions for an answered question. Always
    /// returns something usable.
    pub async fn followups(&self, question: &str, answer: &str) -> Vec<String> {
        let truncated: String = answer.chars().take(FOLLOWUP_ANSWER_CHARS).collect();
        let prompt = format!(
            "Based on this question: \"{}\" and this answer: \"{}...\" (truncated), suggest 3 relevant follow-up questions the user might want to ask next. Format as a JSON array of strings.",
            question, truncated
        );
        let request = ChatRequest::new(vec![
            ChatMessage::system(FOLLOWUP_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ]);

        match self.provider.chat(request).await {
            Ok(reply) => {
                if let Some(suggestions) = extract_json_array(&reply)
                    .and_then(|array| serde_json::from_value::<Vec<String>>(array).ok())
                {
                    return suggestions;
                }
                vec![
                    "Can you explain more about this topic?".to_string(),
                    "How does this relate to the rest of my data?".to_string(),
                    "What actions should I take based on this information?".to_string(),
                ]
            }
            Err(err) => {
                warn!("Follow-up suggestion failed: {}", err);
                vec![
                    "Can you elaborate on that?".to_string(),
                    "What else can you tell me about this?".to_string(),
                    "How can I use this information?".to_string(),
                ]
            }
        }
    }

    async fn generate_recommended(
        &self,
        files: &[String],
        count: usize,
    ) -> Vec<SuggestedQuestion> {
        let prompt = format!(
            "Based on the following files: {}, generate {} relevant questions that a user might want to ask about this data. The questions should be diverse and cover different aspects of the data. Format your response as a JSON array of objects with 'question' and 'context' fields.",
            files.join(", "),
            count
        );
        let request = ChatRequest::new(vec![
            ChatMessage::system(RECOMMEND_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ]);

        match self.provider.chat(request).await {
            Ok(reply) => {
                if let Some(questions) = extract_json_array(&reply)
                    .and_then(|array| serde_json::from_value::<Vec<SuggestedQuestion>>(array).ok())
                {
                    return questions;
                }
                files
                    .iter()
                    .take(count)
                    .map(|file| SuggestedQuestion {
                        question: format!("What insights can I gain from the {}?", file),
                        context: format!("General analysis of {}", file),
                    })
                    .collect()
            }
            Err(err) => {
                warn!("Recommended question generation failed: {}", err);
                files
                    .iter()
                    .take(count)
                    .map(|file| SuggestedQuestion {
                        question: format!("What does the {} file contain?", file),
                        context: format!("Examining {}", file),
                    })
                    .collect()
            }
        }
    }

    async fn sample_filename(&self, collection: &str) -> Option<String> {
        match self.index.scroll(collection, None, 1).await {
            Ok(points) => points.into_iter().next().map(|point| {
                point
                    .payload
                    .metadata
                    .get("source")
                    .or_else(|| point.payload.metadata.get("filename"))
                    .cloned()
                    .unwrap_or_else(|| collection.to_string())
            }),
            Err(err) => {
                warn!("Could not sample collection '{}': {}", collection, err);
                None
            }
        }
    }
}

/// Pulls the first JSON array out of a model reply. Tries the whole reply
/// first, then falls back to the bracketed span so fenced or chatty replies
/// still parse.
fn extract_json_array(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        if value.is_array() {
            return Some(value);
        }
    }

    let pattern = Regex::new(r"(?s)\[.*\]").ok()?;
    let found = pattern.find(text)?;
    serde_json::from_str::<Value>(found.as_str())
        .ok()
        .filter(|value| value.is_array())
}
