pub mod azure;
pub mod embedding;
pub mod provider;
pub mod types;

pub use azure::AzureOpenAiClient;
pub use embedding::EmbeddingClient;
pub use provider::LlmProvider;
pub use types::{ChatMessage, ChatRequest};
