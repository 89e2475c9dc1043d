use serde_json::Value;

/// What to do when an ingest targets a collection that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingCollectionPolicy {
    /// Keep the collection and append the new points.
    Skip,
    /// Drop the collection and rebuild it from the new points.
    Recreate,
}

impl ExistingCollectionPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "skip" => Some(Self::Skip),
            "recreate" => Some(Self::Recreate),
            _ => None,
        }
    }
}

/// What the query endpoints return when the chat model fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatErrorPolicy {
    /// Return a fixed apology string with HTTP 200.
    Apology,
    /// Surface the failure as an upstream error response.
    Error,
}

impl ChatErrorPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "apology" => Some(Self::Apology),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl Default for ChatErrorPolicy {
    fn default() -> Self {
        Self::Apology
    }
}

#[derive(Debug, Clone)]
pub struct AzureOpenAiSettings {
    pub endpoint: String,
    pub api_key: String,
    pub embedding_deployment: String,
    pub embedding_api_version: String,
    pub chat_deployment: String,
    pub chat_api_version: String,
    pub max_answer_tokens: u32,
}

impl Default for AzureOpenAiSettings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            embedding_deployment: "text-embedding-3-large".to_string(),
            embedding_api_version: "2023-12-01-preview".to_string(),
            chat_deployment: "gpt-4o".to_string(),
            chat_api_version: "2024-05-01-preview".to_string(),
            max_answer_tokens: 800,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VectorStoreSettings {
    pub endpoint: String,
    pub api_key: String,
    pub on_existing: ExistingCollectionPolicy,
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:6333".to_string(),
            api_key: String::new(),
            on_existing: ExistingCollectionPolicy::Skip,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_chunk_chars: usize,
    pub allowed_extensions: Vec<String>,
    pub max_concurrent_jobs: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 150,
            max_chunk_chars: 4000,
            allowed_extensions: vec![
                "csv".to_string(),
                "xls".to_string(),
                "xlsx".to_string(),
                "xlsm".to_string(),
                "xlsb".to_string(),
                "xltx".to_string(),
                "xltm".to_string(),
                "xlt".to_string(),
            ],
            max_concurrent_jobs: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuerySettings {
    pub top_k: usize,
    pub multi_collection_top_k: usize,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            multi_collection_top_k: 3,
        }
    }
}

/// Typed snapshot of the merged config document.
///
/// Unknown or malformed fields fall back to their defaults; strict checking
/// happens in `validation` when a client writes the config back.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub azure: AzureOpenAiSettings,
    pub vector_store: VectorStoreSettings,
    pub embedding_dimension: usize,
    pub ingest: IngestSettings,
    pub query: QuerySettings,
    pub on_chat_error: ChatErrorPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            azure: AzureOpenAiSettings::default(),
            vector_store: VectorStoreSettings::default(),
            embedding_dimension: 3072,
            ingest: IngestSettings::default(),
            query: QuerySettings::default(),
            on_chat_error: ChatErrorPolicy::default(),
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &Value) -> Self {
        let mut settings = Self::default();

        if let Some(azure) = config.get("azure_openai") {
            read_string(azure, "endpoint", &mut settings.azure.endpoint);
            read_string(azure, "api_key", &mut settings.azure.api_key);
            read_string(
                azure,
                "embedding_deployment",
                &mut settings.azure.embedding_deployment,
            );
            read_string(
                azure,
                "embedding_api_version",
                &mut settings.azure.embedding_api_version,
            );
            read_string(azure, "chat_deployment", &mut settings.azure.chat_deployment);
            read_string(
                azure,
                "chat_api_version",
                &mut settings.azure.chat_api_version,
            );
            if let Some(tokens) = azure.get("max_answer_tokens").and_then(Value::as_u64) {
                settings.azure.max_answer_tokens = tokens as u32;
            }
        }

        if let Some(store) = config.get("vector_store") {
            read_string(store, "endpoint", &mut settings.vector_store.endpoint);
            read_string(store, "api_key", &mut settings.vector_store.api_key);
            if let Some(policy) = store
                .get("on_existing")
                .and_then(Value::as_str)
                .and_then(ExistingCollectionPolicy::parse)
            {
                settings.vector_store.on_existing = policy;
            }
        }

        if let Some(dimension) = config
            .get("embedding")
            .and_then(|v| v.get("dimension"))
            .and_then(Value::as_u64)
        {
            settings.embedding_dimension = dimension as usize;
        }

        if let Some(ingest) = config.get("ingest") {
            read_usize(ingest, "chunk_size", &mut settings.ingest.chunk_size);
            read_usize(ingest, "chunk_overlap", &mut settings.ingest.chunk_overlap);
            read_usize(
                ingest,
                "max_chunk_chars",
                &mut settings.ingest.max_chunk_chars,
            );
            read_usize(
                ingest,
                "max_concurrent_jobs",
                &mut settings.ingest.max_concurrent_jobs,
            );
            if let Some(extensions) = ingest.get("allowed_extensions").and_then(Value::as_array) {
                let parsed: Vec<String> = extensions
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|ext| ext.trim_start_matches('.').to_lowercase())
                    .filter(|ext| !ext.is_empty())
                    .collect();
                if !parsed.is_empty() {
                    settings.ingest.allowed_extensions = parsed;
                }
            }
        }

        if let Some(query) = config.get("query") {
            read_usize(query, "top_k", &mut settings.query.top_k);
            read_usize(
                query,
                "multi_collection_top_k",
                &mut settings.query.multi_collection_top_k,
            );
        }

        if let Some(policy) = config
            .get("answers")
            .and_then(|v| v.get("on_chat_error"))
            .and_then(Value::as_str)
            .and_then(ChatErrorPolicy::parse)
        {
            settings.on_chat_error = policy;
        }

        settings
    }
}

fn read_string(section: &Value, key: &str, target: &mut String) {
    if let Some(value) = section.get(key).and_then(Value::as_str) {
        *target = value.to_string();
    }
}

fn read_usize(section: &Value, key: &str, target: &mut usize) {
    if let Some(value) = section.get(key).and_then(Value::as_u64) {
        *target = value as usize;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_config_yields_defaults() {
        let settings = EngineSettings::from_config(&json!({}));
        assert_eq!(settings.embedding_dimension, 3072);
        assert_eq!(settings.ingest.chunk_size, 1000);
        assert_eq!(settings.ingest.chunk_overlap, 150);
        assert_eq!(settings.query.top_k, 5);
        assert_eq!(settings.on_chat_error, ChatErrorPolicy::Apology);
        assert_eq!(
            settings.vector_store.on_existing,
            ExistingCollectionPolicy::Skip
        );
    }

    #[test]
    fn configured_values_override_defaults() {
        let config = json!({
            "azure_openai": {
                "endpoint": "https://example.openai.azure.com/",
                "api_key": "key",
                "chat_deployment": "gpt-4o-mini",
                "max_answer_tokens": 400
            },
            "vector_store": { "endpoint": "http://qdrant:6333", "on_existing": "recreate" },
            "embedding": { "dimension": 1536 },
            "ingest": { "chunk_size": 500, "chunk_overlap": 50, "max_concurrent_jobs": 4 },
            "query": { "top_k": 8 },
            "answers": { "on_chat_error": "error" }
        });

        let settings = EngineSettings::from_config(&config);
        assert_eq!(settings.azure.chat_deployment, "gpt-4o-mini");
        assert_eq!(settings.azure.max_answer_tokens, 400);
        assert_eq!(
            settings.vector_store.on_existing,
            ExistingCollectionPolicy::Recreate
        );
        assert_eq!(settings.embedding_dimension, 1536);
        assert_eq!(settings.ingest.chunk_size, 500);
        assert_eq!(settings.ingest.max_concurrent_jobs, 4);
        assert_eq!(settings.query.top_k, 8);
        assert_eq!(settings.on_chat_error, ChatErrorPolicy::Error);
    }

    #[test]
    fn extensions_are_normalized_to_bare_lowercase() {
        let config = json!({
            "ingest": { "allowed_extensions": [".CSV", "Xlsx"] }
        });
        let settings = EngineSettings::from_config(&config);
        assert_eq!(settings.ingest.allowed_extensions, vec!["csv", "xlsx"]);
    }

    #[test]
    fn unknown_policy_strings_keep_defaults() {
        let config = json!({
            "vector_store": { "on_existing": "merge" },
            "answers": { "on_chat_error": "panic" }
        });
        let settings = EngineSettings::from_config(&config);
        assert_eq!(
            settings.vector_store.on_existing,
            ExistingCollectionPolicy::Skip
        );
        assert_eq!(settings.on_chat_error, ChatErrorPolicy::Apology);
    }
}
