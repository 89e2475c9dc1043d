use serde_json::{Map, Value};

use crate::core::errors::ApiError;

/// Checks a merged config document before it is persisted. Every section is
/// optional; fields that are present must have the right type and range.
pub fn validate_config(config: &Value) -> Result<(), ApiError> {
    let root = config
        .as_object()
        .ok_or_else(|| bad_type("root", "object"))?;

    if let Some(server) = Section::of(root, "server")? {
        server.text("host")?;
        server.text_list("cors_allowed_origins")?;
        server.text_list("allowed_origins")?;
    }

    if let Some(azure) = Section::of(root, "azure_openai")? {
        azure.text("endpoint")?;
        azure.text("api_key")?;
        azure.text("embedding_deployment")?;
        azure.text("embedding_api_version")?;
        azure.text("chat_deployment")?;
        azure.text("chat_api_version")?;
        azure.unsigned("max_answer_tokens", 1, 32_768)?;
    }

    if let Some(store) = Section::of(root, "vector_store")? {
        store.text("endpoint")?;
        store.text("api_key")?;
        store.one_of("on_existing", &["skip", "recreate"])?;
    }

    if let Some(embedding) = Section::of(root, "embedding")? {
        embedding.unsigned("dimension", 1, 100_000)?;
    }

    if let Some(ingest) = Section::of(root, "ingest")? {
        ingest.unsigned("chunk_size", 1, 1_000_000)?;
        ingest.unsigned("chunk_overlap", 0, 1_000_000)?;
        ingest.unsigned("max_chunk_chars", 1, 10_000_000)?;
        ingest.text_list("allowed_extensions")?;
        ingest.unsigned("max_concurrent_jobs", 1, 64)?;

        let size = ingest.u64_value("chunk_size");
        let overlap = ingest.u64_value("chunk_overlap");
        if let (Some(size), Some(overlap)) = (size, overlap) {
            if overlap >= size {
                return Err(ApiError::BadRequest(
                    "Invalid config at 'ingest.chunk_overlap': must be smaller than ingest.chunk_size"
                        .to_string(),
                ));
            }
        }
    }

    if let Some(query) = Section::of(root, "query")? {
        query.unsigned("top_k", 1, 100)?;
        query.unsigned("multi_collection_top_k", 1, 100)?;
    }

    if let Some(answers) = Section::of(root, "answers")? {
        answers.one_of("on_chat_error", &["apology", "error"])?;
    }

    Ok(())
}

/// A named top-level mapping plus the dotted path used in error messages.
struct Section<'a> {
    name: &'a str,
    fields: &'a Map<String, Value>,
}

impl<'a> Section<'a> {
    fn of(root: &'a Map<String, Value>, name: &'a str) -> Result<Option<Self>, ApiError> {
        match root.get(name) {
            None => Ok(None),
            Some(Value::Object(fields)) => Ok(Some(Section { name, fields })),
            Some(_) => Err(bad_type(name, "object")),
        }
    }

    fn path(&self, key: &str) -> String {
        format!("{}.{}", self.name, key)
    }

    fn u64_value(&self, key: &str) -> Option<u64> {
        self.fields.get(key).and_then(Value::as_u64)
    }

    fn text(&self, key: &str) -> Result<(), ApiError> {
        match self.fields.get(key) {
            None => Ok(()),
            Some(value) if value.is_string() => Ok(()),
            Some(_) => Err(bad_type(&self.path(key), "string")),
        }
    }

    fn unsigned(&self, key: &str, min: u64, max: u64) -> Result<(), ApiError> {
        let Some(value) = self.fields.get(key) else {
            return Ok(());
        };
        match value.as_u64() {
            Some(number) if (min..=max).contains(&number) => Ok(()),
            Some(_) => Err(ApiError::BadRequest(format!(
                "Invalid config at '{}': must be between {} and {}",
                self.path(key),
                min,
                max
            ))),
            None => Err(bad_type(&self.path(key), "integer")),
        }
    }

    fn text_list(&self, key: &str) -> Result<(), ApiError> {
        let Some(value) = self.fields.get(key) else {
            return Ok(());
        };
        let items = value
            .as_array()
            .ok_or_else(|| bad_type(&self.path(key), "array of strings"))?;
        for (index, item) in items.iter().enumerate() {
            let entry_path = format!("{}[{}]", self.path(key), index);
            match item.as_str() {
                None => return Err(bad_type(&entry_path, "string")),
                Some(text) if text.trim().is_empty() => {
                    return Err(ApiError::BadRequest(format!(
                        "Invalid config at '{}': value cannot be empty",
                        entry_path
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn one_of(&self, key: &str, allowed: &[&str]) -> Result<(), ApiError> {
        let Some(value) = self.fields.get(key) else {
            return Ok(());
        };
        let text = value
            .as_str()
            .ok_or_else(|| bad_type(&self.path(key), "string"))?;
        if allowed.contains(&text) {
            Ok(())
        } else {
            Err(ApiError::BadRequest(format!(
                "Invalid config at '{}': expected one of [{}]",
                self.path(key),
                allowed.join(", ")
            )))
        }
    }
}

fn bad_type(path: &str, expected: &str) -> ApiError {
    ApiError::BadRequest(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}
