use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::paths::AppPaths;
use super::validation::validate_config;
use crate::core::errors::ApiError;

const MASK: &str = "****";

/// Key-name fragments that route a value into the secrets file.
const SECRET_KEY_PATTERNS: [&str; 12] = [
    "api_key",
    "secret",
    "password",
    "_token",
    "token_",
    "credential",
    "private_key",
    "access_key",
    "auth_",
    "_auth",
    "bearer",
    "client_secret",
];

/// Exact key names that match a pattern above but are ordinary settings.
const SECRET_KEY_EXCEPTIONS: [&str; 7] = [
    "max_tokens",
    "max_answer_tokens",
    "total_tokens",
    "input_tokens",
    "output_tokens",
    "token_count",
    "tokens",
];

/// Reads and writes the two-file configuration: a public `config.yml` and a
/// `secrets.yaml` holding every sensitive key. Callers always see the merged
/// view; writes split the document back into the two files.
#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    /// The config file reads come from: an explicit `TABULA_CONFIG_PATH`,
    /// the user's own copy, or the bundled one.
    pub fn config_path(&self) -> PathBuf {
        if let Ok(path) = env::var("TABULA_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        let user_copy = self.paths.user_data_dir.join("config.yml");
        if user_copy.exists() {
            user_copy
        } else {
            self.paths.project_root.join("config.yml")
        }
    }

    /// Writes always target the user's copy so the bundled file stays
    /// pristine.
    pub fn config_write_path(&self) -> PathBuf {
        match env::var("TABULA_CONFIG_PATH") {
            Ok(path) => PathBuf::from(path),
            Err(_) => self.paths.user_data_dir.join("config.yml"),
        }
    }

    pub fn secrets_path(&self) -> PathBuf {
        self.paths.secrets_path.clone()
    }

    pub fn load_config(&self) -> Result<Value, ApiError> {
        let public_part = read_yaml(&self.config_path());
        let secret_part = read_yaml(&self.secrets_path());
        Ok(merge(&public_part, &secret_part))
    }

    /// Applies a config update. Placeholder values (`****`) submitted by
    /// clients are swapped back for the stored secrets before validation,
    /// so a round-tripped redacted document never erases credentials.
    pub fn update_config(&self, config_data: Value, merge_update: bool) -> Result<(), ApiError> {
        let current = self.load_config()?;
        let incoming = apply_stored_secrets(&config_data, &current);
        let to_save = if merge_update {
            merge(&current, &incoming)
        } else {
            incoming
        };

        validate_config(&to_save)?;
        self.persist(&to_save)
    }

    pub fn redact_sensitive_values(&self, value: &Value) -> Value {
        mask_secrets(value)
    }

    fn persist(&self, config: &Value) -> Result<(), ApiError> {
        let (public_part, secret_part) = partition_secrets(config);
        write_yaml(&self.config_write_path(), &public_part)?;
        write_yaml(&self.secrets_path(), &secret_part)
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Missing, unreadable, or non-mapping files all read as an empty document.
fn read_yaml(path: &Path) -> Value {
    let Ok(text) = fs::read_to_string(path) else {
        return empty_object();
    };
    match serde_yaml::from_str::<Value>(&text) {
        Ok(value @ Value::Object(_)) => value,
        _ => empty_object(),
    }
}

fn write_yaml(path: &Path, value: &Value) -> Result<(), ApiError> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let text = serde_yaml::to_string(value).map_err(ApiError::internal)?;
    fs::write(path, text).map_err(ApiError::internal)
}

/// Recursive merge: objects combine key by key, anything else is replaced
/// by the overlay.
fn merge(base: &Value, overlay: &Value) -> Value {
    let (Value::Object(base_map), Value::Object(overlay_map)) = (base, overlay) else {
        return overlay.clone();
    };

    let mut out = base_map.clone();
    for (key, incoming) in overlay_map {
        let next = match out.get(key) {
            Some(current) => merge(current, incoming),
            None => incoming.clone(),
        };
        out.insert(key.clone(), next);
    }
    Value::Object(out)
}

/// Splits a merged document into (public, secret) halves, preserving the
/// nesting on both sides and dropping sections that end up empty.
fn partition_secrets(config: &Value) -> (Value, Value) {
    let Value::Object(map) = config else {
        return (config.clone(), empty_object());
    };

    let mut public_part = Map::new();
    let mut secret_part = Map::new();
    for (key, value) in map {
        if value.is_object() {
            let (public_sub, secret_sub) = partition_secrets(value);
            if has_entries(&public_sub) {
                public_part.insert(key.clone(), public_sub);
            }
            if has_entries(&secret_sub) {
                secret_part.insert(key.clone(), secret_sub);
            }
        } else if is_secret_key(key) && !value.is_null() {
            secret_part.insert(key.clone(), value.clone());
        } else {
            public_part.insert(key.clone(), value.clone());
        }
    }
    (Value::Object(public_part), Value::Object(secret_part))
}

fn has_entries(value: &Value) -> bool {
    value.as_object().is_some_and(|map| !map.is_empty())
}

fn mask_secrets(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, val)| {
                    let masked = if is_secret_key(key) && !val.is_null() {
                        Value::String(MASK.to_string())
                    } else {
                        mask_secrets(val)
                    };
                    (key.clone(), masked)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(mask_secrets).collect()),
        other => other.clone(),
    }
}

/// Replaces `****` placeholders in an update payload with the currently
/// stored value at the same position. A placeholder with no stored
/// counterpart is dropped rather than saved literally.
fn apply_stored_secrets(incoming: &Value, stored: &Value) -> Value {
    match incoming {
        Value::Object(map) => {
            let stored_map = stored.as_object();
            let mut out = Map::new();
            for (key, value) in map {
                let previous = stored_map.and_then(|m| m.get(key));
                if value.as_str() == Some(MASK) {
                    if let Some(previous) = previous {
                        out.insert(key.clone(), previous.clone());
                    }
                } else if value.is_object() || value.is_array() {
                    out.insert(
                        key.clone(),
                        apply_stored_secrets(value, previous.unwrap_or(&Value::Null)),
                    );
                } else {
                    out.insert(key.clone(), value.clone());
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            let stored_items = stored.as_array();
            Value::Array(
                items
                    .iter()
                    .enumerate()
                    .filter_map(|(position, item)| {
                        let previous = stored_items.and_then(|s| s.get(position));
                        if item.as_str() == Some(MASK) {
                            previous.cloned()
                        } else {
                            Some(apply_stored_secrets(item, previous.unwrap_or(&Value::Null)))
                        }
                    })
                    .collect(),
            )
        }
        other => other.clone(),
    }
}

fn is_secret_key(key: &str) -> bool {
    let lowered = key.to_lowercase();
    !SECRET_KEY_EXCEPTIONS.contains(&lowered.as_str())
        && SECRET_KEY_PATTERNS
            .iter()
            .any(|pattern| lowered.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service_in(dir: &Path) -> ConfigService {
        let paths = AppPaths {
            project_root: dir.to_path_buf(),
            user_data_dir: dir.to_path_buf(),
            log_dir: dir.join("logs"),
            uploads_dir: dir.join("uploads"),
            secrets_path: dir.join("secrets.yaml"),
        };
        ConfigService::new(Arc::new(paths))
    }

    #[test]
    fn merge_combines_objects_and_overrides_scalars() {
        let base = json!({
            "embedding": { "dimension": 3072 },
            "query": { "top_k": 5, "multi_collection_top_k": 3 },
            "tags": ["a", "b"]
        });
        let overlay = json!({
            "query": { "top_k": 10 },
            "tags": ["c"],
            "answers": { "on_chat_error": "apology" }
        });

        let merged = merge(&base, &overlay);

        assert_eq!(
            merged,
            json!({
                "embedding": { "dimension": 3072 },
                "query": { "top_k": 10, "multi_collection_top_k": 3 },
                "tags": ["c"],
                "answers": { "on_chat_error": "apology" }
            })
        );
    }

    #[test]
    fn partition_routes_credentials_into_secrets() {
        let input = json!({
            "azure_openai": {
                "endpoint": "https://example.openai.azure.com",
                "api_key": "azure-secret",
                "max_answer_tokens": 800
            },
            "vector_store": {
                "endpoint": "http://localhost:6333",
                "api_key": "qdrant-secret"
            }
        });

        let (public_part, secret_part) = partition_secrets(&input);

        assert_eq!(
            public_part,
            json!({
                "azure_openai": {
                    "endpoint": "https://example.openai.azure.com",
                    "max_answer_tokens": 800
                },
                "vector_store": {
                    "endpoint": "http://localhost:6333"
                }
            })
        );
        assert_eq!(
            secret_part,
            json!({
                "azure_openai": { "api_key": "azure-secret" },
                "vector_store": { "api_key": "qdrant-secret" }
            })
        );
    }

    #[test]
    fn masking_replaces_secrets_and_keeps_token_budgets() {
        let input = json!({
            "azure_openai": {
                "api_key": "azure-secret",
                "max_answer_tokens": 800
            }
        });

        let masked = mask_secrets(&input);

        assert_eq!(
            masked,
            json!({
                "azure_openai": {
                    "api_key": "****",
                    "max_answer_tokens": 800
                }
            })
        );
    }

    #[test]
    fn placeholders_are_swapped_back_for_stored_secrets() {
        let submitted = json!({
            "azure_openai": { "api_key": "****", "chat_deployment": "gpt-4o-mini" }
        });
        let stored = json!({
            "azure_openai": { "api_key": "azure-secret", "chat_deployment": "gpt-4o" }
        });

        let restored = apply_stored_secrets(&submitted, &stored);

        assert_eq!(
            restored,
            json!({
                "azure_openai": { "api_key": "azure-secret", "chat_deployment": "gpt-4o-mini" }
            })
        );
    }

    #[test]
    fn update_then_load_round_trips_through_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(dir.path());

        let config = json!({
            "vector_store": {
                "endpoint": "http://localhost:6333",
                "api_key": "qdrant-secret"
            }
        });
        service.update_config(config.clone(), false).unwrap();

        let public_text = fs::read_to_string(dir.path().join("config.yml")).unwrap();
        assert!(!public_text.contains("qdrant-secret"));
        let secrets_text = fs::read_to_string(dir.path().join("secrets.yaml")).unwrap();
        assert!(secrets_text.contains("qdrant-secret"));

        assert_eq!(service.load_config().unwrap(), config);
    }

    #[test]
    fn update_validates_before_writing_anything() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(dir.path());

        let bad = json!({ "embedding": { "dimension": 0 } });
        assert!(service.update_config(bad, false).is_err());
        assert!(!dir.path().join("config.yml").exists());
    }
}
