use std::fs;
use std::path::PathBuf;

use axum::http::HeaderMap;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::core::errors::ApiError;

const TOKEN_ENV_VAR: &str = "TABULA_SESSION_TOKEN";

/// Header carrying the session token on authenticated routes.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Returns the session token every authenticated route requires.
///
/// Resolution order: `TABULA_SESSION_TOKEN` env var, then the persisted
/// token file, then a freshly generated token which is persisted for the
/// next start.
pub fn get_or_create_session_token() -> String {
    if let Ok(token) = std::env::var(TOKEN_ENV_VAR) {
        let token = token.trim();
        if !token.is_empty() {
            return token.to_string();
        }
    }

    let token_path = session_token_path();
    if let Some(parent) = token_path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    if let Ok(existing) = fs::read_to_string(&token_path) {
        let existing = existing.trim();
        if !existing.is_empty() {
            return existing.to_string();
        }
    }

    let token = Uuid::new_v4().to_string();
    match fs::write(&token_path, &token) {
        Ok(()) => restrict_to_owner(&token_path),
        Err(err) => {
            eprintln!(
                "Failed to persist session token to {}: {err}",
                token_path.display()
            );
        }
    }
    token
}

fn session_token_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."));
    home.join(".tabula").join(".session_token")
}

#[cfg(unix)]
fn restrict_to_owner(path: &PathBuf) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(err) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        eprintln!("Failed to restrict token file permissions: {err}");
    }
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &PathBuf) {}

/// Validates the `x-api-key` header against the expected session token.
pub fn require_api_key(headers: &HeaderMap, expected: &str) -> Result<(), ApiError> {
    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if token_matches(provided, expected) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

fn token_matches(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}
