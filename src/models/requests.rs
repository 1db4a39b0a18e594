//! Request DTOs for the management API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

/// Longest key accepted over HTTP.
pub const MAX_KEY_LENGTH: usize = 256;

/// Request body for PUT /cache/:key
///
/// # Fields
/// - `value`: The value to cache; `null` caches a negative lookup
/// - `sequence`: Sequence of the source state the value was read at
#[derive(Debug, Clone, Deserialize)]
pub struct PutRequest {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub sequence: u64,
}

/// Checks a key taken from the request path.
///
/// Returns an error message if validation fails, None if valid.
pub fn validate_key(key: &str) -> Option<String> {
    if key.is_empty() {
        return Some("Key cannot be empty".to_string());
    }
    if key.len() > MAX_KEY_LENGTH {
        return Some(format!(
            "Key exceeds maximum length of {} characters",
            MAX_KEY_LENGTH
        ));
    }
    None
}
