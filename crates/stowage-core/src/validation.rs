//! Metadata validation
//!
//! Metadata attached to stored objects is a free-form JSON object, but a few
//! keys carry meaning for every consumer and must have the right shape:
//! - `filename`: display name used for downloads
//! - `content_type`: MIME type of the primary object

use anyhow::Result;
use serde_json::{Map, Value};

/// Metadata key holding the display filename
pub const FILENAME_KEY: &str = "filename";

/// Metadata key holding the MIME type
pub const CONTENT_TYPE_KEY: &str = "content_type";

/// Keys whose values must be JSON strings (or null) when present
const STRING_KEYS: &[&str] = &[FILENAME_KEY, CONTENT_TYPE_KEY];

/// Validate object metadata before it is persisted.
pub fn validate_metadata(metadata: &Map<String, Value>) -> Result<()> {
    for key in STRING_KEYS {
        match metadata.get(*key) {
            None | Some(Value::Null) | Some(Value::String(_)) => {}
            Some(other) => {
                return Err(anyhow::anyhow!(
                    "Metadata key '{}' must be a string, got {}",
                    key,
                    other
                ));
            }
        }
    }

    if metadata.keys().any(|k| k.is_empty()) {
        return Err(anyhow::anyhow!("Metadata key cannot be empty"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_validate_metadata_valid() {
        assert!(validate_metadata(&map(json!({}))).is_ok());
        assert!(validate_metadata(&map(json!({
            "filename": "get.txt",
            "content_type": "text/plain",
            "tags": ["a", "b"],
            "width": 30
        })))
        .is_ok());
        assert!(validate_metadata(&map(json!({"content_type": null}))).is_ok());
    }

    #[test]
    fn test_validate_metadata_rejects_non_string_filename() {
        let err = validate_metadata(&map(json!({"filename": 42}))).unwrap_err();
        assert!(err.to_string().contains("filename"));
    }

    #[test]
    fn test_validate_metadata_rejects_non_string_content_type() {
        assert!(validate_metadata(&map(json!({"content_type": {"x": 1}}))).is_err());
    }

    #[test]
    fn test_validate_metadata_rejects_empty_key() {
        assert!(validate_metadata(&map(json!({"": "x"}))).is_err());
    }
}
