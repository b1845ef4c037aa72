//! Schema error types.

use bytepack_core::CodecError;
use thiserror::Error;

/// Schema loading and JSON bridging errors.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("invalid definition for {name}: {reason}")]
    InvalidDefinition { name: String, reason: String },

    #[error("type {0} is defined more than once")]
    DuplicateDefinition(String),

    #[error("unsupported schema file extension: {0}")]
    UnsupportedFormat(String),

    #[error("at {path}: expected {expected}, found {found}")]
    Mismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("at {path}: type {type_name} has no member {field}")]
    UnknownField {
        path: String,
        type_name: String,
        field: String,
    },
}

impl SchemaError {
    pub(crate) fn mismatch(
        path: &str,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        SchemaError::Mismatch {
            path: path.to_owned(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub(crate) fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        SchemaError::InvalidDefinition {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
