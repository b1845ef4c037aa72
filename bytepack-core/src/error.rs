//! Codec error types.

use thiserror::Error;

/// Errors raised while building converters or encoding/decoding values.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unexpected end of input: need {needed} more bytes")]
    UnexpectedEof { needed: usize },

    #[error(
        "unknown member {member} on type '{type_name}': its value has no known shape; \
         decode with the sender's type as the wire type (decode_as) or enable type names"
    )]
    UnknownMember { type_name: String, member: String },

    #[error("unknown type name '{0}'")]
    UnknownType(String),

    #[error("type mismatch: '{actual}' is not assignable to '{expected}'")]
    TypeMismatch { expected: String, actual: String },

    #[error("duplicate member index {index} on type '{type_name}' ('{first}' and '{second}')")]
    DuplicateIndex {
        type_name: String,
        index: u16,
        first: String,
        second: String,
    },

    #[error("duplicate member name '{name}' on type '{type_name}'")]
    DuplicateName { type_name: String, name: String },

    #[error("member index {index} on type '{type_name}' exceeds the maximum of {max}")]
    IndexOutOfRange {
        type_name: String,
        index: u32,
        max: u32,
    },

    #[error("invalid type '{type_name}': {reason}")]
    InvalidType { type_name: String, reason: String },

    #[error("unresolved type reference '{0}'")]
    UnresolvedType(String),

    #[error("value mismatch: expected {expected}, found {found}")]
    ValueMismatch { expected: String, found: String },

    #[error("cannot convert {from} to {to}: {reason}")]
    Conversion {
        from: String,
        to: String,
        reason: String,
    },

    #[error("invalid text in payload")]
    InvalidText,

    #[error("invalid null flag: {0:#x}")]
    InvalidNullFlag(u8),

    #[error("invalid length prefix: {0}")]
    InvalidLength(i64),

    #[error("char {0:?} cannot be encoded as a single UTF-16 unit")]
    InvalidChar(char),

    #[error("operation has not finished")]
    NotFinished,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// Returns whether the error means the input ended before the value did.
    pub fn is_end_of_input(&self) -> bool {
        matches!(self, CodecError::UnexpectedEof { .. })
    }

    /// Returns whether the error was raised while building a converter,
    /// independent of any particular value.
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            CodecError::DuplicateIndex { .. }
                | CodecError::DuplicateName { .. }
                | CodecError::InvalidType { .. }
                | CodecError::UnresolvedType(_)
        )
    }

    pub(crate) fn mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        CodecError::ValueMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub(crate) fn invalid_type(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        CodecError::InvalidType {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }
}
