//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding a record pack.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode a pack to CBOR.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode CBOR bytes.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// The CBOR was well formed but is not a valid record pack.
    #[error("invalid pack structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },

    /// A record carried a value of a type the pack format does not allow.
    #[error("unsupported value type for label {label}: {type_name}")]
    UnsupportedType {
        /// SenML label the value was found under.
        label: i64,
        /// Name of the unsupported CBOR type.
        type_name: String,
    },

    /// A record has neither a name nor a base name.
    #[error("record {index} has no name")]
    MissingName {
        /// Position of the record in the pack.
        index: usize,
    },

    /// Integer does not fit into an `i64`.
    #[error("integer overflow")]
    IntegerOverflow,
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Create an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Create an unsupported type error.
    pub fn unsupported_type(label: i64, type_name: impl Into<String>) -> Self {
        Self::UnsupportedType {
            label,
            type_name: type_name.into(),
        }
    }
}
