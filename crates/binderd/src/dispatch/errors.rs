//! Error types for call parsing and reply encoding.
//!
//! Every parsing failure maps to the `bad-request` status so the client
//! receives a structured reply instead of a dropped connection.

use thiserror::Error;

use super::reply::status;

/// Errors surfaced while decoding a call line or encoding a reply.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Call line could not be parsed as valid JSON.
    #[error("malformed JSONL: {message}")]
    MalformedJsonl {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Call JSON does not carry the required members.
    #[error("invalid call structure: {message}")]
    InvalidStructure { message: String },

    /// Call line exceeds the maximum allowed size.
    #[error("call too large: {size} bytes exceeds {max_size} byte limit")]
    RequestTooLarge { size: usize, max_size: usize },

    /// Reply serialization failed.
    #[error("failed to serialize reply: {0}")]
    SerializeReply(#[from] serde_json::Error),
}

impl DispatchError {
    /// Failure status reported to the client.
    #[must_use]
    pub const fn status(&self) -> &'static str {
        match self {
            Self::MalformedJsonl { .. }
            | Self::InvalidStructure { .. }
            | Self::RequestTooLarge { .. } => status::BAD_REQUEST,
            Self::SerializeReply(_) => status::INTERNAL_ERROR,
        }
    }

    /// Creates a malformed JSONL error from a serde error.
    #[must_use]
    pub fn from_json_error(source: serde_json::Error) -> Self {
        Self::MalformedJsonl {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates a malformed JSONL error with a custom message.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedJsonl {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Creates a call too large error.
    #[must_use]
    pub const fn request_too_large(size: usize, max_size: usize) -> Self {
        Self::RequestTooLarge { size, max_size }
    }
}
