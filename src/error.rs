use serde_json::Value as JsonValue;

use crate::Failure;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum NexRayError {
    /// Upstream answered with an error status; `body` is its response, verbatim.
    #[error("upstream error {status}: {body}")]
    Upstream { status: u16, body: JsonValue },
    /// No HTTP response could be obtained (timeout, connection failure).
    #[error("request failed: {}", .0.error)]
    Failure(Failure),
    /// The request could not be built (empty path, unserializable body).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Configuration could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),
    /// A reply body could not be decoded into the requested type.
    #[error("decode error: {0}")]
    Decode(String),
}

impl NexRayError {
    /// Returns the JSON shape callers observe for this failure.
    ///
    /// Upstream errors yield the upstream body unchanged, transport failures
    /// yield the `{status: false, author, error}` object.
    pub fn into_json(self) -> JsonValue {
        match self {
            Self::Upstream { body, .. } => body,
            Self::Failure(failure) => failure.into_json(),
            other => JsonValue::String(other.to_string()),
        }
    }

    /// HTTP status of the upstream response, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}
