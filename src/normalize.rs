use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::{
    transport::{AttemptOutcome, TransportError},
    NexRayError, Result,
};

pub const TIMEOUT_MESSAGE: &str = "Request timeout";
pub const NETWORK_MESSAGE: &str = "Network error - Cannot connect to server";
pub const BUFFER_MESSAGE: &str = "Failed to download buffer";

/// Shape reported when no HTTP response could be obtained.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Always `false`.
    pub status: bool,
    pub author: String,
    pub error: String,
}

impl Failure {
    pub fn new(author: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: false,
            author: author.into(),
            error: error.into(),
        }
    }

    /// Failure for a transport error, distinguishing timeouts.
    pub fn from_transport(author: impl Into<String>, err: &TransportError) -> Self {
        let message = if err.is_timeout() {
            TIMEOUT_MESSAGE
        } else {
            NETWORK_MESSAGE
        };
        Self::new(author, message)
    }

    pub fn into_json(self) -> JsonValue {
        json!({
            "status": self.status,
            "author": self.author,
            "error": self.error,
        })
    }
}

/// Caller-visible result of a JSON call.
///
/// [`Reply::into_json`] yields what the upstream API sent, or the
/// [`Failure`] object when nothing was received.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// Response below the 500 error threshold. The body is not interpreted,
    /// so it may still describe an application-level error.
    Success { status: u16, body: JsonValue },
    /// Response at or above 500, body passed through verbatim.
    Upstream { status: u16, body: JsonValue },
    /// No response was obtained.
    Failure(Failure),
}

impl Reply {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Success { status, .. } | Self::Upstream { status, .. } => Some(*status),
            Self::Failure(_) => None,
        }
    }

    pub fn body(&self) -> Option<&JsonValue> {
        match self {
            Self::Success { body, .. } | Self::Upstream { body, .. } => Some(body),
            Self::Failure(_) => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn into_json(self) -> JsonValue {
        match self {
            Self::Success { body, .. } | Self::Upstream { body, .. } => body,
            Self::Failure(failure) => failure.into_json(),
        }
    }

    /// Converts into a `Result`, treating upstream errors and failures as `Err`.
    pub fn into_result(self) -> Result<JsonValue> {
        match self {
            Self::Success { body, .. } => Ok(body),
            Self::Upstream { status, body } => Err(NexRayError::Upstream { status, body }),
            Self::Failure(failure) => Err(NexRayError::Failure(failure)),
        }
    }

    /// Deserializes a successful body into `T`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T> {
        let body = self.into_result()?;
        serde_json::from_value(body).map_err(|err| NexRayError::Decode(err.to_string()))
    }
}

/// Maps the terminal outcome of a JSON call to its [`Reply`].
pub(crate) fn normalize(outcome: AttemptOutcome, author: &str) -> Reply {
    match outcome {
        AttemptOutcome::Response(response) => Reply::Success {
            status: response.status,
            body: response.json(),
        },
        AttemptOutcome::ErrorResponse(response) => Reply::Upstream {
            status: response.status,
            body: response.json(),
        },
        AttemptOutcome::NoResponse(err) => Reply::Failure(Failure::from_transport(author, &err)),
    }
}

/// Maps the terminal outcome of a buffer call, propagating failures as `Err`.
pub(crate) fn normalize_buffer(outcome: AttemptOutcome, author: &str) -> Result<Vec<u8>> {
    match outcome {
        AttemptOutcome::Response(response) => Ok(response.body),
        AttemptOutcome::ErrorResponse(response) => Err(NexRayError::Upstream {
            status: response.status,
            body: response.json(),
        }),
        AttemptOutcome::NoResponse(_) => Err(NexRayError::Failure(Failure::new(
            author,
            BUFFER_MESSAGE,
        ))),
    }
}
