use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value as JsonValue;

use crate::{request::RequestBody, Params};

/// A fully resolved physical attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    /// Headers in precedence order; a later entry wins over an earlier one
    /// with the same (case-insensitive) name.
    pub headers: Vec<(String, String)>,
    pub params: Params,
    pub body: Option<RequestBody>,
    pub timeout: Duration,
}

impl PreparedRequest {
    /// Returns the effective value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Raw response of one attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Interprets the body as JSON.
    ///
    /// Empty bodies become `null`; bodies that are not valid JSON are returned
    /// as a JSON string.
    pub fn json(&self) -> JsonValue {
        if self.body.is_empty() {
            return JsonValue::Null;
        }
        serde_json::from_slice(&self.body)
            .unwrap_or_else(|_| JsonValue::String(String::from_utf8_lossy(&self.body).into_owned()))
    }
}

/// Classification of a failure where no HTTP response was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Other,
}

/// Failure of an attempt before any HTTP response was received.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == TransportErrorKind::Timeout
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Other => "transport",
        })
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, err.to_string())
    }
}

/// Performs physical HTTP exchanges.
///
/// Implementations return every received response as `Ok`, whatever its
/// status; the error threshold is applied by the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: PreparedRequest) -> Result<HttpResponse, TransportError>;
}

/// [`Transport`] backed by `reqwest`.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a preconfigured `reqwest` client (proxies, TLS roots, pooling).
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: PreparedRequest) -> Result<HttpResponse, TransportError> {
        let mut headers = encode_headers(&request.headers);
        let mut builder = self
            .http
            .request(request.method, &request.url)
            .timeout(request.timeout);

        if !request.params.is_empty() {
            builder = builder.query(request.params.as_slice());
        }

        builder = match request.body {
            Some(RequestBody::Json(body)) => builder.headers(headers).json(&body),
            Some(RequestBody::Form(fields)) => {
                // The encoder supplies `multipart/form-data; boundary=...`.
                headers.remove(CONTENT_TYPE);
                builder.headers(headers).multipart(fields.to_multipart()?)
            }
            None => builder.headers(headers),
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

fn encode_headers(pairs: &[(String, String)]) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => {
                #[cfg(feature = "tracing")]
                tracing::warn!(header = %name, "skipping header that cannot be encoded");
            }
        }
    }
    headers
}

/// Result of one attempt once the `< 500` success threshold is applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Response with a status below 500.
    Response(HttpResponse),
    /// Response with a status of 500 or above.
    ErrorResponse(HttpResponse),
    /// No response was obtained.
    NoResponse(TransportError),
}

impl AttemptOutcome {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Response(response) | Self::ErrorResponse(response) => Some(response.status),
            Self::NoResponse(_) => None,
        }
    }
}

/// Sends one attempt and classifies the result.
pub(crate) async fn execute(transport: &dyn Transport, request: PreparedRequest) -> AttemptOutcome {
    match transport.send(request).await {
        Ok(response) if response.status < 500 => AttemptOutcome::Response(response),
        Ok(response) => AttemptOutcome::ErrorResponse(response),
        Err(err) => AttemptOutcome::NoResponse(err),
    }
}
