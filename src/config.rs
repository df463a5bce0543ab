use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{NexRayError, Result};

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;
const DEFAULT_AUTHOR: &str = "NexRay";

/// Settings for a [`crate::NexRayClient`].
///
/// Field names on the wire follow the JSON config file layout
/// (`baseURL`, `maxRetries`, ...). Durations are expressed in milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Root URL every request path is resolved against.
    #[serde(rename = "baseURL")]
    pub base_url: String,
    /// Per-attempt timeout.
    #[serde(with = "millis", default = "default_timeout")]
    pub timeout: Duration,
    /// Headers sent with every request.
    #[serde(default = "default_headers")]
    pub default_headers: BTreeMap<String, String>,
    /// Maximum number of retries after the initial attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff delay, doubled after every retry.
    #[serde(with = "millis", default = "default_retry_delay")]
    pub retry_delay: Duration,
    /// HTTP statuses that trigger a retry.
    #[serde(default = "default_retry_status_codes")]
    pub retry_status_codes: BTreeSet<u16>,
    /// Human readable messages per HTTP status.
    #[serde(default = "default_error_messages")]
    pub error_messages: BTreeMap<u16, String>,
    /// Author tag embedded in normalized failures.
    #[serde(default = "default_author")]
    pub author: String,
}

impl ClientConfig {
    /// Creates a configuration with default policy for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: default_timeout(),
            default_headers: default_headers(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            retry_status_codes: default_retry_status_codes(),
            error_messages: default_error_messages(),
            author: default_author(),
        }
    }

    /// Parses a configuration from its JSON representation.
    ///
    /// Missing `defaultHeaders` entries fall back to the built-in defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut parsed: Self = serde_json::from_str(json)
            .map_err(|err| NexRayError::Config(format!("invalid config JSON: {err}")))?;
        let mut headers = default_headers();
        for (name, value) in std::mem::take(&mut parsed.default_headers) {
            insert_header(&mut headers, name, value);
        }
        parsed.default_headers = headers;
        Ok(parsed)
    }

    /// Reads and parses a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|err| {
            NexRayError::Config(format!("could not read {}: {err}", path.display()))
        })?;
        Self::from_json(&content)
    }

    /// Applies caller overrides on top of this configuration.
    ///
    /// Scalar fields are replaced; default headers are merged key by key with
    /// the override winning.
    pub fn merge(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(base_url) = overrides.base_url {
            self.base_url = base_url;
        }
        if let Some(timeout) = overrides.timeout {
            self.timeout = timeout;
        }
        if let Some(max_retries) = overrides.max_retries {
            self.max_retries = max_retries;
        }
        if let Some(retry_delay) = overrides.retry_delay {
            self.retry_delay = retry_delay;
        }
        if let Some(codes) = overrides.retry_status_codes {
            self.retry_status_codes = codes;
        }
        if let Some(messages) = overrides.error_messages {
            self.error_messages = messages;
        }
        if let Some(author) = overrides.author {
            self.author = author;
        }
        for (name, value) in overrides.default_headers {
            insert_header(&mut self.default_headers, name, value);
        }
        self
    }

    /// Returns the configured message for `status`, or `Error <status>`.
    pub fn error_message(&self, status: u16) -> String {
        self.error_messages
            .get(&status)
            .cloned()
            .unwrap_or_else(|| format!("Error {status}"))
    }

    /// Default headers with the runtime tag appended to `User-Agent`.
    pub(crate) fn outgoing_default_headers(&self) -> Vec<(String, String)> {
        self.default_headers
            .iter()
            .map(|(name, value)| {
                if name.eq_ignore_ascii_case("user-agent") {
                    (name.clone(), format!("{value} ({RUNTIME_TAG})"))
                } else {
                    (name.clone(), value.clone())
                }
            })
            .collect()
    }
}

/// Inserts a header, replacing any entry whose name differs only in case.
pub(crate) fn insert_header(headers: &mut BTreeMap<String, String>, name: String, value: String) {
    headers.retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
    headers.insert(name, value);
}

const RUNTIME_TAG: &str = concat!("Rust; nexray-http/", env!("CARGO_PKG_VERSION"));

/// Partial configuration merged over a base [`ClientConfig`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub default_headers: BTreeMap<String, String>,
    pub max_retries: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub retry_status_codes: Option<BTreeSet<u16>>,
    pub error_messages: Option<BTreeMap<u16, String>>,
    pub author: Option<String>,
}

/// Effective configuration plus the headers currently applied to every request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    #[serde(flatten)]
    pub config: ClientConfig,
    pub current_headers: BTreeMap<String, String>,
}

fn default_timeout() -> Duration {
    Duration::from_millis(DEFAULT_TIMEOUT_MS)
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay() -> Duration {
    Duration::from_millis(DEFAULT_RETRY_DELAY_MS)
}

fn default_retry_status_codes() -> BTreeSet<u16> {
    [408, 429, 500, 502, 503, 504].into_iter().collect()
}

fn default_author() -> String {
    DEFAULT_AUTHOR.to_owned()
}

fn default_headers() -> BTreeMap<String, String> {
    [
        ("Content-Type", "application/json".to_owned()),
        ("Accept", "application/json".to_owned()),
        (
            "User-Agent",
            concat!("nexray-http/", env!("CARGO_PKG_VERSION")).to_owned(),
        ),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_owned(), value))
    .collect()
}

fn default_error_messages() -> BTreeMap<u16, String> {
    [
        (400, "Bad Request"),
        (401, "Unauthorized"),
        (403, "Forbidden"),
        (404, "Not Found"),
        (429, "Too Many Requests"),
        (500, "Internal Server Error"),
        (502, "Bad Gateway"),
        (503, "Service Unavailable"),
        (504, "Gateway Timeout"),
    ]
    .into_iter()
    .map(|(status, message)| (status, message.to_owned()))
    .collect()
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
