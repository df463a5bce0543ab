use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use reqwest::Method;
use serde::Serialize;

use crate::{
    config::insert_header,
    normalize::{normalize, normalize_buffer},
    request::{join_url, RequestBody, RequestDescriptor},
    retry::{self, RetryPolicy},
    transport::{AttemptOutcome, PreparedRequest, ReqwestTransport, Transport},
    ClientConfig, ConfigSnapshot, Failure, FormFields, NexRayError, Params, Reply,
    RequestOptions, Result,
};

const AUTHORIZATION: &str = "Authorization";

/// Configuration and headers shared by every clone of a client.
#[derive(Debug)]
struct Shared {
    config: ClientConfig,
    common_headers: BTreeMap<String, String>,
}

/// HTTP client for the NexRay REST API.
///
/// Clones share configuration and header state: a header set through one
/// clone applies to the next attempt made through any of them, including
/// retries of calls already in flight.
#[derive(Clone)]
pub struct NexRayClient {
    transport: Arc<dyn Transport>,
    shared: Arc<RwLock<Shared>>,
}

impl fmt::Debug for NexRayClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.read();
        let headers: BTreeMap<&str, &str> = shared
            .common_headers
            .iter()
            .map(|(name, value)| {
                if name.eq_ignore_ascii_case(AUTHORIZATION) {
                    (name.as_str(), "<redacted>")
                } else {
                    (name.as_str(), value.as_str())
                }
            })
            .collect();
        f.debug_struct("NexRayClient")
            .field("config", &shared.config)
            .field("common_headers", &headers)
            .finish()
    }
}

impl NexRayClient {
    /// Creates a client that talks HTTP through `reqwest`.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, ReqwestTransport::new())
    }

    /// Creates a client on top of a custom [`Transport`].
    pub fn with_transport(config: ClientConfig, transport: impl Transport + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
            shared: Arc::new(RwLock::new(Shared {
                config,
                common_headers: BTreeMap::new(),
            })),
        }
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `NEXRAY_CONFIG` — optional path of a JSON config file
    /// - `NEXRAY_BASE_URL` — base URL, required unless the config file sets it
    /// - `NEXRAY_TOKEN` — optional bearer token
    pub fn from_env() -> Result<Self> {
        Self::from_env_values(
            std::env::var("NEXRAY_CONFIG").ok(),
            std::env::var("NEXRAY_BASE_URL").ok(),
            std::env::var("NEXRAY_TOKEN").ok(),
        )
    }

    fn from_env_values(
        config_path: Option<String>,
        base_url: Option<String>,
        token: Option<String>,
    ) -> Result<Self> {
        let base_url = base_url.filter(|url| !url.trim().is_empty());

        let config = match config_path {
            Some(path) => {
                let mut config = ClientConfig::load(path)?;
                if let Some(base_url) = base_url {
                    config.base_url = base_url;
                }
                config
            }
            None => ClientConfig::new(base_url.ok_or_else(|| {
                NexRayError::Config("missing NEXRAY_BASE_URL environment variable".to_owned())
            })?),
        };

        let client = Self::new(config);
        if let Some(token) = token.filter(|token| !token.trim().is_empty()) {
            client.set_auth_token(&token);
        }
        Ok(client)
    }

    /// Sends a GET request with query parameters.
    pub async fn get<P, O>(&self, path: &str, params: P, options: O) -> Reply
    where
        P: Into<Params>,
        O: Into<RequestOptions>,
    {
        self.call_with_params(Method::GET, path, params.into(), options.into())
            .await
    }

    /// Sends a DELETE request with query parameters.
    pub async fn delete<P, O>(&self, path: &str, params: P, options: O) -> Reply
    where
        P: Into<Params>,
        O: Into<RequestOptions>,
    {
        self.call_with_params(Method::DELETE, path, params.into(), options.into())
            .await
    }

    /// Sends a POST request with a JSON body.
    pub async fn post<T, O>(&self, path: &str, data: &T, options: O) -> Reply
    where
        T: Serialize + ?Sized,
        O: Into<RequestOptions>,
    {
        self.call_with_json(Method::POST, path, data, options.into())
            .await
    }

    /// Sends a PUT request with a JSON body.
    pub async fn put<T, O>(&self, path: &str, data: &T, options: O) -> Reply
    where
        T: Serialize + ?Sized,
        O: Into<RequestOptions>,
    {
        self.call_with_json(Method::PUT, path, data, options.into())
            .await
    }

    /// Sends a PATCH request with a JSON body.
    pub async fn patch<T, O>(&self, path: &str, data: &T, options: O) -> Reply
    where
        T: Serialize + ?Sized,
        O: Into<RequestOptions>,
    {
        self.call_with_json(Method::PATCH, path, data, options.into())
            .await
    }

    /// Sends a POST request with a multipart form body.
    pub async fn post_form<O>(&self, path: &str, fields: FormFields, options: O) -> Reply
    where
        O: Into<RequestOptions>,
    {
        match RequestDescriptor::new(Method::POST, path) {
            Ok(descriptor) => {
                self.request(descriptor.form(fields).options(options.into()))
                    .await
            }
            Err(err) => self.invalid_request(err),
        }
    }

    /// Fetches a binary payload such as an image.
    ///
    /// Unlike the JSON methods, failures are returned as `Err`: the upstream
    /// error body when the server answered with status 500 or above,
    /// otherwise a [`Failure`].
    pub async fn get_buffer<P, O>(&self, path: &str, params: P, options: O) -> Result<Vec<u8>>
    where
        P: Into<Params>,
        O: Into<RequestOptions>,
    {
        let descriptor = RequestDescriptor::new(Method::GET, path)?
            .params(params.into())
            .options(options.into());
        let outcome = self.dispatch(&descriptor).await;
        normalize_buffer(outcome, &self.read().config.author)
    }

    /// Runs a prepared descriptor through the retry loop.
    ///
    /// Form bodies are checked first; a malformed form is reported without
    /// any attempt being made.
    pub async fn request(&self, descriptor: RequestDescriptor) -> Reply {
        if let Some(RequestBody::Form(fields)) = &descriptor.body {
            if let Err(err) = fields.validate() {
                return self.invalid_request(err);
            }
        }
        let outcome = self.dispatch(&descriptor).await;
        normalize(outcome, &self.read().config.author)
    }

    /// Sets `Authorization: Bearer <token>` on every following attempt.
    pub fn set_auth_token(&self, token: &str) {
        self.set_header(AUTHORIZATION, format!("Bearer {token}"));
    }

    /// Adds or replaces a header sent with every following attempt.
    pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) {
        insert_header(&mut self.write().common_headers, name.into(), value.into());
    }

    /// Stops sending a header previously added with [`Self::set_header`].
    pub fn remove_header(&self, name: &str) {
        self.write()
            .common_headers
            .retain(|existing, _| !existing.eq_ignore_ascii_case(name));
    }

    pub fn set_base_url(&self, base_url: impl Into<String>) {
        self.write().config.base_url = base_url.into();
    }

    /// Sets the per-attempt timeout used by following attempts.
    pub fn set_timeout(&self, timeout: Duration) {
        self.write().config.timeout = timeout;
    }

    /// Returns the effective configuration and the current common headers.
    pub fn config(&self) -> ConfigSnapshot {
        let shared = self.read();
        ConfigSnapshot {
            config: shared.config.clone(),
            current_headers: shared.common_headers.clone(),
        }
    }

    /// Returns the configured message for an HTTP status.
    pub fn error_message(&self, status: u16) -> String {
        self.read().config.error_message(status)
    }

    async fn call_with_params(
        &self,
        method: Method,
        path: &str,
        params: Params,
        options: RequestOptions,
    ) -> Reply {
        match RequestDescriptor::new(method, path) {
            Ok(descriptor) => self.request(descriptor.params(params).options(options)).await,
            Err(err) => self.invalid_request(err),
        }
    }

    async fn call_with_json<T>(
        &self,
        method: Method,
        path: &str,
        data: &T,
        options: RequestOptions,
    ) -> Reply
    where
        T: Serialize + ?Sized,
    {
        let body = match serde_json::to_value(data) {
            Ok(body) => body,
            Err(err) => {
                return self.invalid_request(NexRayError::InvalidRequest(format!(
                    "request body could not be serialized: {err}"
                )))
            }
        };
        match RequestDescriptor::new(method, path) {
            Ok(descriptor) => self.request(descriptor.json(body).options(options)).await,
            Err(err) => self.invalid_request(err),
        }
    }

    async fn dispatch(&self, descriptor: &RequestDescriptor) -> AttemptOutcome {
        let policy = RetryPolicy::from_config(&self.read().config);
        retry::dispatch(self.transport.as_ref(), &policy, || self.prepare(descriptor)).await
    }

    /// Resolves the descriptor against the current configuration and headers.
    fn prepare(&self, descriptor: &RequestDescriptor) -> PreparedRequest {
        let shared = self.read();
        let mut headers = shared.config.outgoing_default_headers();
        headers.extend(
            shared
                .common_headers
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );
        headers.extend(descriptor.options.headers.iter().cloned());

        PreparedRequest {
            method: descriptor.method.clone(),
            url: join_url(&shared.config.base_url, &descriptor.path),
            headers,
            params: descriptor.params.clone(),
            body: descriptor.body.clone(),
            timeout: descriptor.options.timeout.unwrap_or(shared.config.timeout),
        }
    }

    fn invalid_request(&self, err: NexRayError) -> Reply {
        #[cfg(feature = "tracing")]
        tracing::warn!(error = %err, "rejecting request before dispatch");

        Reply::Failure(Failure::new(self.read().config.author.clone(), err.to_string()))
    }

    fn read(&self) -> RwLockReadGuard<'_, Shared> {
        self.shared.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Shared> {
        self.shared.write().unwrap_or_else(PoisonError::into_inner)
    }
}
