//! `nexray-http` is an async HTTP client for the NexRay REST API.
//!
//! Every call goes through a retry loop with exponential backoff and is
//! normalized to a stable shape:
//! - [`NexRayClient::get`], [`NexRayClient::post`], [`NexRayClient::put`],
//!   [`NexRayClient::patch`], [`NexRayClient::delete`] and
//!   [`NexRayClient::post_form`] always return a [`Reply`]
//! - [`NexRayClient::get_buffer`] returns the raw bytes or a [`NexRayError`]

mod client;
mod config;
mod error;
mod form;
mod normalize;
mod params;
mod request;
mod retry;
pub mod transport;

pub use client::NexRayClient;
pub use config::{ClientConfig, ConfigOverrides, ConfigSnapshot};
pub use error::NexRayError;
pub use form::{FormFields, FormValue};
pub use normalize::{Failure, Reply, BUFFER_MESSAGE, NETWORK_MESSAGE, TIMEOUT_MESSAGE};
pub use params::{Params, RequestOptions};
pub use request::{normalize_path, RequestBody, RequestDescriptor};
pub use retry::{AttemptState, RetryPolicy};
pub use reqwest::Method;

pub type Result<T> = std::result::Result<T, NexRayError>;
