use reqwest::Method;
use serde_json::Value as JsonValue;

use crate::{FormFields, NexRayError, Params, RequestOptions, Result};

/// Strips a single leading `/` so `"/users"` and `"users"` resolve alike.
pub fn normalize_path(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

/// Joins a base URL and a normalized path.
pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    format!("{}/{path}", base_url.trim_end_matches('/'))
}

/// Payload carried by a request.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    Json(JsonValue),
    Form(FormFields),
}

/// One logical call: everything needed to build each physical attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Path relative to the base URL, without its leading separator.
    pub path: String,
    pub body: Option<RequestBody>,
    pub params: Params,
    pub options: RequestOptions,
}

impl RequestDescriptor {
    /// Builds a descriptor, normalizing and validating `path`.
    pub fn new(method: Method, path: &str) -> Result<Self> {
        let path = normalize_path(path);
        if path.is_empty() {
            return Err(NexRayError::InvalidRequest(format!(
                "{method} request requires a non-empty path"
            )));
        }
        Ok(Self {
            method,
            path: path.to_owned(),
            body: None,
            params: Params::default(),
            options: RequestOptions::default(),
        })
    }

    /// Attaches a JSON body. `null` means no body at all.
    pub fn json(mut self, body: JsonValue) -> Self {
        self.body = (!body.is_null()).then_some(RequestBody::Json(body));
        self
    }

    pub fn form(mut self, fields: FormFields) -> Self {
        self.body = Some(RequestBody::Form(fields));
        self
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Method;
    use serde_json::json;

    use super::{join_url, normalize_path, RequestBody, RequestDescriptor};

    #[test]
    fn leading_separator_is_stripped() {
        assert_eq!(normalize_path("/users"), "users");
        assert_eq!(normalize_path("users"), "users");
        assert_eq!(normalize_path("/v1/ai/gpt"), "v1/ai/gpt");
    }

    #[test]
    fn descriptors_with_and_without_separator_match() {
        let a = RequestDescriptor::new(Method::GET, "/users").expect("valid");
        let b = RequestDescriptor::new(Method::GET, "users").expect("valid");
        assert_eq!(a, b);
    }

    #[test]
    fn only_the_leading_separator_is_stripped() {
        let descriptor = RequestDescriptor::new(Method::GET, " users").expect("valid");
        assert_eq!(descriptor.path, " users");
        let descriptor = RequestDescriptor::new(Method::GET, "//users").expect("valid");
        assert_eq!(descriptor.path, "/users");
    }

    #[test]
    fn empty_path_is_rejected() {
        assert!(RequestDescriptor::new(Method::GET, "").is_err());
        assert!(RequestDescriptor::new(Method::DELETE, "/").is_err());
    }

    #[test]
    fn null_json_means_no_body() {
        let descriptor = RequestDescriptor::new(Method::POST, "x")
            .expect("valid")
            .json(json!(null));
        assert!(descriptor.body.is_none());

        let descriptor = RequestDescriptor::new(Method::POST, "x")
            .expect("valid")
            .json(json!({}));
        assert_eq!(descriptor.body, Some(RequestBody::Json(json!({}))));
    }

    #[test]
    fn join_url_handles_trailing_slash() {
        assert_eq!(join_url("https://api.test/", "users"), "https://api.test/users");
        assert_eq!(join_url("https://api.test", "users"), "https://api.test/users");
    }
}
