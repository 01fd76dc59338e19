//! Request and response types

use crate::errors::HttpError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// HTTP methods supported by the request driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = HttpMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            "PATCH" => Ok(HttpMethod::Patch),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            _ => Err(HttpMethodError::InvalidMethod(s.to_string())),
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Options => reqwest::Method::OPTIONS,
        }
    }
}

/// Errors that can occur when parsing HTTP methods
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HttpMethodError {
    #[error("Invalid HTTP method: '{0}'. Supported methods are: GET, POST, PUT, DELETE, PATCH, HEAD, OPTIONS")]
    InvalidMethod(String),
}

/// Request payload
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(JsonValue),
    Text(String),
}

/// Description of one request a virtual user wants to make
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub method: HttpMethod,
    /// Absolute URL, or a path joined onto the driver's base URL
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<RequestBody>,
    /// Name used for the `{name:...}` tagged request metrics
    pub tag: Option<String>,
    /// Overrides the driver's default timeout
    pub timeout: Option<Duration>,
}

impl RequestSpec {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            tag: None,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post_json(url: impl Into<String>, body: JsonValue) -> Self {
        Self::new(HttpMethod::Post, url).json(body)
    }

    pub fn put_json(url: impl Into<String>, body: JsonValue) -> Self {
        Self::new(HttpMethod::Put, url).json(body)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, url)
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn json(mut self, body: JsonValue) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Text(body.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Outcome of one request, successful or not
#[derive(Debug, Clone)]
pub struct RequestResult {
    pub tag: Option<String>,
    pub method: HttpMethod,
    pub url: String,
    /// Response status, 0 when no response arrived
    pub status: u16,
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
    pub headers: HashMap<String, String>,
    pub body: String,
    /// No response, or the response took at least the timeout
    pub dropped: bool,
    pub(crate) error: Option<HttpError>,
}

impl RequestResult {
    pub(crate) fn failed(spec: &RequestSpec, url: String, error: HttpError, duration: Duration) -> Self {
        Self {
            tag: spec.tag.clone(),
            method: spec.method,
            url,
            status: 0,
            duration,
            timestamp: Utc::now(),
            headers: HashMap::new(),
            body: String::new(),
            dropped: error.is_dropped(),
            error: Some(error),
        }
    }

    /// A 2xx or 3xx response
    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..400).contains(&self.status)
    }

    /// Counts towards `http_req_failed`: status >= 400, network error or timeout
    pub fn is_failure(&self) -> bool {
        self.status >= 400 || self.status == 0
    }

    /// What went wrong, if anything. Statuses >= 400 are reported as
    /// [`HttpError::Status`].
    pub fn error(&self) -> Option<&HttpError> {
        self.error.as_ref()
    }

    /// Convert into a `Result` for `?` in scenario code
    pub fn error_for_status(self) -> Result<Self, HttpError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }

    /// Parse the response body as JSON
    pub fn json(&self) -> Result<JsonValue, HttpError> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Top-level field of a JSON object body
    pub fn json_field(&self, name: &str) -> Option<JsonValue> {
        match self.json() {
            Ok(JsonValue::Object(mut map)) => map.remove(name),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(status: u16, body: &str) -> RequestResult {
        RequestResult {
            tag: Some("login".to_string()),
            method: HttpMethod::Post,
            url: "http://localhost/login".to_string(),
            status,
            duration: Duration::from_millis(12),
            timestamp: Utc::now(),
            headers: HashMap::new(),
            body: body.to_string(),
            dropped: false,
            error: (status >= 400).then(|| HttpError::Status {
                status,
                url: "http://localhost/login".to_string(),
            }),
        }
    }

    #[test]
    fn test_http_method_from_str() {
        assert_eq!("GET".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("post".parse::<HttpMethod>().unwrap(), HttpMethod::Post);
        assert_eq!("Patch".parse::<HttpMethod>().unwrap(), HttpMethod::Patch);
        assert!("BREW".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn test_http_method_to_reqwest() {
        assert_eq!(reqwest::Method::from(HttpMethod::Get), reqwest::Method::GET);
        assert_eq!(reqwest::Method::from(HttpMethod::Delete), reqwest::Method::DELETE);
        assert_eq!(reqwest::Method::from(HttpMethod::Options), reqwest::Method::OPTIONS);
    }

    #[test]
    fn test_request_spec_builders() {
        let spec = RequestSpec::post_json("/api/login", json!({"user": "a"}))
            .tag("login")
            .header("X-Trace", "1")
            .timeout(Duration::from_secs(2));

        assert_eq!(spec.method, HttpMethod::Post);
        assert_eq!(spec.tag.as_deref(), Some("login"));
        assert_eq!(spec.headers["X-Trace"], "1");
        assert_eq!(spec.body, Some(RequestBody::Json(json!({"user": "a"}))));
        assert_eq!(spec.timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_json_field() {
        let ok = result(200, r#"{"token": "abc", "ttl": 60}"#);
        assert!(ok.is_success());
        assert_eq!(ok.json_field("token"), Some(json!("abc")));
        assert_eq!(ok.json_field("missing"), None);

        let text = result(200, "plain");
        assert!(text.json().is_err());
        assert_eq!(text.json_field("token"), None);
    }

    #[test]
    fn test_error_for_status() {
        assert!(result(201, "").error_for_status().is_ok());

        let failed = result(503, "");
        assert!(failed.is_failure());
        assert!(matches!(
            failed.error_for_status(),
            Err(HttpError::Status { status: 503, .. })
        ));
    }
}
