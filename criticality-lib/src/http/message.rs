use crate::Result;
use bytes::Bytes;
use ohno::{IntoAppError, app_err};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

/// An outbound request that can be sent any number of times.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl HttpRequest {
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Build a request carrying `body` encoded as JSON.
    pub fn json(method: Method, url: Url, body: &impl Serialize) -> Result<Self> {
        let encoded = serde_json::to_vec(body).into_app_err_with(|| format!("encoding request body for '{url}'"))?;

        let mut headers = HeaderMap::new();
        let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(Self {
            method,
            url,
            headers,
            body: Some(Bytes::from(encoded)),
        })
    }
}

/// A response whose body has been read in full.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,

    /// The URL of the request that produced this response.
    pub url: Url,
}

impl HttpResponse {
    #[must_use]
    pub fn new(status: StatusCode, url: Url) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            url,
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: &'static str, value: &'static str) -> Self {
        let _ = self.headers.insert(name, HeaderValue::from_static(value));
        self
    }

    /// Whether the status is in the success or redirect range (2xx/3xx).
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status.as_u16())
    }

    /// The value of a header, if present and valid ASCII.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    #[must_use]
    pub fn body_contains(&self, needle: &str) -> bool {
        let needle = needle.as_bytes();
        !needle.is_empty() && self.body.windows(needle.len()).any(|w| w == needle)
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).into_app_err_with(|| format!("decoding response from '{}'", self.url))
    }

    /// Turn a non-2xx response into an error that names the URL and status.
    pub fn error_for_status(self) -> Result<Self> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(app_err!("request to '{}' failed with status {}", self.url, self.status))
        }
    }
}
