//! Request/response types and error definitions for fetching.

use reqwest::Method;
use thiserror::Error;

/// Errors that can occur while fetching a document.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure reported by the HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The request could not be built (bad URL, header, ...).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No canned response is registered for the URL.
    #[error("No fixture for {0}")]
    NoFixture(String),

    /// The fetcher was told to fail this URL.
    #[error("Fetch failed: {0}")]
    Unavailable(String),
}

/// A fully described request, ready to hand to a fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl FetchRequest {
    /// Plain GET request for the URL.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            headers: Vec::new(),
            body: None,
        }
    }
}

/// Caller-facing request options.
///
/// When used through the router the URL is filled in with the routed URL, so
/// `url` may be left empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    pub url: Option<String>,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            url: None,
            method: Method::GET,
            headers: Vec::new(),
            body: None,
        }
    }
}

impl RequestOptions {
    /// Options for the given method with no URL, headers or body.
    pub fn method(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    /// Set the request URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Append a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the request body.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Build the request, using `fallback_url` when no URL was set.
    pub fn into_request(self, fallback_url: &str) -> FetchRequest {
        FetchRequest {
            url: self.url.unwrap_or_else(|| fallback_url.to_string()),
            method: self.method,
            headers: self.headers,
            body: self.body,
        }
    }
}

/// Result of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
    /// URL after redirects.
    pub final_url: String,
}
