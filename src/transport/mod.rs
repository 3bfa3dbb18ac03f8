//! HTTP request/response model and the transport seam.
//!
//! The bakery client never talks to the network directly: every request goes
//! through an injected [`Transport`]. This keeps the protocol engine testable
//! with recording fakes and lets applications plug in their own HTTP stack.
//!
//! # Architecture
//!
//! - [`Transport`] - Async trait issuing exactly one request per call
//! - [`HttpRequest`] / [`HttpResponse`] - Plain data passed across the seam
//! - [`ReqwestTransport`] - Default implementation backed by `reqwest`
//! - [`JarCookieSetter`] - Bridges a credential into the transport's cookie jar

mod reqwest_transport;

pub use reqwest_transport::{
    CONNECT_TIMEOUT_SECS, JarCookieSetter, READ_TIMEOUT_SECS, ReqwestTransport, TransportError,
};

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;

use crate::protocol::MACAROONS_HEADER;

/// Outgoing request headers, ordered by name.
pub type RequestHeaders = BTreeMap<String, HeaderValue>;

/// A header value in its native representation.
///
/// Most headers are text. `Bakery-Protocol-Version` is numeric for protocol
/// version 1, which transports that serialize headers as JSON must preserve.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HeaderValue {
    /// Native integer value.
    Number(u64),
    /// Text value.
    Text(String),
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(number) => write!(f, "{number}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<u64> for HeaderValue {
    fn from(value: u64) -> Self {
        Self::Number(value)
    }
}

/// A single HTTP request handed to a [`Transport`].
#[derive(Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Target URL.
    pub url: String,
    /// Lower-case HTTP method (`get`, `post`, ...).
    pub method: String,
    /// Request headers.
    pub headers: RequestHeaders,
    /// Request body, if any.
    pub body: Option<String>,
    /// Whether cross-origin credentials (cookies) may be sent.
    pub with_credentials: bool,
}

impl HttpRequest {
    /// Returns a header value by exact name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers.get(name)
    }
}

// Custom Debug impl that redacts the stored credential.
impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: BTreeMap<&str, String> = self
            .headers
            .iter()
            .map(|(name, value)| {
                let shown = if name == MACAROONS_HEADER {
                    "[REDACTED]".to_string()
                } else {
                    value.to_string()
                };
                (name.as_str(), shown)
            })
            .collect();
        f.debug_struct("HttpRequest")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("headers", &headers)
            .field("body", &self.body.as_ref().map(|body| body.len()))
            .field("with_credentials", &self.with_credentials)
            .finish()
    }
}

/// A transport response.
///
/// A status of `0` means no HTTP response was received (connection refused,
/// DNS failure, timeout); the bakery treats it as transient.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code, or `0` when no response arrived.
    pub status: u16,
    /// Value of the `Content-Type` response header, when present.
    pub content_type: Option<String>,
    /// Response body text.
    pub body: String,
}

impl HttpResponse {
    /// Creates a response with a status and body.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: None,
            body: body.into(),
        }
    }

    /// Creates the status-0 response used for transport failures.
    #[must_use]
    pub fn no_response() -> Self {
        Self::default()
    }

    /// Sets the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Returns `true` for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns `true` when no HTTP response was received.
    #[must_use]
    pub fn is_no_response(&self) -> bool {
        self.status == 0
    }
}

/// Issues HTTP requests on behalf of the bakery client.
///
/// Implementations must resolve exactly once per call. Failures to reach the
/// server are reported as [`HttpResponse::no_response`], never as a panic.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one request and returns its response.
    async fn send(&self, request: HttpRequest) -> HttpResponse;
}
