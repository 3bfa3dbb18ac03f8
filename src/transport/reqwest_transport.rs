//! Default [`Transport`] backed by `reqwest`.
//!
//! This module centralizes the client's networking defaults (timeouts,
//! user-agent, proxy compatibility) and the cross-origin credential rule: the
//! transport holds two clients, and only requests flagged `with_credentials`
//! go through the one that carries the cookie jar.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::cookie::Jar;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, ClientBuilder, Method, Proxy};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use super::{HttpRequest, HttpResponse, Transport};
use crate::platform::CookieSetter;
use crate::user_agent;

/// Default HTTP connect timeout (10 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default HTTP read timeout (30 seconds).
pub const READ_TIMEOUT_SECS: u64 = 30;

/// Errors constructing the reqwest transport or its cookie bridge.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The reqwest client builder rejected the configuration.
    #[error("HTTP client construction failed: {0}")]
    Build(#[source] reqwest::Error),

    /// Client construction panicked (system proxy lookup in sandboxed environments).
    #[error("HTTP client construction panicked while initializing networking")]
    BuildPanicked,

    /// The URL a bridged cookie is scoped to could not be parsed.
    #[error("invalid cookie URL: {0}")]
    InvalidCookieUrl(String),
}

/// [`Transport`] implementation over `reqwest`.
///
/// Create once and reuse; both inner clients pool connections.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    plain: Client,
    credentialed: Client,
    jar: Arc<Jar>,
}

impl ReqwestTransport {
    /// Creates a transport with default timeouts and an empty cookie jar.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when client construction fails.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a transport with explicit timeout values.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when client construction fails.
    pub fn with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, TransportError> {
        Self::with_cookie_jar(
            Arc::new(Jar::default()),
            connect_timeout_secs,
            read_timeout_secs,
        )
    }

    /// Creates a transport whose credentialed client uses `jar`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when client construction fails.
    #[instrument(level = "debug", skip(jar))]
    pub fn with_cookie_jar(
        jar: Arc<Jar>,
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, TransportError> {
        let timeouts = Timeouts {
            connect: Duration::from_secs(connect_timeout_secs),
            read: Duration::from_secs(read_timeout_secs),
        };
        let plain = build_client(timeouts, None)?;
        let credentialed = build_client(timeouts, Some(Arc::clone(&jar)))?;
        Ok(Self {
            plain,
            credentialed,
            jar,
        })
    }

    /// Returns the cookie jar used for credentialed requests.
    #[must_use]
    pub fn cookie_jar(&self) -> Arc<Jar> {
        Arc::clone(&self.jar)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(skip(self, request), fields(url = %request.url, method = %request.method))]
    async fn send(&self, request: HttpRequest) -> HttpResponse {
        let Ok(method) = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes()) else {
            warn!("invalid HTTP method; no request sent");
            return HttpResponse::no_response();
        };

        let client = if request.with_credentials {
            &self.credentialed
        } else {
            &self.plain
        };

        let mut builder = client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.to_string());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(error) => {
                warn!(error = %error, "request failed without a response");
                return HttpResponse::no_response();
            }
        };

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = match response.text().await {
            Ok(body) => body,
            Err(error) => {
                warn!(status, error = %error, "failed to read response body");
                String::new()
            }
        };
        debug!(status, bytes = body.len(), "response received");

        HttpResponse {
            status,
            content_type,
            body,
        }
    }
}

/// [`CookieSetter`] that writes the bridged credential into a cookie jar.
///
/// The cookie value is the base64 of the credential's JSON, scoped to `url`.
#[derive(Debug, Clone)]
pub struct JarCookieSetter {
    jar: Arc<Jar>,
    url: Url,
    cookie_name: String,
}

impl JarCookieSetter {
    /// Creates a setter writing `cookie_name` for `url` into `jar`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidCookieUrl`] when `url` does not parse.
    pub fn new(
        jar: Arc<Jar>,
        url: &str,
        cookie_name: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let url = Url::parse(url).map_err(|_| TransportError::InvalidCookieUrl(url.to_string()))?;
        Ok(Self {
            jar,
            url,
            cookie_name: cookie_name.into(),
        })
    }
}

impl CookieSetter for JarCookieSetter {
    fn set_cookie(&self, macaroons: &Value) -> Result<(), String> {
        let json = serde_json::to_string(macaroons).map_err(|error| error.to_string())?;
        let cookie = format!("{}={}; Path=/", self.cookie_name, STANDARD.encode(json));
        self.jar.add_cookie_str(&cookie, &self.url);
        debug!(cookie = %self.cookie_name, url = %self.url, "bridged credential into cookie jar");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Timeouts {
    connect: Duration,
    read: Duration,
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

fn build_client(timeouts: Timeouts, cookie_jar: Option<Arc<Jar>>) -> Result<Client, TransportError> {
    match try_build_client(timeouts, cookie_jar.clone(), false) {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            // Some restricted CI/sandbox environments panic when querying
            // system proxy settings. Retry with env proxies only.
            warn!("HTTP client hit system proxy panic; using env-proxy fallback builder");
            match try_build_client(timeouts, cookie_jar, true) {
                Ok(client) => Ok(client),
                Err(BuildClientFailure::Panic) => Err(TransportError::BuildPanicked),
                Err(BuildClientFailure::Build(error)) => Err(TransportError::Build(error)),
            }
        }
        Err(BuildClientFailure::Build(error)) => Err(TransportError::Build(error)),
    }
}

fn try_build_client(
    timeouts: Timeouts,
    cookie_jar: Option<Arc<Jar>>,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    catch_unwind(AssertUnwindSafe(move || {
        let mut builder = base_builder(timeouts, cookie_jar);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn base_builder(timeouts: Timeouts, cookie_jar: Option<Arc<Jar>>) -> ClientBuilder {
    let mut builder = Client::builder()
        .connect_timeout(timeouts.connect)
        .timeout(timeouts.read)
        .user_agent(user_agent::default_user_agent());

    if let Some(jar) = cookie_jar {
        builder = builder.cookie_provider(jar);
    }

    builder
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy_for_scheme("https")
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = env_proxy_for_scheme("http")
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn env_proxy_for_scheme(scheme: &str) -> Option<String> {
    match scheme {
        "https" => find_first_proxy_var(&["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"]),
        "http" => find_first_proxy_var(&["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]),
        _ => None,
    }
}

fn find_first_proxy_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use reqwest::cookie::CookieStore;

    use super::*;

    #[test]
    fn test_jar_cookie_setter_writes_encoded_cookie() {
        let jar = Arc::new(Jar::default());
        let setter =
            JarCookieSetter::new(Arc::clone(&jar), "http://example.com/", "macaroon-store").unwrap();

        setter.set_cookie(&Value::from("macaroon")).unwrap();

        let url = Url::parse("http://example.com/anything").unwrap();
        let cookies = jar.cookies(&url).unwrap();
        let expected = format!("macaroon-store={}", STANDARD.encode("\"macaroon\""));
        assert_eq!(cookies.to_str().unwrap(), expected);
    }

    #[test]
    fn test_jar_cookie_setter_rejects_bad_url() {
        let result = JarCookieSetter::new(Arc::new(Jar::default()), "not a url", "name");
        assert!(matches!(result, Err(TransportError::InvalidCookieUrl(_))));
    }

    #[test]
    fn test_find_first_proxy_var_ignores_missing() {
        assert_eq!(find_first_proxy_var(&["BAKERY_TEST_PROXY_VAR_THAT_IS_UNSET"]), None);
    }
}
