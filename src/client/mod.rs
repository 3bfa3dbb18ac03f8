//! The bakery HTTP client.
//!
//! [`BakeryClient`] sends requests through a [`Transport`], attaching the
//! protocol version header and any stored credential, and intercepts the two
//! remediable authorization failures:
//!
//! - `macaroon discharge required`: the macaroon in the error is discharged
//!   through the [`MacaroonLibrary`], the result is stored under the
//!   request's service key, and the request is replayed.
//! - `interaction required`: the visit/wait handshake runs, then the request
//!   is replayed.
//!
//! Every other response reaches the caller unchanged.

mod discharge;
mod error;
mod interact;

pub use error::{BakeryError, DISCHARGE_DISABLED_MESSAGE, UNPARSEABLE_MACAROON_MESSAGE};
pub use interact::{MAX_WAIT_ATTEMPTS, RetryState};

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures_util::future::BoxFuture;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::macaroon::MacaroonLibrary;
use crate::platform::{BrowserVisitPage, VisitPage};
use crate::protocol::{
    AuthOutcome, BAKERY_PROTOCOL_HEADER, MACAROONS_HEADER, ProtocolVersion, SET_AUTH_COOKIE_PATH,
    classify,
};
use crate::storage::{CredentialStore, StoreError};
use crate::transport::{HeaderValue, HttpRequest, HttpResponse, RequestHeaders, Transport};

/// Default cap on discharge/interaction rounds for one request.
pub const DEFAULT_MAX_REMEDIATIONS: u32 = 8;

const DEFAULT_WAIT_METHOD: &str = "get";

type DischargeHook = Arc<dyn Fn(&str) + Send + Sync>;

/// A request as the caller issued it, replayed verbatim after remediation.
#[derive(Debug, Clone)]
struct PendingRequest {
    url: String,
    method: String,
    headers: RequestHeaders,
    body: Option<String>,
}

/// HTTP client that transparently satisfies macaroon discharge and
/// interaction demands.
///
/// Cloning is cheap; clones share the transport, store and adapters.
#[derive(Clone)]
pub struct BakeryClient {
    transport: Arc<dyn Transport>,
    storage: CredentialStore,
    macaroons: Option<Arc<dyn MacaroonLibrary>>,
    visit_page: Arc<dyn VisitPage>,
    protocol_version: ProtocolVersion,
    discharge_enabled: bool,
    wait_method: String,
    max_remediations: u32,
    on_discharge: Option<DischargeHook>,
}

/// Builder for [`BakeryClient`].
pub struct BakeryClientBuilder {
    transport: Arc<dyn Transport>,
    storage: CredentialStore,
    macaroons: Option<Arc<dyn MacaroonLibrary>>,
    visit_page: Arc<dyn VisitPage>,
    protocol_version: ProtocolVersion,
    discharge_enabled: bool,
    wait_method: String,
    max_remediations: u32,
    on_discharge: Option<DischargeHook>,
}

impl BakeryClientBuilder {
    /// Sets the macaroon library used to import and discharge macaroons.
    ///
    /// Without one, discharge demands fail with [`BakeryError::NoMacaroonLibrary`].
    #[must_use]
    pub fn macaroon_library(mut self, library: Arc<dyn MacaroonLibrary>) -> Self {
        self.macaroons = Some(library);
        self
    }

    /// Sets how the interaction page is shown. Defaults to [`BrowserVisitPage`].
    #[must_use]
    pub fn visit_page(mut self, visit_page: Arc<dyn VisitPage>) -> Self {
        self.visit_page = visit_page;
        self
    }

    /// Sets the advertised protocol version. Defaults to [`ProtocolVersion::LATEST`].
    #[must_use]
    pub fn protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = version;
        self
    }

    /// Surfaces discharge demands as [`BakeryError::DischargeDisabled`]
    /// instead of resolving them.
    #[must_use]
    pub fn without_discharge(mut self) -> Self {
        self.discharge_enabled = false;
        self
    }

    /// Sets the HTTP method of wait requests. Defaults to `get`.
    #[must_use]
    pub fn wait_method(mut self, method: impl Into<String>) -> Self {
        self.wait_method = method.into().to_ascii_lowercase();
        self
    }

    /// Caps discharge/interaction rounds per request.
    #[must_use]
    pub fn max_remediations(mut self, limit: u32) -> Self {
        self.max_remediations = limit;
        self
    }

    /// Registers a hook called with the request URL after each successful
    /// discharge, before the request is replayed.
    #[must_use]
    pub fn on_discharge(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_discharge = Some(Arc::new(hook));
        self
    }

    /// Builds the client.
    #[must_use]
    pub fn build(self) -> BakeryClient {
        BakeryClient {
            transport: self.transport,
            storage: self.storage,
            macaroons: self.macaroons,
            visit_page: self.visit_page,
            protocol_version: self.protocol_version,
            discharge_enabled: self.discharge_enabled,
            wait_method: self.wait_method,
            max_remediations: self.max_remediations,
            on_discharge: self.on_discharge,
        }
    }
}

impl BakeryClient {
    /// Starts building a client over `transport` and `storage`.
    #[must_use]
    pub fn builder(transport: Arc<dyn Transport>, storage: CredentialStore) -> BakeryClientBuilder {
        BakeryClientBuilder {
            transport,
            storage,
            macaroons: None,
            visit_page: Arc::new(BrowserVisitPage),
            protocol_version: ProtocolVersion::LATEST,
            discharge_enabled: true,
            wait_method: DEFAULT_WAIT_METHOD.to_string(),
            max_remediations: DEFAULT_MAX_REMEDIATIONS,
            on_discharge: None,
        }
    }

    /// Returns a clone that surfaces discharge demands instead of resolving them.
    #[must_use]
    pub fn without_discharge(&self) -> Self {
        Self {
            discharge_enabled: false,
            ..self.clone()
        }
    }

    /// Returns the credential store.
    #[must_use]
    pub fn storage(&self) -> &CredentialStore {
        &self.storage
    }

    /// Returns the advertised protocol version.
    #[must_use]
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    /// Returns whether discharge demands are resolved.
    #[must_use]
    pub fn discharge_enabled(&self) -> bool {
        self.discharge_enabled
    }

    /// Sends a `GET` request.
    ///
    /// # Errors
    ///
    /// See [`BakeryClient::send_request`].
    pub async fn get(&self, url: &str) -> Result<HttpResponse, BakeryError> {
        self.send_request(url, "get", RequestHeaders::new(), None)
            .await
    }

    /// Sends a `DELETE` request.
    ///
    /// # Errors
    ///
    /// See [`BakeryClient::send_request`].
    pub async fn delete(&self, url: &str) -> Result<HttpResponse, BakeryError> {
        self.send_request(url, "delete", RequestHeaders::new(), None)
            .await
    }

    /// Sends a `POST` request with `body`.
    ///
    /// # Errors
    ///
    /// See [`BakeryClient::send_request`].
    pub async fn post(&self, url: &str, body: impl Into<String>) -> Result<HttpResponse, BakeryError> {
        self.send_request(url, "post", RequestHeaders::new(), Some(body.into()))
            .await
    }

    /// Sends a `PUT` request with `body`.
    ///
    /// # Errors
    ///
    /// See [`BakeryClient::send_request`].
    pub async fn put(&self, url: &str, body: impl Into<String>) -> Result<HttpResponse, BakeryError> {
        self.send_request(url, "put", RequestHeaders::new(), Some(body.into()))
            .await
    }

    /// Sends a `PATCH` request with `body`.
    ///
    /// # Errors
    ///
    /// See [`BakeryClient::send_request`].
    pub async fn patch(&self, url: &str, body: impl Into<String>) -> Result<HttpResponse, BakeryError> {
        self.send_request(url, "patch", RequestHeaders::new(), Some(body.into()))
            .await
    }

    /// Sends a request, resolving discharge and interaction demands.
    ///
    /// The protocol version header and the stored credential for the URL's
    /// service are added to `headers`. `body` is dropped for `GET`, `DELETE`
    /// and `HEAD`. Once remediation succeeds, the original request is
    /// replayed with the same method, headers and body.
    ///
    /// # Errors
    ///
    /// Returns [`BakeryError`] when remediation fails or the store cannot be
    /// used. Non-2xx responses that need no remediation are returned as `Ok`.
    pub async fn send_request(
        &self,
        url: &str,
        method: &str,
        headers: RequestHeaders,
        body: Option<String>,
    ) -> Result<HttpResponse, BakeryError> {
        let request = PendingRequest {
            url: url.to_string(),
            method: method.to_ascii_lowercase(),
            headers,
            body,
        };
        self.dispatch(request, 0).await
    }

    // Boxed so discharge and interaction can replay requests recursively.
    fn dispatch(
        &self,
        request: PendingRequest,
        round: u32,
    ) -> BoxFuture<'_, Result<HttpResponse, BakeryError>> {
        Box::pin(async move {
            let outgoing = self.prepare(&request)?;
            debug!(url = %outgoing.url, method = %outgoing.method, round, "sending request");
            let response = self.transport.send(outgoing).await;
            self.intercept(request, response, round).await
        })
    }

    fn prepare(&self, request: &PendingRequest) -> Result<HttpRequest, BakeryError> {
        let mut headers = request.headers.clone();
        headers.insert(
            BAKERY_PROTOCOL_HEADER.to_string(),
            self.protocol_version.header_value(),
        );
        if let Some(credential) = self.storage.get(&request.url)? {
            headers.insert(MACAROONS_HEADER.to_string(), HeaderValue::Text(credential));
        }

        let body = if method_allows_body(&request.method) {
            request.body.clone()
        } else {
            None
        };

        Ok(HttpRequest {
            url: request.url.clone(),
            method: request.method.clone(),
            headers,
            body,
            with_credentials: with_credentials(&request.method, &request.url),
        })
    }

    #[instrument(level = "debug", skip(self, request, response), fields(url = %request.url, status = response.status))]
    async fn intercept(
        &self,
        request: PendingRequest,
        response: HttpResponse,
        round: u32,
    ) -> Result<HttpResponse, BakeryError> {
        match classify(&response) {
            AuthOutcome::Success | AuthOutcome::OtherError(_) => Ok(response),
            AuthOutcome::InteractionRequired(error) => {
                self.check_rounds(&request, round)?;
                info!("interaction required");
                self.interact(&error).await?;
                self.dispatch(request, round + 1).await
            }
            AuthOutcome::DischargeRequired(error) => {
                if !self.discharge_enabled {
                    debug!("discharge required but disabled; returning response");
                    return Err(BakeryError::DischargeDisabled { response });
                }
                self.check_rounds(&request, round)?;
                info!("macaroon discharge required");

                let macaroon = error.info.macaroon.ok_or(BakeryError::MissingMacaroon)?;
                let discharged = self.discharge_at(&macaroon, round + 1).await?;
                self.store_discharged(&request.url, &discharged)?;
                if let Some(hook) = &self.on_discharge {
                    hook(&request.url);
                }
                self.dispatch(request, round + 1).await
            }
        }
    }

    fn check_rounds(&self, request: &PendingRequest, round: u32) -> Result<(), BakeryError> {
        if round >= self.max_remediations {
            warn!(url = %request.url, limit = self.max_remediations, "remediation limit reached");
            return Err(BakeryError::TooManyRemediations {
                url: request.url.clone(),
                limit: self.max_remediations,
            });
        }
        Ok(())
    }

    fn store_discharged(
        &self,
        url: &str,
        discharged: &[serde_json::Value],
    ) -> Result<(), BakeryError> {
        let encoded = STANDARD.encode(serde_json::to_string(discharged)?);
        match self.storage.set(url, &encoded) {
            Ok(()) => Ok(()),
            // The credential is already persisted; only the cookie copy failed.
            Err(error @ StoreError::CookieBridge { .. }) => {
                warn!(error = %error, "failed to bridge discharged macaroons into cookie");
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }
}

impl fmt::Debug for BakeryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BakeryClient")
            .field("storage", &self.storage)
            .field("has_macaroon_library", &self.macaroons.is_some())
            .field("protocol_version", &self.protocol_version)
            .field("discharge_enabled", &self.discharge_enabled)
            .field("wait_method", &self.wait_method)
            .field("max_remediations", &self.max_remediations)
            .finish_non_exhaustive()
    }
}

fn method_allows_body(method: &str) -> bool {
    !matches!(method, "get" | "delete" | "head")
}

/// Cookies are only sent on `PUT .../set-auth-cookie`.
fn with_credentials(method: &str, url: &str) -> bool {
    if !method.eq_ignore_ascii_case("put") {
        return false;
    }
    match Url::parse(url) {
        Ok(parsed) => parsed.path().contains(SET_AUTH_COOKIE_PATH),
        Err(_) => url.contains(SET_AUTH_COOKIE_PATH),
    }
}
