//! Service-keyed credential store.
//!
//! Every request URL maps onto one logical service key; the store holds one
//! opaque credential per key. A request only ever sees the credential of the
//! service whose URL prefix it matches, so services sharing one backing store
//! cannot leak credentials to each other.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use tracing::{debug, instrument};

use super::{KeyValueStore, StoreError};
use crate::platform::CookieSetter;
use crate::protocol::DISCHARGE_PATH;

/// Service whose credential is bridged into a legacy cookie by default.
pub const DEFAULT_COOKIE_SERVICE: &str = "charmstore";

/// Persists one credential per logical service.
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn KeyValueStore>,
    services: Arc<BTreeMap<String, String>>,
    cookie_service: String,
    cookie_setter: Option<Arc<dyn CookieSetter>>,
}

/// Builder for [`CredentialStore`].
pub struct CredentialStoreBuilder {
    store: Arc<dyn KeyValueStore>,
    services: BTreeMap<String, String>,
    cookie_service: String,
    cookie_setter: Option<Arc<dyn CookieSetter>>,
}

impl CredentialStoreBuilder {
    /// Maps `name` to every URL starting with `url_prefix`.
    #[must_use]
    pub fn service(mut self, name: impl Into<String>, url_prefix: impl Into<String>) -> Self {
        self.services.insert(name.into(), url_prefix.into());
        self
    }

    /// Adds several service mappings.
    #[must_use]
    pub fn services<I, N, P>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = (N, P)>,
        N: Into<String>,
        P: Into<String>,
    {
        self.services.extend(
            services
                .into_iter()
                .map(|(name, prefix)| (name.into(), prefix.into())),
        );
        self
    }

    /// Overrides which service's credential is bridged into a cookie.
    #[must_use]
    pub fn cookie_service(mut self, name: impl Into<String>) -> Self {
        self.cookie_service = name.into();
        self
    }

    /// Installs the legacy cookie setter.
    #[must_use]
    pub fn cookie_setter(mut self, setter: Arc<dyn CookieSetter>) -> Self {
        self.cookie_setter = Some(setter);
        self
    }

    /// Builds the store. The service table is immutable from here on.
    #[must_use]
    pub fn build(self) -> CredentialStore {
        CredentialStore {
            store: self.store,
            services: Arc::new(self.services),
            cookie_service: self.cookie_service,
            cookie_setter: self.cookie_setter,
        }
    }
}

impl CredentialStore {
    /// Starts building a store over `store`.
    #[must_use]
    pub fn builder(store: Arc<dyn KeyValueStore>) -> CredentialStoreBuilder {
        CredentialStoreBuilder {
            store,
            services: BTreeMap::new(),
            cookie_service: DEFAULT_COOKIE_SERVICE.to_string(),
            cookie_setter: None,
        }
    }

    /// Returns the configured service table.
    #[must_use]
    pub fn services(&self) -> &BTreeMap<String, String> {
        &self.services
    }

    /// Returns the credential stored for the service of `url`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backing store fails.
    pub fn get(&self, url: &str) -> Result<Option<String>, StoreError> {
        self.store.get_item(&self.key_for(url))
    }

    /// Stores `value` for the service of `url`.
    ///
    /// For the cookie-bridged service with a cookie setter installed, the value
    /// is also base64-decoded, parsed as JSON, and handed to the setter. The
    /// credential is persisted before bridging; bridge failures are returned.
    /// Without a setter the value is never decoded.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when persisting or bridging fails.
    #[instrument(level = "debug", skip(self, value))]
    pub fn set(&self, url: &str, value: &str) -> Result<(), StoreError> {
        let key = self.key_for(url);
        self.store.set_item(&key, value)?;
        debug!(key = %key, "stored credential");

        if key == self.cookie_service
            && let Some(setter) = &self.cookie_setter
        {
            let decoded = STANDARD.decode(value)?;
            let macaroons: Value = serde_json::from_slice(&decoded)?;
            setter
                .set_cookie(&macaroons)
                .map_err(|reason| StoreError::CookieBridge {
                    service: key.clone(),
                    reason,
                })?;
            debug!(key = %key, "bridged credential into legacy cookie");
        }
        Ok(())
    }

    /// Removes the credential for the service of `url`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backing store fails.
    pub fn remove(&self, url: &str) -> Result<(), StoreError> {
        let key = self.key_for(url);
        self.store.remove_item(&key)?;
        debug!(key = %key, "removed credential");
        Ok(())
    }

    /// Derives the service key for `url`.
    ///
    /// 1. A trailing `/discharge` is stripped.
    /// 2. The longest configured URL prefix matching the rest names the service.
    /// 3. Unmatched URLs are their own key.
    #[must_use]
    pub fn key_for(&self, url: &str) -> String {
        let url = url.strip_suffix(DISCHARGE_PATH).unwrap_or(url);
        self.services
            .iter()
            .filter(|(_, prefix)| url.starts_with(prefix.as_str()))
            .max_by_key(|(_, prefix)| prefix.len())
            .map_or_else(|| url.to_string(), |(name, _)| name.clone())
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("services", &self.services)
            .field("cookie_service", &self.cookie_service)
            .field("cookie_setter", &self.cookie_setter.is_some())
            .finish_non_exhaustive()
    }
}
