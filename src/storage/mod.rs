//! Credential persistence keyed by logical service.
//!
//! This module provides the key-value seam the bakery persists macaroons
//! through, and the [`CredentialStore`] that maps request URLs onto service keys.
//!
//! # Architecture
//!
//! - [`KeyValueStore`] - `get_item` / `set_item` / `remove_item` persistence seam
//! - [`InMemoryStore`] - Process-local default, no persistence across restarts
//! - [`FileStore`] - JSON file under the user config directory
//! - [`CredentialStore`] - Service key derivation and the legacy cookie bridge

mod credentials;
mod file_store;

pub use credentials::{CredentialStore, CredentialStoreBuilder, DEFAULT_COOKIE_SERVICE};
pub use file_store::{FileStore, default_store_path};

use std::collections::HashMap;
use std::sync::Mutex;

/// Errors for credential storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No suitable user config directory is available.
    #[error("unable to determine config directory (set XDG_CONFIG_HOME or HOME)")]
    ConfigDirUnavailable,

    /// Filesystem I/O failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A persisted file or bridged credential is not valid JSON.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// A bridged credential is not valid base64.
    #[error("stored credential is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// A previous holder of the store lock panicked.
    #[error("credential store lock poisoned")]
    Poisoned,

    /// The legacy cookie setter rejected the credential.
    #[error("failed to bridge credential into cookie for {service}: {reason}")]
    CookieBridge {
        /// Service whose credential was being bridged.
        service: String,
        /// Setter failure message.
        reason: String,
    },
}

/// Simple persistent key-value map, the shape of browser local storage.
///
/// Writes are plain overwrites with last-write-wins semantics.
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backing medium cannot be read.
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backing medium cannot be written.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes the value stored under `key`. Missing keys are not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backing medium cannot be written.
    fn remove_item(&self, key: &str) -> Result<(), StoreError>;
}

/// In-memory [`KeyValueStore`] (default implementation and test double).
#[derive(Debug, Default)]
pub struct InMemoryStore {
    items: Mutex<HashMap<String, String>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        let items = self.items.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut items = self.items.lock().map_err(|_| StoreError::Poisoned)?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        let mut items = self.items.lock().map_err(|_| StoreError::Poisoned)?;
        items.remove(key);
        Ok(())
    }
}
