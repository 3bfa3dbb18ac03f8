//! Error types for the bakery client.
//!
//! The `Display` strings of the remediation failures are part of the client's
//! observable contract and are matched on by callers.

use thiserror::Error;

use crate::storage::StoreError;
use crate::transport::HttpResponse;

/// Message of [`BakeryError::DischargeDisabled`].
pub const DISCHARGE_DISABLED_MESSAGE: &str = "discharge required but disabled";

/// Message returned when a third party's discharge response cannot be used.
pub const UNPARSEABLE_MACAROON_MESSAGE: &str = "unable to parse macaroon.";

/// Errors surfaced by [`BakeryClient`](super::BakeryClient) requests.
///
/// Ordinary HTTP failures are not errors: any response that is not a
/// discharge or interaction demand is returned to the caller unchanged.
#[derive(Debug, Error)]
pub enum BakeryError {
    /// A discharge was demanded while the client runs without discharge.
    ///
    /// Carries the raw response so the caller can resolve it.
    #[error("discharge required but disabled")]
    DischargeDisabled {
        /// The server's discharge-required response.
        response: HttpResponse,
    },

    /// Discharging failed. The message is the macaroon library's failure
    /// message verbatim, or `"unable to parse macaroon."`.
    #[error("{0}")]
    Discharge(String),

    /// The visit/wait handshake failed.
    #[error("cannot interact: {0}")]
    Interaction(String),

    /// A discharge was demanded but the client has no macaroon library.
    #[error("cannot discharge: no macaroon library configured")]
    NoMacaroonLibrary,

    /// A discharge-required error carried no macaroon.
    #[error("cannot discharge: error response carries no macaroon")]
    MissingMacaroon,

    /// The server kept demanding remediation for the same request.
    #[error("giving up on {url} after {limit} discharge/interaction rounds")]
    TooManyRemediations {
        /// The request URL.
        url: String,
        /// The configured remediation limit.
        limit: u32,
    },

    /// Reading or writing the credential store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The discharged macaroons could not be serialized for storage.
    #[error("failed to encode discharged macaroons: {0}")]
    Encode(#[from] serde_json::Error),
}

impl BakeryError {
    /// Creates an interaction failure.
    pub fn interaction(message: impl Into<String>) -> Self {
        Self::Interaction(message.into())
    }

    /// Creates a discharge failure.
    pub fn discharge(message: impl Into<String>) -> Self {
        Self::Discharge(message.into())
    }

    /// Creates the failure for an unusable third-party discharge response.
    #[must_use]
    pub fn unparseable_macaroon() -> Self {
        Self::Discharge(UNPARSEABLE_MACAROON_MESSAGE.to_string())
    }
}
