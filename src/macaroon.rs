//! Seam to the macaroon cryptography library.
//!
//! Binding discharges to a root macaroon, verifying caveats, and the
//! serialization formats all belong to an external library. The client only
//! needs the three capabilities below, so any implementation can be plugged in.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

/// A macaroon owned by the external library.
pub trait Macaroon: Send + Sync + fmt::Debug {
    /// Exports the macaroon in the version 1 JSON format.
    fn export_v1(&self) -> Value;

    /// Exports the macaroon in the version 2 JSON format.
    fn export_v2(&self) -> Value;
}

/// Acquires the discharge for one third-party caveat.
///
/// The bakery client implements this by fetching from the third party's
/// `/discharge` endpoint; the library calls it once per third-party caveat.
#[async_trait]
pub trait DischargeAcquirer: Send + Sync {
    /// Returns the discharge macaroon for `caveat_id` issued by `third_party_location`.
    ///
    /// `location` is the location of the macaroon holding the caveat.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message when the discharge cannot be obtained.
    async fn acquire(
        &self,
        location: &str,
        third_party_location: &str,
        caveat_id: &[u8],
    ) -> Result<Box<dyn Macaroon>, String>;
}

/// The operations the bakery client needs from a macaroon library.
#[async_trait]
pub trait MacaroonLibrary: Send + Sync {
    /// Imports macaroons from their JSON transport form.
    ///
    /// # Errors
    ///
    /// Returns a message when `json` is not a valid macaroon or macaroon list.
    fn import_macaroons(&self, json: &Value) -> Result<Vec<Box<dyn Macaroon>>, String>;

    /// Gathers discharges for every third-party caveat of `macaroon`.
    ///
    /// On success returns the discharge macaroons, bound to `macaroon`, in order.
    ///
    /// # Errors
    ///
    /// Returns the library's failure message, which the client forwards verbatim.
    async fn discharge_macaroon(
        &self,
        macaroon: &Value,
        acquirer: &dyn DischargeAcquirer,
    ) -> Result<Vec<Box<dyn Macaroon>>, String>;
}
