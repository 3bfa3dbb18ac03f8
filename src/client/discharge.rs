//! Third-party discharge acquisition.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};

use super::{BakeryClient, BakeryError, PendingRequest};
use crate::macaroon::{DischargeAcquirer, Macaroon, MacaroonLibrary};
use crate::protocol::{CONTENT_TYPE_HEADER, DISCHARGE_PATH, FORM_CONTENT_TYPE};
use crate::transport::{HttpResponse, RequestHeaders};

const DISCHARGE_RESPONSE_FIELD: &str = "Macaroon";

/// Routes the library's per-caveat discharge requests back through the client.
///
/// Requests are dispatched at `round`, so remediation nested inside a third
/// party counts against the same limit as the request that needed it.
struct ClientAcquirer<'a> {
    client: &'a BakeryClient,
    round: u32,
    // The library only sees strings; the limit error is kept typed here.
    exhausted: Mutex<Option<BakeryError>>,
}

impl<'a> ClientAcquirer<'a> {
    fn new(client: &'a BakeryClient, round: u32) -> Self {
        Self {
            client,
            round,
            exhausted: Mutex::new(None),
        }
    }

    fn take_exhausted(&self) -> Option<BakeryError> {
        self.exhausted.lock().ok().and_then(|mut slot| slot.take())
    }
}

#[async_trait]
impl DischargeAcquirer for ClientAcquirer<'_> {
    async fn acquire(
        &self,
        location: &str,
        third_party_location: &str,
        caveat_id: &[u8],
    ) -> Result<Box<dyn Macaroon>, String> {
        self.client
            .fetch_discharge(location, third_party_location, caveat_id, self.round)
            .await
            .map_err(|error| {
                let message = error.to_string();
                if matches!(error, BakeryError::TooManyRemediations { .. })
                    && let Ok(mut slot) = self.exhausted.lock()
                {
                    slot.get_or_insert(error);
                }
                message
            })
    }
}

impl BakeryClient {
    /// Discharges every third-party caveat of `macaroon`.
    ///
    /// Returns the macaroon bound with its discharges, each exported in the
    /// client's protocol version format.
    ///
    /// # Errors
    ///
    /// Returns [`BakeryError::NoMacaroonLibrary`] without a library, and
    /// [`BakeryError::Discharge`] carrying the library's message verbatim
    /// when discharging fails.
    pub async fn discharge(&self, macaroon: &Value) -> Result<Vec<Value>, BakeryError> {
        self.discharge_at(macaroon, 0).await
    }

    /// Discharges `macaroon`, dispatching third-party requests at `round`.
    #[instrument(level = "debug", skip(self, macaroon))]
    pub(super) async fn discharge_at(
        &self,
        macaroon: &Value,
        round: u32,
    ) -> Result<Vec<Value>, BakeryError> {
        let library = self
            .macaroons
            .as_ref()
            .ok_or(BakeryError::NoMacaroonLibrary)?;
        let acquirer = ClientAcquirer::new(self, round);

        let discharged = library
            .discharge_macaroon(macaroon, &acquirer)
            .await
            .map_err(|message| {
                acquirer
                    .take_exhausted()
                    .unwrap_or(BakeryError::Discharge(message))
            })?;
        debug!(count = discharged.len(), "macaroon discharged");

        Ok(discharged
            .iter()
            .map(|macaroon| self.protocol_version.export(macaroon.as_ref()))
            .collect())
    }

    /// Requests a discharge for one third-party caveat.
    ///
    /// POSTs `id=<caveat>&location=<location>` as a form to
    /// `<third_party_location>/discharge` through the same interception as
    /// [`BakeryClient::send_request`], so a third party demanding interaction
    /// is handled as well.
    ///
    /// # Errors
    ///
    /// Returns `"unable to parse macaroon."` when the response carries no
    /// importable `Macaroon`, or the failure of the underlying request.
    pub async fn get_third_party_discharge(
        &self,
        location: &str,
        third_party_location: &str,
        caveat_id: &[u8],
    ) -> Result<Box<dyn Macaroon>, BakeryError> {
        self.fetch_discharge(location, third_party_location, caveat_id, 0)
            .await
    }

    #[instrument(level = "debug", skip(self, caveat_id))]
    async fn fetch_discharge(
        &self,
        location: &str,
        third_party_location: &str,
        caveat_id: &[u8],
        round: u32,
    ) -> Result<Box<dyn Macaroon>, BakeryError> {
        let library = self
            .macaroons
            .as_ref()
            .ok_or(BakeryError::NoMacaroonLibrary)?;

        let mut headers = RequestHeaders::new();
        headers.insert(CONTENT_TYPE_HEADER.to_string(), FORM_CONTENT_TYPE.into());
        let request = PendingRequest {
            url: format!("{third_party_location}{DISCHARGE_PATH}"),
            method: "post".to_string(),
            headers,
            body: Some(discharge_form(location, caveat_id)),
        };

        let response = self.dispatch(request, round).await?;
        import_discharge(library.as_ref(), &response)
    }
}

fn discharge_form(location: &str, caveat_id: &[u8]) -> String {
    format!(
        "id={}&location={}",
        urlencoding::encode_binary(caveat_id),
        urlencoding::encode(location)
    )
}

fn import_discharge(
    library: &dyn MacaroonLibrary,
    response: &HttpResponse,
) -> Result<Box<dyn Macaroon>, BakeryError> {
    let parsed: Value =
        serde_json::from_str(&response.body).map_err(|_| BakeryError::unparseable_macaroon())?;
    let exported = parsed
        .get(DISCHARGE_RESPONSE_FIELD)
        .ok_or_else(BakeryError::unparseable_macaroon)?;

    library
        .import_macaroons(exported)
        .ok()
        .and_then(|macaroons| macaroons.into_iter().next())
        .ok_or_else(BakeryError::unparseable_macaroon)
}
