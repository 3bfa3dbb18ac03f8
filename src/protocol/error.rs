//! Authorization error bodies and response classification.
//!
//! A failed bakery response carries a JSON body of the shape
//! `{"Code": ..., "Message": ..., "Info": {...}}`. The body is decoded once into
//! an [`AuthOutcome`] and the client dispatches on the variant.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::{ERR_DISCHARGE_REQUIRED, ERR_INTERACTION_REQUIRED};
use crate::transport::HttpResponse;

/// Structured error returned by a bakery-aware server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationError {
    /// Machine-readable error code.
    #[serde(rename = "Code", default, deserialize_with = "string_or_empty")]
    pub code: String,
    /// Human-readable message.
    #[serde(rename = "Message", default, deserialize_with = "string_or_empty")]
    pub message: String,
    /// Protocol-specific fields.
    #[serde(rename = "Info", default, deserialize_with = "info_or_default")]
    pub info: ErrorInfo,
}

/// Protocol-specific fields of an [`AuthorizationError`].
///
/// Every field is optional on the wire. String fields holding `null` or a
/// value of another type decode as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Macaroon that needs discharging (exported JSON form).
    #[serde(rename = "Macaroon", default, skip_serializing_if = "Option::is_none")]
    pub macaroon: Option<Value>,
    /// Path the discharged macaroon should be scoped to.
    #[serde(
        rename = "MacaroonPath",
        default,
        deserialize_with = "string_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub macaroon_path: Option<String>,
    /// Suffix of the cookie name the macaroon would be stored under.
    #[serde(
        rename = "CookieNameSuffix",
        default,
        deserialize_with = "string_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub cookie_name_suffix: Option<String>,
    /// Page the user should visit to complete interaction.
    #[serde(
        rename = "VisitURL",
        default,
        deserialize_with = "string_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub visit_url: Option<String>,
    /// Endpoint polled until interaction completes.
    #[serde(
        rename = "WaitURL",
        default,
        deserialize_with = "string_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub wait_url: Option<String>,
    /// Interaction methods offered by the server.
    #[serde(rename = "InteractionMethods", default, skip_serializing_if = "Option::is_none")]
    pub interaction_methods: Option<Value>,
    /// Visit URL for legacy clients.
    #[serde(
        rename = "LegacyVisitURL",
        default,
        deserialize_with = "string_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub legacy_visit_url: Option<String>,
    /// Wait URL for legacy clients.
    #[serde(
        rename = "LegacyWaitURL",
        default,
        deserialize_with = "string_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub legacy_wait_url: Option<String>,
}

impl ErrorInfo {
    /// Returns the visit URL, falling back to the legacy field.
    #[must_use]
    pub fn visit_url(&self) -> Option<&str> {
        first_non_empty(self.visit_url.as_deref(), self.legacy_visit_url.as_deref())
    }

    /// Returns the wait URL, falling back to the legacy field.
    #[must_use]
    pub fn wait_url(&self) -> Option<&str> {
        first_non_empty(self.wait_url.as_deref(), self.legacy_wait_url.as_deref())
    }
}

fn first_non_empty<'a>(primary: Option<&'a str>, legacy: Option<&'a str>) -> Option<&'a str> {
    primary
        .filter(|url| !url.is_empty())
        .or_else(|| legacy.filter(|url| !url.is_empty()))
}

fn string_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => Some(text),
        _ => None,
    })
}

fn string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(string_or_none(deserializer)?.unwrap_or_default())
}

// A malformed `Info` must not hide the `Code` that names the remediation.
fn info_or_default<'de, D>(deserializer: D) -> Result<ErrorInfo, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .and_then(|value| ErrorInfo::deserialize(value).ok())
        .unwrap_or_default())
}

/// Classification of a transport response from the bakery's point of view.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    /// 2xx response; forwarded to the caller unchanged.
    Success,
    /// The server demands a third-party discharge of `Info.Macaroon`.
    DischargeRequired(AuthorizationError),
    /// The server demands the visit/wait interaction handshake.
    InteractionRequired(AuthorizationError),
    /// Any other failure. Carries the structured error when the body had one;
    /// `None` for unparseable bodies and transport failures.
    OtherError(Option<AuthorizationError>),
}

/// Decodes a response into an [`AuthOutcome`].
#[must_use]
pub fn classify(response: &HttpResponse) -> AuthOutcome {
    if response.is_success() {
        return AuthOutcome::Success;
    }

    match get_error(response) {
        Some(error) if error.code == ERR_DISCHARGE_REQUIRED => AuthOutcome::DischargeRequired(error),
        Some(error) if error.code == ERR_INTERACTION_REQUIRED => {
            AuthOutcome::InteractionRequired(error)
        }
        other => AuthOutcome::OtherError(other),
    }
}

/// Extracts the structured error from a failed response.
///
/// Returns `None` for successful responses, transport failures (status 0),
/// and bodies that are not a JSON error object with a non-empty `Code`.
#[must_use]
pub fn get_error(response: &HttpResponse) -> Option<AuthorizationError> {
    if response.is_success() || response.is_no_response() {
        return None;
    }

    let error: AuthorizationError = serde_json::from_str(&response.body).ok()?;
    if error.code.is_empty() {
        return None;
    }
    Some(error)
}
