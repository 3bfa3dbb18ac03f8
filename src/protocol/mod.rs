//! Bakery wire protocol: versions, header names, and error classification.
//!
//! The protocol version selects two wire rules, kept together in a small
//! per-version table rather than spread across the client:
//! - how `Bakery-Protocol-Version` is encoded (numeric for v1, string for v2)
//! - which export format discharge macaroons are serialized with

mod error;

pub use error::{AuthOutcome, AuthorizationError, ErrorInfo, classify, get_error};

use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use thiserror::Error;

use crate::macaroon::Macaroon;
use crate::transport::HeaderValue;

/// Header carrying the client's protocol version on every request.
pub const BAKERY_PROTOCOL_HEADER: &str = "Bakery-Protocol-Version";

/// Header carrying the stored credential for the target service.
pub const MACAROONS_HEADER: &str = "Macaroons";

/// Content-Type header name.
pub const CONTENT_TYPE_HEADER: &str = "Content-Type";

/// Content type of the third-party discharge request body.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Content type sent on interaction wait requests.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Path suffix of third-party discharge endpoints.
pub const DISCHARGE_PATH: &str = "/discharge";

/// The only endpoint that receives cross-origin credentials.
pub const SET_AUTH_COOKIE_PATH: &str = "/set-auth-cookie";

/// Error code of a response demanding the visit/wait handshake.
pub const ERR_INTERACTION_REQUIRED: &str = "interaction required";

/// Error code of a response demanding a third-party discharge.
pub const ERR_DISCHARGE_REQUIRED: &str = "macaroon discharge required";

/// Errors from protocol configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The requested protocol version is not one this client speaks.
    #[error("unsupported bakery protocol version: {0} (expected 1 or 2)")]
    UnsupportedVersion(String),
}

/// Bakery protocol version, fixed per client at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolVersion {
    /// Version 1: numeric header value, v1 macaroon JSON export.
    V1,
    /// Version 2 (latest): string header value, v2 macaroon JSON export.
    #[default]
    V2,
}

struct VersionRules {
    number: u8,
    numeric_header: bool,
    export: fn(&dyn Macaroon) -> Value,
}

const V1_RULES: VersionRules = VersionRules {
    number: 1,
    numeric_header: true,
    export: export_v1,
};

const V2_RULES: VersionRules = VersionRules {
    number: 2,
    numeric_header: false,
    export: export_v2,
};

fn export_v1(macaroon: &dyn Macaroon) -> Value {
    macaroon.export_v1()
}

fn export_v2(macaroon: &dyn Macaroon) -> Value {
    macaroon.export_v2()
}

impl ProtocolVersion {
    /// The latest version spoken by this client.
    pub const LATEST: Self = Self::V2;

    fn rules(self) -> &'static VersionRules {
        match self {
            Self::V1 => &V1_RULES,
            Self::V2 => &V2_RULES,
        }
    }

    /// Returns the version number.
    #[must_use]
    pub fn number(self) -> u8 {
        self.rules().number
    }

    /// Returns the `Bakery-Protocol-Version` header value for this version.
    ///
    /// Version 1 servers expect the native integer and version 2 servers the
    /// string form; the two are not interchangeable.
    #[must_use]
    pub fn header_value(self) -> HeaderValue {
        let rules = self.rules();
        if rules.numeric_header {
            HeaderValue::Number(u64::from(rules.number))
        } else {
            HeaderValue::Text(rules.number.to_string())
        }
    }

    /// Exports a macaroon in this version's serialization format.
    #[must_use]
    pub fn export(self, macaroon: &dyn Macaroon) -> Value {
        (self.rules().export)(macaroon)
    }
}

impl TryFrom<u8> for ProtocolVersion {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            other => Err(ProtocolError::UnsupportedVersion(other.to_string())),
        }
    }
}

impl FromStr for ProtocolVersion {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let number = trimmed
            .trim_start_matches(['v', 'V'])
            .parse::<u8>()
            .map_err(|_| ProtocolError::UnsupportedVersion(trimmed.to_string()))?;
        Self::try_from(number)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}
