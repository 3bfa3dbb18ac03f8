//! Shared User-Agent string for bakery HTTP traffic.

/// Default User-Agent for all requests issued by the reqwest transport.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    format!("bakery-client/{}", env!("CARGO_PKG_VERSION"))
}
