//! The visit/wait interaction handshake.
//!
//! The visit page is shown to the user, then the wait URL is polled until
//! the identity provider answers. Transport failures (status 0) are retried
//! immediately; any HTTP answer ends the handshake.

use tracing::{debug, info, instrument, warn};

use super::{BakeryClient, BakeryError};
use crate::protocol::{AuthorizationError, CONTENT_TYPE_HEADER, JSON_CONTENT_TYPE, get_error};
use crate::transport::{HttpRequest, HttpResponse, RequestHeaders};

/// Maximum wait requests sent for one interaction.
pub const MAX_WAIT_ATTEMPTS: u32 = 6;

/// Wait-request attempt counter for one interaction.
///
/// Counts requests sent, so a fresh state allows [`MAX_WAIT_ATTEMPTS`] sends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    attempts: u32,
}

impl RetryState {
    /// Creates a state with no attempts recorded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of attempts recorded so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Records one sent wait request.
    pub fn record_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    /// Returns `true` while another wait request may be sent.
    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.attempts < MAX_WAIT_ATTEMPTS
    }
}

/// Result of one wait request.
#[derive(Debug)]
enum WaitOutcome {
    Complete,
    Transient,
    Failed(String),
}

fn evaluate_wait(response: &HttpResponse) -> WaitOutcome {
    if response.is_no_response() {
        return WaitOutcome::Transient;
    }
    if let Some(error) = get_error(response) {
        return WaitOutcome::Failed(error.message);
    }
    if !response.is_success() {
        return WaitOutcome::Failed(format!(
            "wait request failed with HTTP {}",
            response.status
        ));
    }
    WaitOutcome::Complete
}

impl BakeryClient {
    /// Runs the interaction handshake described by `error`.
    ///
    /// Shows the visit page, then polls the wait URL (at most
    /// [`MAX_WAIT_ATTEMPTS`] times, retrying only transport failures).
    /// A failure to show the visit page is logged and polling continues.
    ///
    /// # Errors
    ///
    /// Returns [`BakeryError::Interaction`] when the error lacks a visit or
    /// wait URL, when the wait endpoint reports an error, or when every wait
    /// attempt fails to get a response.
    #[instrument(level = "debug", skip(self, error))]
    pub async fn interact(&self, error: &AuthorizationError) -> Result<(), BakeryError> {
        let (Some(visit_url), Some(wait_url)) = (error.info.visit_url(), error.info.wait_url())
        else {
            return Err(BakeryError::interaction("missing visit or wait URL"));
        };

        if let Err(visit_error) = self.visit_page.visit_page(error) {
            warn!(url = %visit_url, error = %visit_error, "failed to show interaction page");
        }

        let mut retry = RetryState::new();
        loop {
            retry.record_attempt();
            debug!(url = %wait_url, attempt = retry.attempts(), "waiting for interaction");
            let response = self.transport.send(self.wait_request(wait_url)).await;

            match evaluate_wait(&response) {
                WaitOutcome::Complete => {
                    info!("interaction complete");
                    return Ok(());
                }
                WaitOutcome::Failed(message) => {
                    return Err(BakeryError::Interaction(message));
                }
                WaitOutcome::Transient if retry.can_retry() => {
                    warn!(attempt = retry.attempts(), "no response from wait URL; retrying");
                }
                WaitOutcome::Transient => {
                    return Err(BakeryError::interaction(format!(
                        "no response from wait URL after {} attempts",
                        retry.attempts()
                    )));
                }
            }
        }
    }

    // Wait requests bypass interception and carry no stored credential.
    fn wait_request(&self, wait_url: &str) -> HttpRequest {
        let mut headers = RequestHeaders::new();
        headers.insert(CONTENT_TYPE_HEADER.to_string(), JSON_CONTENT_TYPE.into());
        HttpRequest {
            url: wait_url.to_string(),
            method: self.wait_method.clone(),
            headers,
            body: None,
            with_credentials: false,
        }
    }
}
