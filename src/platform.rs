//! Platform adapters: opening the visit page and bridging legacy cookies.
//!
//! The bakery core has no ambient environment. Anything that touches the
//! user's desktop or a cookie-based session is passed in through these traits.

use std::io::{self, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};

use serde_json::Value;
use tracing::{debug, info};

use crate::protocol::AuthorizationError;

/// Shows the interaction page to the user.
pub trait VisitPage: Send + Sync {
    /// Presents `error.Info.VisitURL` (or its legacy fallback) to the user.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the page cannot be shown. The client logs it
    /// and keeps polling the wait URL.
    fn visit_page(&self, error: &AuthorizationError) -> io::Result<()>;
}

/// Receives the decoded credential of the cookie-bridged service.
pub trait CookieSetter: Send + Sync {
    /// Keeps a legacy cookie-based session in sync with `macaroons`.
    ///
    /// # Errors
    ///
    /// Returns a message when the cookie cannot be written.
    fn set_cookie(&self, macaroons: &Value) -> Result<(), String>;
}

/// Opens the visit URL in the system browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserVisitPage;

impl VisitPage for BrowserVisitPage {
    fn visit_page(&self, error: &AuthorizationError) -> io::Result<()> {
        let url = visit_url(error)?;
        info!(url = %url, "opening interaction page in browser");
        spawn_reaped(opener_command(url)).map(|_| ())
    }
}

/// Spawns `command` and waits for it on a background thread so the opener
/// never lingers as a zombie.
fn spawn_reaped(mut command: Command) -> io::Result<JoinHandle<Option<ExitStatus>>> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    thread::Builder::new()
        .name("bakery-visit-opener".to_string())
        .spawn(move || match child.wait() {
            Ok(status) => {
                debug!(%status, "browser opener exited");
                Some(status)
            }
            Err(error) => {
                debug!(error = %error, "failed to wait for browser opener");
                None
            }
        })
}

/// Prints the visit URL to stderr for headless sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrintVisitPage;

impl VisitPage for PrintVisitPage {
    fn visit_page(&self, error: &AuthorizationError) -> io::Result<()> {
        let url = visit_url(error)?;
        let mut stderr = io::stderr().lock();
        writeln!(stderr, "Authentication required. Visit this URL to continue:")?;
        writeln!(stderr, "  {url}")?;
        debug!(url = %url, "printed interaction page URL");
        Ok(())
    }
}

fn visit_url(error: &AuthorizationError) -> io::Result<&str> {
    error
        .info
        .visit_url()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "error carries no visit URL"))
}

#[cfg(target_os = "macos")]
fn opener_command(url: &str) -> Command {
    let mut command = Command::new("open");
    command.arg(url);
    command
}

#[cfg(target_os = "windows")]
fn opener_command(url: &str) -> Command {
    let mut command = Command::new("cmd");
    command.args(["/C", "start", "", url]);
    command
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn opener_command(url: &str) -> Command {
    let mut command = Command::new("xdg-open");
    command.arg(url);
    command
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::protocol::ErrorInfo;

    #[test]
    fn test_print_visit_page_requires_url() {
        let error = AuthorizationError::default();
        let result = PrintVisitPage.visit_page(&error);
        assert_eq!(
            result.map_err(|e| e.kind()),
            Err(io::ErrorKind::InvalidInput)
        );
    }

    #[test]
    fn test_print_visit_page_accepts_legacy_url() {
        let error = AuthorizationError {
            info: ErrorInfo {
                legacy_visit_url: Some("http://example.com/visit".to_string()),
                ..ErrorInfo::default()
            },
            ..AuthorizationError::default()
        };
        assert!(PrintVisitPage.visit_page(&error).is_ok());
    }

    #[test]
    fn test_opener_command_passes_url() {
        let command = opener_command("http://example.com/visit");
        let args: Vec<_> = command.get_args().collect();
        assert!(args.iter().any(|arg| *arg == "http://example.com/visit"));
    }

    #[cfg(unix)]
    #[test]
    fn test_spawned_opener_is_reaped() {
        let handle = spawn_reaped(Command::new("true")).unwrap();
        let status = handle.join().unwrap();
        assert!(status.is_some_and(|status| status.success()));
    }

    #[test]
    fn test_missing_opener_reports_spawn_error() {
        let result = spawn_reaped(Command::new("bakery-no-such-opener"));
        assert_eq!(
            result.map(|_| ()).map_err(|e| e.kind()),
            Err(io::ErrorKind::NotFound)
        );
    }
}
