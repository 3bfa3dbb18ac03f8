//! Loopback helpers for tests that need real sockets.
//!
//! Sandboxes without loopback networking skip these tests instead of failing.

use std::net::TcpListener;

use wiremock::MockServer;

fn bind_loopback() -> Option<TcpListener> {
    match TcpListener::bind("127.0.0.1:0") {
        Ok(listener) => Some(listener),
        Err(error) => {
            eprintln!("skipping socket-bound test: cannot bind 127.0.0.1 ({error})");
            None
        }
    }
}

/// Starts a mock server, or `None` when loopback sockets are unavailable.
pub async fn mock_server_or_skip() -> Option<MockServer> {
    bind_loopback()?;
    Some(MockServer::start().await)
}

/// A loopback port nothing listens on, or `None` when sockets are unavailable.
pub fn closed_loopback_port() -> Option<u16> {
    let listener = bind_loopback()?;
    listener.local_addr().ok().map(|address| address.port())
}
