//! Bakery Client Library
//!
//! This library is a client for the macaroon bakery protocol. It issues HTTP
//! requests that are transparently authenticated: stored macaroons are attached
//! per service, third-party caveats are discharged automatically, and the
//! visit/wait interactive login handshake is driven when a server demands it.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`storage`] - Credential persistence keyed by logical service
//! - [`transport`] - HTTP request/response model and the reqwest transport
//! - [`protocol`] - Protocol versions, header names, and error classification
//! - [`macaroon`] - Seam to the macaroon cryptography library
//! - [`client`] - The [`BakeryClient`] orchestrator (dispatch, discharge, interaction)
//! - [`platform`] - Visit-page and legacy cookie adapters
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bakery_client::{BakeryClient, CredentialStore, InMemoryStore, ReqwestTransport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(ReqwestTransport::new()?);
//! let storage = CredentialStore::builder(Arc::new(InMemoryStore::new()))
//!     .service("charmstore", "https://api.example.com/charmstore")
//!     .build();
//! let client = BakeryClient::builder(transport, storage).build();
//!
//! let response = client.get("https://api.example.com/charmstore/v5/whoami").await?;
//! println!("HTTP {}: {}", response.status, response.body);
//! # Ok(())
//! # }
//! ```

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod macaroon;
pub mod platform;
pub mod protocol;
pub mod storage;
pub mod transport;
mod user_agent;

// Re-export commonly used types
pub use client::{
    BakeryClient, BakeryClientBuilder, BakeryError, DEFAULT_MAX_REMEDIATIONS, MAX_WAIT_ATTEMPTS,
    RetryState,
};
pub use macaroon::{DischargeAcquirer, Macaroon, MacaroonLibrary};
pub use platform::{BrowserVisitPage, CookieSetter, PrintVisitPage, VisitPage};
pub use protocol::{AuthOutcome, AuthorizationError, ErrorInfo, ProtocolError, ProtocolVersion};
pub use storage::{
    CredentialStore, CredentialStoreBuilder, FileStore, InMemoryStore, KeyValueStore, StoreError,
};
pub use transport::{
    HeaderValue, HttpRequest, HttpResponse, JarCookieSetter, RequestHeaders, ReqwestTransport,
    Transport, TransportError,
};
