//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use bakery_client::ProtocolVersion;
use clap::{Args as ClapArgs, Parser, Subcommand};

/// Send HTTP requests authenticated with macaroons.
///
/// Stored credentials are attached per service and interactive login
/// demands are followed through the visit/wait handshake.
#[derive(Parser, Debug)]
#[command(name = "bakery")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Bakery protocol version to advertise (1 or 2)
    #[arg(long, global = true)]
    pub protocol_version: Option<ProtocolVersion>,

    /// Return discharge demands as errors instead of resolving them
    #[arg(long, global = true)]
    pub no_discharge: bool,

    /// Credential file (default: ~/.config/bakery/credentials.json)
    #[arg(long, global = true, value_name = "PATH")]
    pub store: Option<PathBuf>,

    /// Map a service name to a URL prefix (repeatable)
    #[arg(long = "service", global = true, value_name = "NAME=PREFIX", value_parser = parse_service)]
    pub services: Vec<(String, String)>,

    /// Print the interaction URL instead of opening a browser
    #[arg(long, global = true)]
    pub headless: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send an authenticated request and print the response
    Request(RequestArgs),

    /// Inspect or edit stored credentials
    Credentials {
        #[command(subcommand)]
        command: CredentialsCommand,
    },
}

/// Arguments of `bakery request`.
#[derive(ClapArgs, Debug)]
pub struct RequestArgs {
    /// HTTP method (GET, POST, PUT, PATCH, DELETE, HEAD)
    pub method: String,

    /// Target URL
    pub url: String,

    /// Extra request header as "Name: value" (repeatable)
    #[arg(short = 'H', long = "header", value_name = "HEADER", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Request body (ignored for GET, DELETE and HEAD)
    #[arg(short = 'd', long = "data", value_name = "BODY")]
    pub body: Option<String>,
}

/// Credential store subcommands.
#[derive(Subcommand, Debug)]
pub enum CredentialsCommand {
    /// Print the service key a URL maps to
    Key {
        /// Request URL
        url: String,
    },
    /// Print the credential stored for a URL's service
    Get {
        /// Request URL
        url: String,
    },
    /// Store a credential for a URL's service
    Set {
        /// Request URL
        url: String,
        /// Credential value (base64 of the macaroon JSON)
        value: String,
    },
    /// Remove the credential stored for a URL's service
    Remove {
        /// Request URL
        url: String,
    },
}

fn parse_service(raw: &str) -> Result<(String, String), String> {
    let Some((name, prefix)) = raw.split_once('=') else {
        return Err(format!("expected NAME=PREFIX, got '{raw}'"));
    };
    let (name, prefix) = (name.trim(), prefix.trim());
    if name.is_empty() || prefix.is_empty() {
        return Err(format!("expected NAME=PREFIX, got '{raw}'"));
    }
    Ok((name.to_string(), prefix.to_string()))
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let Some((name, value)) = raw.split_once(':') else {
        return Err(format!("expected 'Name: value', got '{raw}'"));
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("expected 'Name: value', got '{raw}'"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
