//! CLI entry point for the bakery client.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use bakery_client::storage::default_store_path;
use bakery_client::transport::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use bakery_client::{
    BakeryClient, BrowserVisitPage, CredentialStore, FileStore, JarCookieSetter, PrintVisitPage,
    ProtocolVersion, RequestHeaders, ReqwestTransport, VisitPage,
};
use clap::Parser;
use tracing::{debug, info};

mod app_config;
mod cli;

use app_config::FileConfig;
use cli::{Args, Command, CredentialsCommand, RequestArgs};

const COOKIE_NAME_PREFIX: &str = "macaroon-";

/// Effective settings after merging the config file with CLI flags.
#[derive(Debug)]
struct Settings {
    protocol_version: ProtocolVersion,
    discharge: bool,
    store_path: PathBuf,
    connect_timeout_secs: u64,
    read_timeout_secs: u64,
    cookie_service: Option<String>,
    services: BTreeMap<String, String>,
    headless: bool,
}

impl Settings {
    fn resolve(args: &Args, file: FileConfig) -> Result<Self> {
        let store_path = match args.store.clone().or(file.store_path) {
            Some(path) => path,
            None => default_store_path().context("Failed to locate credential file")?,
        };

        // CLI mappings override file mappings with the same name.
        let mut services = file.services;
        services.extend(args.services.iter().cloned());

        Ok(Self {
            protocol_version: args
                .protocol_version
                .or(file.protocol_version)
                .unwrap_or(ProtocolVersion::LATEST),
            discharge: !args.no_discharge && file.discharge.unwrap_or(true),
            store_path,
            connect_timeout_secs: file.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS),
            read_timeout_secs: file.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS),
            cookie_service: file.cookie_service,
            services,
            headless: args.headless,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (warn)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let loaded = app_config::load_default_file_config()?;
    if let Some(path) = loaded.path.as_deref()
        && loaded.config.is_some()
    {
        debug!(path = %path.display(), "loaded config file");
    }
    let settings = Settings::resolve(&args, loaded.config.unwrap_or_default())?;
    debug!(?settings, "effective settings");

    match &args.command {
        Command::Request(request) => run_request(&settings, request).await,
        Command::Credentials { command } => run_credentials(&settings, command),
    }
}

fn build_storage(settings: &Settings, transport: Option<&ReqwestTransport>) -> Result<CredentialStore> {
    let mut builder = CredentialStore::builder(Arc::new(FileStore::new(&settings.store_path)))
        .services(settings.services.clone());

    if let Some(cookie_service) = &settings.cookie_service {
        builder = builder.cookie_service(cookie_service.clone());
        if let (Some(transport), Some(prefix)) = (transport, settings.services.get(cookie_service)) {
            let setter = JarCookieSetter::new(
                transport.cookie_jar(),
                prefix,
                format!("{COOKIE_NAME_PREFIX}{cookie_service}"),
            )
            .with_context(|| format!("Invalid URL prefix for cookie service '{cookie_service}'"))?;
            builder = builder.cookie_setter(Arc::new(setter));
        }
    }

    Ok(builder.build())
}

async fn run_request(settings: &Settings, request: &RequestArgs) -> Result<()> {
    let transport =
        ReqwestTransport::with_timeouts(settings.connect_timeout_secs, settings.read_timeout_secs)
            .context("Failed to build HTTP client")?;
    let storage = build_storage(settings, Some(&transport))?;
    let visit_page: Arc<dyn VisitPage> = if settings.headless {
        Arc::new(PrintVisitPage)
    } else {
        Arc::new(BrowserVisitPage)
    };

    let mut builder = BakeryClient::builder(Arc::new(transport), storage)
        .protocol_version(settings.protocol_version)
        .visit_page(visit_page)
        .on_discharge(|url| info!(url = %url, "stored discharged macaroons"));
    if !settings.discharge {
        builder = builder.without_discharge();
    }
    let client = builder.build();

    let headers: RequestHeaders = request
        .headers
        .iter()
        .map(|(name, value)| (name.clone(), value.as_str().into()))
        .collect();

    let response = client
        .send_request(&request.url, &request.method, headers, request.body.clone())
        .await
        .with_context(|| format!("{} {} failed", request.method.to_uppercase(), request.url))?;

    info!(status = response.status, "request complete");
    eprintln!("HTTP {}", response.status);
    let mut stdout = io::stdout().lock();
    stdout.write_all(response.body.as_bytes())?;
    if !response.body.ends_with('\n') {
        writeln!(stdout)?;
    }
    Ok(())
}

fn run_credentials(settings: &Settings, command: &CredentialsCommand) -> Result<()> {
    let storage = build_storage(settings, None)?;
    match command {
        CredentialsCommand::Key { url } => {
            println!("{}", storage.key_for(url));
        }
        CredentialsCommand::Get { url } => {
            let Some(value) = storage.get(url)? else {
                bail!("No credential stored for service '{}'", storage.key_for(url));
            };
            println!("{value}");
        }
        CredentialsCommand::Set { url, value } => {
            storage.set(url, value)?;
            info!(key = %storage.key_for(url), "credential stored");
        }
        CredentialsCommand::Remove { url } => {
            storage.remove(url)?;
            info!(key = %storage.key_for(url), "credential removed");
        }
    }
    Ok(())
}
