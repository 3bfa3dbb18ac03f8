//! Configuration file loading for CLI defaults.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use bakery_client::ProtocolVersion;

const SERVICE_KEY_PREFIX: &str = "service.";

/// File configuration for `bakery` defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Advertised bakery protocol version.
    pub protocol_version: Option<ProtocolVersion>,
    /// Whether discharge demands are resolved.
    pub discharge: Option<bool>,
    /// Credential file location.
    pub store_path: Option<PathBuf>,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// Read timeout in seconds.
    pub read_timeout_secs: Option<u64>,
    /// Service whose credential is mirrored into a cookie.
    pub cookie_service: Option<String>,
    /// Service name to URL prefix.
    pub services: BTreeMap<String, String>,
}

impl FileConfig {
    /// Validates config values against runtime constraints.
    pub fn validate(&self) -> Result<()> {
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        for (name, prefix) in &self.services {
            if prefix.is_empty() {
                bail!("Invalid config value for `service.{name}`: URL prefix must not be empty");
            }
        }
        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/bakery/config.toml`
/// 2. `$HOME/.config/bakery/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("bakery")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("bakery")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from the default path if present.
pub fn load_default_file_config() -> Result<LoadedConfig> {
    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(load_file_config(path_ref)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

/// Loads and validates the config file at `path`.
pub fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_number = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_number}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();

        match key {
            "protocol_version" => {
                let parsed = parse_protocol_version(value).with_context(|| {
                    format!("Invalid `protocol_version` value on line {line_number}")
                })?;
                cfg.protocol_version = Some(parsed);
            }
            "discharge" => {
                let parsed = parse_boolean(value)
                    .with_context(|| format!("Invalid `discharge` value on line {line_number}"))?;
                cfg.discharge = Some(parsed);
            }
            "store_path" => {
                let parsed = parse_string_literal(value)
                    .with_context(|| format!("Invalid `store_path` value on line {line_number}"))?;
                cfg.store_path = Some(PathBuf::from(parsed));
            }
            "connect_timeout_secs" => {
                let parsed = parse_integer_u64(value).with_context(|| {
                    format!("Invalid `connect_timeout_secs` value on line {line_number}")
                })?;
                cfg.connect_timeout_secs = Some(parsed);
            }
            "read_timeout_secs" => {
                let parsed = parse_integer_u64(value).with_context(|| {
                    format!("Invalid `read_timeout_secs` value on line {line_number}")
                })?;
                cfg.read_timeout_secs = Some(parsed);
            }
            "cookie_service" => {
                let parsed = parse_string_literal(value).with_context(|| {
                    format!("Invalid `cookie_service` value on line {line_number}")
                })?;
                cfg.cookie_service = Some(parsed);
            }
            service_key if service_key.starts_with(SERVICE_KEY_PREFIX) => {
                let name = &service_key[SERVICE_KEY_PREFIX.len()..];
                if name.is_empty() {
                    bail!("Missing service name in `{service_key}` on line {line_number}");
                }
                let prefix = parse_string_literal(value).with_context(|| {
                    format!("Invalid `{service_key}` value on line {line_number}")
                })?;
                cfg.services.insert(name.to_string(), prefix);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_number}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

// Accepts a bare integer (`2`) or a quoted label (`"v2"`).
fn parse_protocol_version(raw_value: &str) -> Result<ProtocolVersion> {
    let token = if raw_value.starts_with('"') {
        parse_string_literal(raw_value)?
    } else {
        raw_value.to_string()
    };
    Ok(token.parse::<ProtocolVersion>()?)
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}
