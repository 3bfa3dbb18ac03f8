//! JSON-file-backed [`KeyValueStore`].
//!
//! Credentials are written to:
//! `~/.config/bakery/credentials.json` (or `$XDG_CONFIG_HOME/bakery/credentials.json`).
//! The file holds one JSON object mapping service keys to credentials and is
//! readable by its owner only.

use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, instrument};

use super::{KeyValueStore, StoreError};

const STORE_FILE_NAME: &str = "credentials.json";
const APP_DIR_NAME: &str = "bakery";

/// Returns the default credential file path (`~/.config/bakery/credentials.json`).
///
/// # Errors
///
/// Returns [`StoreError::ConfigDirUnavailable`] if no usable config dir is found.
pub fn default_store_path() -> Result<PathBuf, StoreError> {
    Ok(default_config_dir()?.join(STORE_FILE_NAME))
}

/// Persistent [`KeyValueStore`] over a JSON file.
///
/// Every operation re-reads the file so separate processes sharing it see
/// each other's writes (last write wins). Writes go through a temporary file
/// and a rename.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Creates a store over `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Creates a store at [`default_store_path`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConfigDirUnavailable`] if no usable config dir is found.
    pub fn at_default_path() -> Result<Self, StoreError> {
        Ok(Self::new(default_store_path()?))
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_items(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(error) => Err(error.into()),
        }
    }

    fn write_items(&self, items: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let payload = serde_json::to_vec_pretty(items)?;
        let temp_path = self.path.with_extension("json.tmp");
        write_owner_only(&temp_path, &payload)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn update(
        &self,
        apply: impl FnOnce(&mut BTreeMap<String, String>) -> bool,
    ) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut items = self.read_items()?;
        if apply(&mut items) {
            self.write_items(&items)?;
        }
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(self.read_items()?.remove(key))
    }

    #[instrument(level = "debug", skip(self, value), fields(path = %self.path.display()))]
    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.update(|items| {
            items.insert(key.to_string(), value.to_string());
            true
        })?;
        debug!("credential file updated");
        Ok(())
    }

    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.update(|items| items.remove(key).is_some())
    }
}

fn default_config_dir() -> Result<PathBuf, StoreError> {
    resolve_config_dir(
        sanitize_env_path(env::var_os("XDG_CONFIG_HOME")),
        sanitize_env_path(env::var_os("HOME")),
        sanitize_env_path(env::var_os("APPDATA")),
    )
}

fn sanitize_env_path(value: Option<OsString>) -> Option<PathBuf> {
    let value = value?;
    if value.to_string_lossy().trim().is_empty() {
        return None;
    }

    Some(PathBuf::from(value))
}

fn resolve_config_dir(
    xdg_config_home: Option<PathBuf>,
    home: Option<PathBuf>,
    app_data: Option<PathBuf>,
) -> Result<PathBuf, StoreError> {
    if let Some(xdg) = xdg_config_home {
        return Ok(xdg.join(APP_DIR_NAME));
    }
    if let Some(home) = home {
        return Ok(home.join(".config").join(APP_DIR_NAME));
    }
    if let Some(app_data) = app_data {
        return Ok(app_data.join(APP_DIR_NAME));
    }

    Err(StoreError::ConfigDirUnavailable)
}

/// Writes `payload` to a freshly created file readable only by its owner.
///
/// A leftover file at `path` is removed first so its mode is never reused.
fn write_owner_only(path: &Path, payload: &[u8]) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(error) if error.kind() == ErrorKind::NotFound => {}
        Err(error) => return Err(error.into()),
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(payload)?;
    file.sync_all()?;
    Ok(())
}
