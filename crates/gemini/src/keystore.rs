//! File-backed storage for the user's Gemini API keys
//!
//! The settings file is a flat JSON object of string values keyed by storage
//! key, the same shape a browser's local storage has. The key list lives under
//! `gemini_api_keys` as a JSON-encoded array; installs that predate the key
//! pool stored a single key under `gemini_api_key`, which is migrated into a
//! one-element list the first time keys are read.
//!
//! All writes use atomic temp-file + rename. A tokio Mutex serializes
//! concurrent writes from the admin API.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::constants::{KEYS_STORAGE_KEY, LEGACY_KEY_STORAGE_KEY};
use crate::error::{Error, Result};

type Settings = BTreeMap<String, String>;

/// Thread-safe settings file manager for API keys.
pub struct KeyStore {
    path: PathBuf,
    state: Mutex<Settings>,
}

impl KeyStore {
    /// Open the settings file at `path`.
    ///
    /// If the file doesn't exist, creates it as `{}` (cold start with zero
    /// keys). The pool stays uninitialized until a key is added.
    pub async fn open(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading settings file: {e}")))?;
            let settings: Settings = serde_json::from_str(&contents)
                .map_err(|e| Error::SettingsParse(format!("parsing settings file: {e}")))?;
            info!(path = %path.display(), entries = settings.len(), "loaded settings");
            settings
        } else {
            info!(path = %path.display(), "settings file not found, starting with empty store");
            let settings = Settings::new();
            write_atomic(&path, &settings).await?;
            settings
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Read the persisted key list, migrating the legacy single-key entry.
    ///
    /// - `gemini_api_keys` holds a non-empty JSON array: those keys.
    /// - `gemini_api_keys` holds other valid JSON: no keys.
    /// - `gemini_api_keys` is missing or not valid JSON: fall back to the
    ///   legacy `gemini_api_key` string. When present it is rewritten as a
    ///   one-element list and the legacy entry is removed.
    pub async fn load_keys(&self) -> Result<Vec<String>> {
        let mut state = self.state.lock().await;

        if let Some(raw) = state.get(KEYS_STORAGE_KEY) {
            match serde_json::from_str::<serde_json::Value>(raw) {
                Ok(value) => return Ok(keys_from_value(value)),
                Err(e) => {
                    warn!(error = %e, "stored key list is not valid JSON, trying legacy key");
                }
            }
        }

        let Some(legacy) = state.get(LEGACY_KEY_STORAGE_KEY).cloned() else {
            return Ok(Vec::new());
        };

        let keys = vec![legacy];
        state.insert(KEYS_STORAGE_KEY.to_string(), encode_keys(&keys)?);
        state.remove(LEGACY_KEY_STORAGE_KEY);
        write_atomic(&self.path, &state).await?;
        info!("migrated legacy single API key into key list");
        Ok(keys)
    }

    /// Snapshot of the stored key list without running the legacy migration.
    pub async fn keys(&self) -> Vec<String> {
        let state = self.state.lock().await;
        stored_keys(&state)
    }

    /// Append a key and persist.
    ///
    /// Input is trimmed; empty input and keys already present are ignored.
    /// Returns the stored (trimmed) key when it was added.
    pub async fn save_key(&self, key: &str) -> Result<Option<String>> {
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let mut state = self.state.lock().await;
        let mut keys = stored_keys(&state);
        if keys.iter().any(|k| k == trimmed) {
            debug!("key already stored, ignoring");
            return Ok(None);
        }

        keys.push(trimmed.to_string());
        state.insert(KEYS_STORAGE_KEY.to_string(), encode_keys(&keys)?);
        write_atomic(&self.path, &state).await?;
        debug!(keys = keys.len(), "saved API key");
        Ok(Some(trimmed.to_string()))
    }

    /// Remove one key, or every key when `key` is `None`, and persist.
    ///
    /// Removing the last key deletes the storage entry entirely. Returns
    /// whether the stored list changed.
    pub async fn remove_key(&self, key: Option<&str>) -> Result<bool> {
        let mut state = self.state.lock().await;
        let before = stored_keys(&state);

        let remaining: Vec<String> = match key {
            Some(target) => before.iter().filter(|k| *k != target).cloned().collect(),
            None => Vec::new(),
        };
        if key.is_some() && remaining.len() == before.len() {
            return Ok(false);
        }

        if remaining.is_empty() {
            if state.remove(KEYS_STORAGE_KEY).is_none() {
                return Ok(false);
            }
        } else {
            state.insert(KEYS_STORAGE_KEY.to_string(), encode_keys(&remaining)?);
        }

        write_atomic(&self.path, &state).await?;
        debug!(keys = remaining.len(), "removed API key(s)");
        Ok(true)
    }

    /// Raw value of a storage entry.
    #[cfg(test)]
    async fn get(&self, storage_key: &str) -> Option<String> {
        self.state.lock().await.get(storage_key).cloned()
    }

    /// Set a raw storage entry and persist.
    #[cfg(test)]
    async fn set(&self, storage_key: &str, value: String) -> Result<()> {
        let mut state = self.state.lock().await;
        state.insert(storage_key.to_string(), value);
        write_atomic(&self.path, &state).await
    }
}

fn keys_from_value(value: serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Array(items) => {
            let total = items.len();
            let keys: Vec<String> = items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            if keys.len() < total {
                warn!(
                    skipped = total - keys.len(),
                    kept = keys.len(),
                    "stored key list has non-string entries, skipping them"
                );
            }
            keys
        }
        _ => Vec::new(),
    }
}

fn stored_keys(state: &Settings) -> Vec<String> {
    state
        .get(KEYS_STORAGE_KEY)
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(raw).ok())
        .map(keys_from_value)
        .unwrap_or_default()
}

fn encode_keys(keys: &[String]) -> Result<String> {
    serde_json::to_string(keys).map_err(|e| Error::SettingsParse(format!("encoding key list: {e}")))
}

/// Write settings to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 (owner read/write only) since
/// the file contains API keys.
async fn write_atomic(path: &Path, data: &Settings) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::SettingsParse(format!("serializing settings: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("settings path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".settings.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp settings file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting settings file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp settings file: {e}")))?;

    debug!(path = %path.display(), "persisted settings");
    Ok(())
}
