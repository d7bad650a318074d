//! Key/value store for user-level settings
//!
//! The workspace keeps two kinds of values outside the data tree: the root
//! directory (`root-dir`) and the current selection (`current-<level>`). Both
//! go through the [`ConfigStore`] trait so the cursor can be tested against
//! [`MemoryConfigStore`] while the binary uses [`JsonConfigStore`].

use crate::error::{CmanError, Result};
use crate::utils::atomic_write;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Key holding the workspace root directory
pub const ROOT_DIR_KEY: &str = "root-dir";

/// String key/value store
pub trait ConfigStore: std::fmt::Debug {
    /// Value stored under `key`
    ///
    /// # Errors
    ///
    /// [`CmanError::ConfigKeyNotFound`] when the key is absent; any other
    /// error means the store itself is unusable.
    fn get(&self, key: &str) -> Result<String>;

    /// Store `value` under `key`, replacing any previous value
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

/// Store kept in memory only
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
    values: BTreeMap<String, String>,
}

impl MemoryConfigStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, key: &str) -> Result<String> {
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| CmanError::ConfigKeyNotFound(key.to_string()))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store backed by a flat JSON object in a file
///
/// The file is read on every access and rewritten on every `set`, so edits
/// made by hand between two calls are picked up.
#[derive(Debug, Clone)]
pub struct JsonConfigStore {
    path: PathBuf,
}

impl JsonConfigStore {
    /// Use the file at `path`; it is created on the first `set`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$XDG_CONFIG_HOME/cman/config.json`, falling back to `~/.config/cman/config.json`
    pub fn default_path() -> Result<PathBuf> {
        let base = match env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => env::var_os("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .ok_or_else(|| CmanError::store("neither XDG_CONFIG_HOME nor HOME is set"))?,
        };
        Ok(base.join("cman").join("config.json"))
    }

    /// Store at [`default_path`](Self::default_path)
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(Self::default_path()?))
    }

    /// File backing the store
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_object(&self) -> Result<Option<Map<String, Value>>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CmanError::store(format!("{:?}: {}", self.path, e))),
        };
        if text.trim().is_empty() {
            return Ok(Some(Map::new()));
        }
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(Some(map)),
            Ok(_) => Err(CmanError::store(format!(
                "{:?} does not contain a JSON object",
                self.path
            ))),
            Err(e) => Err(CmanError::store(format!("{:?}: {}", self.path, e))),
        }
    }
}

impl ConfigStore for JsonConfigStore {
    fn get(&self, key: &str) -> Result<String> {
        let map = self
            .read_object()?
            .ok_or_else(|| CmanError::ConfigKeyNotFound(key.to_string()))?;
        match map.get(key) {
            Some(Value::String(value)) => Ok(value.clone()),
            Some(other) => Err(CmanError::store(format!(
                "value of '{}' is not a string: {}",
                key, other
            ))),
            None => Err(CmanError::ConfigKeyNotFound(key.to_string())),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut map = self.read_object()?.unwrap_or_default();
        map.insert(key.to_string(), Value::String(value.to_string()));

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&Value::Object(map))?;
        atomic_write(&self.path, content.as_bytes())?;
        trace!("Set '{}' in {:?}", key, self.path);
        Ok(())
    }
}
