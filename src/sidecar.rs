//! Identity document stored inside every container directory
//!
//! The sidecar records the node's title, group and id. Titles on disk are
//! directory names for the top level only; deeper containers take their
//! title from here, which is what lets a title contain characters the
//! directory name was sanitized from.

use crate::error::{CmanError, Result};
use crate::node::NodeId;
use crate::utils::atomic_write;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::trace;

/// Contents of a container's sidecar file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sidecar {
    /// Display title of the container
    pub title: String,
    /// Level name
    pub group: String,
    /// Stable identifier
    pub id: NodeId,
}

impl Sidecar {
    /// Create a sidecar record
    pub fn new(title: impl Into<String>, group: impl Into<String>, id: NodeId) -> Self {
        Self {
            title: title.into(),
            group: group.into(),
            id,
        }
    }

    /// Read a sidecar file
    ///
    /// # Errors
    ///
    /// [`CmanError::SidecarRead`] if the file is unreadable, not JSON, or
    /// lacks one of the three fields.
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| CmanError::SidecarRead {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| CmanError::SidecarRead {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Write the sidecar, keeping any unrelated keys already in the file
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut object = match fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            },
            Err(_) => Map::new(),
        };

        object.insert("title".to_string(), Value::String(self.title.clone()));
        object.insert("group".to_string(), Value::String(self.group.clone()));
        object.insert("id".to_string(), Value::String(self.id.to_string()));

        let content = serde_json::to_string_pretty(&Value::Object(object))?;
        atomic_write(path, content.as_bytes())?;
        trace!("Wrote sidecar {:?}", path);
        Ok(())
    }
}
