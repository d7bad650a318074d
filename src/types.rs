//! Configuration types shared across the crate
//!
//! [`WorkspaceConfig`] describes the on-disk layout of one workspace: where
//! nodes and templates live, which extension documents use, how composite
//! documents are marked and how the hierarchy is shaped. Every field has a
//! default matching the course-notes layout, and a workspace may override any
//! of them with a `cman.json` file in its root.
//!
//! ```rust
//! use cman::types::WorkspaceConfig;
//!
//! let config: WorkspaceConfig = serde_json::from_str(r#"{
//!     "document_extension": "md",
//!     "levels": [{ "name": "folder" }, { "name": "doc" }]
//! }"#).unwrap();
//! assert_eq!(config.hierarchy.len(), 2);
//! assert_eq!(config.sidecar_name, "info.json");
//! ```

use crate::error::{CmanError, Result};
use crate::hierarchy::GroupHierarchy;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the optional per-workspace config file
pub const WORKSPACE_CONFIG_FILE: &str = "cman.json";

/// Text protocol of composite documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeConfig {
    /// Line identifying a document as a container's composite document
    pub tag: String,
    /// Line after which the managed include lines start
    pub marker: String,
    /// Text before the included path
    pub include_prefix: String,
    /// Text after the included path
    pub include_suffix: String,
    /// Separator between the include and the trailing title tag
    pub tag_separator: String,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            tag: "% COMPOSITE".to_string(),
            marker: "% INPUT".to_string(),
            include_prefix: "\\input{".to_string(),
            include_suffix: "}".to_string(),
            tag_separator: " % ".to_string(),
        }
    }
}

/// Layout and behavior of one workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Workspace root; not persisted, set by the caller
    #[serde(skip)]
    pub root: PathBuf,
    /// Directory under the root holding the top-level node directory
    pub data_dir: PathBuf,
    /// Directory under the root holding structural templates
    pub templates_dir: PathBuf,
    /// Extension of leaf and composite documents, without the dot
    pub document_extension: String,
    /// File name of the sidecar identity document in each container
    pub sidecar_name: String,
    /// Delimiter wrapping placeholder names in templates
    pub placeholder_delimiter: String,
    /// Composite document protocol
    pub composite: CompositeConfig,
    /// Glob patterns of entry names the reconciler skips
    pub ignore: Vec<String>,
    /// Hierarchy levels
    #[serde(rename = "levels")]
    pub hierarchy: GroupHierarchy,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            data_dir: PathBuf::from("data"),
            templates_dir: PathBuf::from("data/templates"),
            document_extension: "tex".to_string(),
            sidecar_name: "info.json".to_string(),
            placeholder_delimiter: "%%".to_string(),
            composite: CompositeConfig::default(),
            ignore: Vec::new(),
            hierarchy: GroupHierarchy::default(),
        }
    }
}

impl WorkspaceConfig {
    /// Default layout rooted at `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Load `cman.json` from `root` if it exists, otherwise use defaults
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(WORKSPACE_CONFIG_FILE);
        let mut config = if path.exists() {
            debug!("Loading workspace config from {:?}", path);
            let text = fs::read_to_string(&path)?;
            serde_json::from_str::<Self>(&text)?
        } else {
            Self::default()
        };
        config.root = root.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    /// Check the settings for values that would break the layout
    pub fn validate(&self) -> Result<()> {
        if self.document_extension.is_empty() || self.document_extension.contains('.') {
            return Err(CmanError::InvalidConfiguration(format!(
                "document extension '{}' must be non-empty and without dots",
                self.document_extension
            )));
        }
        if self.placeholder_delimiter.is_empty() {
            return Err(CmanError::InvalidConfiguration(
                "placeholder delimiter must not be empty".to_string(),
            ));
        }
        let composite = &self.composite;
        if composite.marker.trim().is_empty() || composite.tag.trim().is_empty() {
            return Err(CmanError::InvalidConfiguration(
                "composite tag and marker must not be blank".to_string(),
            ));
        }
        if composite.marker.trim() == composite.tag.trim() {
            return Err(CmanError::InvalidConfiguration(
                "composite tag and marker must differ".to_string(),
            ));
        }
        if composite.include_prefix.trim().is_empty() || composite.tag_separator.is_empty() {
            return Err(CmanError::InvalidConfiguration(
                "include prefix and tag separator must not be empty".to_string(),
            ));
        }
        self.ignore_set()?;
        Ok(())
    }

    /// Directory holding the top-level nodes
    pub fn top_dir(&self) -> PathBuf {
        let level = self.hierarchy.directory_at(0).unwrap_or_default();
        self.root.join(&self.data_dir).join(level)
    }

    /// Absolute templates directory
    pub fn template_dir(&self) -> PathBuf {
        self.root.join(&self.templates_dir)
    }

    /// Directory holding the nodes at `depth` below a parent
    ///
    /// `parent_path` is `None` for depth 0.
    pub fn children_dir(&self, parent_path: Option<&Path>, depth: usize) -> PathBuf {
        match parent_path {
            Some(parent) => parent.join(self.hierarchy.directory_at(depth).unwrap_or_default()),
            None => self.top_dir(),
        }
    }

    /// Path of a new node with `title` at `depth`
    pub fn node_path(&self, parent_path: Option<&Path>, depth: usize, title: &str) -> PathBuf {
        let dir = self.children_dir(parent_path, depth);
        if self.hierarchy.is_leaf(depth) {
            dir.join(format!("{}.{}", title, self.document_extension))
        } else {
            dir.join(title)
        }
    }

    /// Compiled ignore patterns
    pub fn ignore_set(&self) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.ignore {
            let glob = Glob::new(pattern)
                .map_err(|e| CmanError::InvalidPattern(format!("{}: {}", pattern, e)))?;
            builder.add(glob);
        }
        builder
            .build()
            .map_err(|e| CmanError::InvalidPattern(e.to_string()))
    }
}
