//! Error types for the cman library
//!
//! Every fallible operation in the crate returns [`Result<T>`], whose error
//! side is [`CmanError`]. Variants carry the path, group and title involved so
//! a failed creation or removal can be diagnosed and repaired by hand; no
//! operation rolls back what it already wrote.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the cman library
pub type Result<T> = std::result::Result<T, CmanError>;

/// Main error type for all cman operations
#[derive(Debug, Error)]
pub enum CmanError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Group name is not part of the hierarchy
    #[error("Unknown group: {0}")]
    UnknownGroup(String),

    /// Attaching a child whose depth is not exactly one below its parent
    #[error("Depth mismatch: {child_group} (depth {child_depth}) cannot be attached under {parent}")]
    DepthMismatch {
        /// Group of the node being attached
        child_group: String,
        /// Depth of the node being attached
        child_depth: usize,
        /// Description of the attachment point
        parent: String,
    },

    /// A sibling with the same title but another identity already exists
    #[error("A {group} titled '{title}' already exists under {parent}")]
    DuplicateTitle {
        /// Group of the conflicting node
        group: String,
        /// Conflicting title
        title: String,
        /// Title of the parent, or "root"
        parent: String,
    },

    /// Two sibling directories carry the same sidecar id
    #[error("Identifier {id} of {path:?} is already used by {existing:?}")]
    DuplicateId {
        /// Shared identifier
        id: String,
        /// Directory that was rejected
        path: PathBuf,
        /// Directory already holding the identifier
        existing: PathBuf,
    },

    /// Title cannot be used as a node name on disk
    #[error("Invalid title: {0:?}")]
    InvalidTitle(String),

    /// Node handle or title does not resolve to a live node
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Creation target already exists on disk
    #[error("Destination already exists: {0:?}")]
    DestinationExists(PathBuf),

    /// Template file could not be read
    #[error("Failed to read template {path:?}: {source}")]
    TemplateRead {
        /// Template or template source file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Template file is not a valid structural description
    #[error("Failed to parse template {path:?}: {reason}")]
    TemplateParse {
        /// Template file
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    /// Sidecar identity document is missing fields or malformed
    #[error("Invalid sidecar {path:?}: {reason}")]
    SidecarRead {
        /// Sidecar file
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    /// Container directory holds no composite document
    #[error("No composite document in {0:?}")]
    CompositeNotFound(PathBuf),

    /// Composite document lost its marker line
    #[error("Marker '{marker}' not found in {path:?}")]
    MarkerNotFound {
        /// Composite document
        path: PathBuf,
        /// Expected marker line
        marker: String,
    },

    /// No include line tagged with the title exists in the managed region
    #[error("No include entry for '{title}' in {path:?}")]
    EntryNotFound {
        /// Composite document
        path: PathBuf,
        /// Title that was looked up
        title: String,
    },

    /// Config store has no value for the key
    #[error("Config key not found: {0}")]
    ConfigKeyNotFound(String),

    /// Config store exists but cannot be used
    #[error("Config store error: {0}")]
    ConfigStore(String),

    /// Selected title is not a child of the current parent selection
    #[error("'{title}' is not a {group} of the current selection")]
    InvalidSelection {
        /// Group being selected
        group: String,
        /// Requested title
        title: String,
    },

    /// Selection above the requested level does not resolve
    #[error("No valid {group} is selected")]
    SelectionIncomplete {
        /// First group without a valid selection
        group: String,
    },

    /// Ignore pattern parsing error
    #[error("Invalid ignore pattern: {0}")]
    InvalidPattern(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Operation on a specific node failed
    #[error("Failed to {action} {group} '{title}' at {path:?}: {source}")]
    Node {
        /// What was being done ("create", "remove", ...)
        action: &'static str,
        /// Group of the node
        group: String,
        /// Title of the node
        title: String,
        /// Path of the node
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: Box<CmanError>,
    },

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CmanError {
    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        CmanError::Internal(msg.into())
    }

    /// Create a config store error with a custom message
    pub fn store(msg: impl Into<String>) -> Self {
        CmanError::ConfigStore(msg.into())
    }

    /// Wrap an error with the node it happened on
    pub fn for_node(
        self,
        action: &'static str,
        group: impl Into<String>,
        title: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        CmanError::Node {
            action,
            group: group.into(),
            title: title.into(),
            path: path.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, looking through node context wrappers
    pub fn root_cause(&self) -> &CmanError {
        match self {
            CmanError::Node { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Check if this error means "absent" rather than "broken"
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.root_cause(),
            CmanError::ConfigKeyNotFound(_)
                | CmanError::NodeNotFound(_)
                | CmanError::EntryNotFound { .. }
                | CmanError::CompositeNotFound(_)
        )
    }

    /// Check if this error indicates damaged on-disk structure
    pub fn is_structural(&self) -> bool {
        matches!(
            self.root_cause(),
            CmanError::MarkerNotFound { .. }
                | CmanError::CompositeNotFound(_)
                | CmanError::SidecarRead { .. }
                | CmanError::TemplateParse { .. }
                | CmanError::DuplicateId { .. }
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self.root_cause() {
            CmanError::MarkerNotFound { path, marker } => {
                format!(
                    "{:?} has no '{}' line. Restore the marker line so included documents can be managed.",
                    path, marker
                )
            }
            CmanError::DestinationExists(path) => {
                format!(
                    "{:?} already exists. Remove it or pick another title; nothing is overwritten.",
                    path
                )
            }
            CmanError::DuplicateId { path, existing, .. } => {
                format!(
                    "{:?} looks like a copy of {:?}. Give it a fresh id or delete its sidecar to have one written.",
                    path, existing
                )
            }
            CmanError::SelectionIncomplete { group } => {
                format!("No {} is selected. Run 'cman select {} <title>' first.", group, group)
            }
            CmanError::ConfigKeyNotFound(key) if key == "root-dir" => {
                "No root directory configured. Run 'cman --root <dir> init' first.".to_string()
            }
            _ => self.to_string(),
        }
    }
}
