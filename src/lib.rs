//! # cman - Course notes manager
//!
//! A library for keeping a hierarchy of notes as nested directories and
//! LaTeX documents, with one aggregating document per directory that
//! includes its children.
//!
//! ## Overview
//!
//! cman maintains an N-level hierarchy (by default semester, course, chapter
//! and lecture) on disk and lets you:
//! - Create nodes from per-level templates, with placeholder substitution
//! - Rebuild the whole tree in memory from the directory layout at any time
//! - Keep every container's composite document including exactly its children
//! - Remember a current selection per level that cascades downwards
//!
//! ## Layout
//!
//! ```text
//! <root>/
//! ├── cman.json                       optional layout overrides
//! └── data/
//!     ├── templates/                  semester.json, course.json, lecture.tex, ...
//!     └── semester/
//!         └── WS24/
//!             ├── info.json           sidecar: title, group, id
//!             ├── semester.tex        composite document
//!             └── course/
//!                 └── Algebra/
//!                     └── ...
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cman::{JsonConfigStore, Workspace};
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = JsonConfigStore::open_default()?;
//! let mut workspace = Workspace::init(PathBuf::from("./notes"), Box::new(store))?;
//!
//! // Each creation selects the new node, so the next one goes below it
//! workspace.create("semester", "WS24")?;
//! workspace.create("course", "Algebra")?;
//! workspace.create("chapter", "Groups")?;
//! workspace.create("lecture", "Introduction")?;
//!
//! let validation = workspace.validate_selection()?;
//! println!("{:?}", validation.status);
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Concepts
//!
//! ### Nodes
//!
//! Every node belongs to one level ("group") and has a title unique among its
//! siblings and a stable id. Containers are directories carrying a sidecar
//! `info.json`; leaves are single documents. All nodes live in a [`Forest`]
//! owned by the caller.
//!
//! ### Composite documents
//!
//! Each container holds a document tagged `% COMPOSITE` with a `% INPUT`
//! marker line. The run of `\input{...}` lines after the marker is managed by
//! cman: one line per child, tagged with the child's title. Untagged include
//! lines and everything outside the run belong to the user.
//!
//! ### Selection
//!
//! The current title of each level is kept in a [`ConfigStore`] under
//! `current-<level>`. Selecting at one level clears all deeper levels.
//!
//! ## Error Handling
//!
//! All operations return `Result<T, CmanError>`. Failures while creating or
//! removing a node are wrapped with the node's group, title and path. Nothing
//! is rolled back; partially created files stay where they are.
//!
//! ## Module Organization
//!
//! - [`hierarchy`]: Level table
//! - [`node`]: Node arena
//! - [`template`]: Template loading and materialization
//! - [`reconcile`]: Rebuilding the forest from disk
//! - [`composite`]: Composite document synchronization
//! - [`cursor`]: Current selection
//! - [`config`]: Key/value config stores
//! - [`workspace`]: Orchestration
//! - [`types`]: Workspace layout configuration
//! - [`error`]: Error types and handling

// Public API modules
pub mod composite;
pub mod config;
pub mod cursor;
pub mod error;
pub mod hierarchy;
pub mod node;
pub mod reconcile;
pub mod sidecar;
pub mod template;
pub mod types;
pub mod workspace;

// Internal modules (not part of public API)
mod utils;

// Re-export main types for convenience
pub use composite::{CompositeSynchronizer, ManagedRegion, SyncOutcome, SyncReport};
pub use config::{ConfigStore, JsonConfigStore, MemoryConfigStore};
pub use cursor::{Cursor, SelectionStatus, Validation};
pub use error::{CmanError, Result};
pub use hierarchy::{GroupHierarchy, LevelSpec};
pub use node::{Forest, Node, NodeId, NodeRef};
pub use reconcile::{ReconcileReport, TreeReconciler};
pub use sidecar::Sidecar;
pub use template::{Placeholders, Template, TemplateApplier};
pub use types::*;
pub use workspace::{Workspace, WorkspaceBuilder};
