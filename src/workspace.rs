//! Workspace: the forest, the cursor and the on-disk tree tied together
//!
//! A [`Workspace`] owns the in-memory [`Forest`], the selection [`Cursor`] and
//! the layout in [`WorkspaceConfig`]. Opening one rebuilds the forest from
//! disk and brings every composite document up to date; afterwards every
//! mutation goes through the workspace so disk, forest and selection change
//! together.

use crate::composite::{CompositeSynchronizer, SyncReport};
use crate::config::{ConfigStore, MemoryConfigStore};
use crate::cursor::{Cursor, Validation};
use crate::error::{CmanError, Result};
use crate::hierarchy::GroupHierarchy;
use crate::node::{Forest, Node, NodeId, NodeRef};
use crate::reconcile::{ReconcileReport, TreeReconciler};
use crate::template::{default_templates, TemplateApplier};
use crate::types::WorkspaceConfig;
use crate::utils::write_file_if_missing;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// A course-notes workspace rooted at one directory
///
/// # Examples
///
/// ```rust,no_run
/// use cman::{JsonConfigStore, Workspace};
/// use std::path::PathBuf;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = JsonConfigStore::open_default()?;
/// let mut workspace = Workspace::open(PathBuf::from("./notes"), Box::new(store))?;
///
/// workspace.select("semester", "WS24")?;
/// workspace.create("course", "Algebra")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Workspace {
    config: WorkspaceConfig,
    forest: Forest,
    cursor: Cursor,
    last_reconcile: ReconcileReport,
    last_sync: SyncReport,
}

impl Workspace {
    /// Open an existing workspace
    ///
    /// Equivalent to `WorkspaceBuilder::new(root).store(store).build()`.
    pub fn open(root: PathBuf, store: Box<dyn ConfigStore>) -> Result<Self> {
        WorkspaceBuilder::new(root).store(store).build()
    }

    /// Create the workspace directories and default templates, then open it
    ///
    /// Existing templates are left untouched, so running this on an existing
    /// workspace only fills in what is missing.
    pub fn init(root: PathBuf, store: Box<dyn ConfigStore>) -> Result<Self> {
        WorkspaceBuilder::new(root).store(store).init()
    }

    /// Layout of this workspace
    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Hierarchy levels
    pub fn hierarchy(&self) -> &GroupHierarchy {
        &self.config.hierarchy
    }

    /// All nodes
    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    /// Selection state
    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Mutable selection state, for direct access to the config store
    pub fn cursor_mut(&mut self) -> &mut Cursor {
        &mut self.cursor
    }

    /// Report of the latest tree reconciliation
    pub fn reconcile_report(&self) -> &ReconcileReport {
        &self.last_reconcile
    }

    /// Report of the latest composite synchronization
    pub fn sync_report(&self) -> &SyncReport {
        &self.last_sync
    }

    /// Apply what changed on disk since the last pass
    ///
    /// New directories and documents are attached; nodes whose path is gone
    /// are dropped from the forest, subtree included.
    pub fn reconcile(&mut self) -> Result<&ReconcileReport> {
        self.last_reconcile = TreeReconciler::new(&self.config)?.reconcile(&mut self.forest);
        Ok(&self.last_reconcile)
    }

    /// Rewrite every composite document that is out of date
    pub fn sync_composites(&mut self) -> &SyncReport {
        self.last_sync = CompositeSynchronizer::new(&self.config).reconcile_all(&self.forest);
        &self.last_sync
    }

    /// Follow a chain of titles from the top level down
    pub fn resolve_titles<S: AsRef<str>>(&self, titles: &[S]) -> Option<NodeRef> {
        self.forest.resolve_titles(titles)
    }

    /// Stored selection at a depth
    pub fn current(&self, depth: usize) -> Result<Option<String>> {
        self.cursor.get(depth)
    }

    /// Check how far the stored selection resolves
    pub fn validate_selection(&self) -> Result<Validation> {
        self.cursor.validate(&self.forest)
    }

    /// Select `title` in `group` (name or alias) under the current selection
    pub fn select(&mut self, group: &str, title: &str) -> Result<NodeRef> {
        let depth = self.config.hierarchy.require(group)?;
        self.cursor.select(&self.forest, depth, title)
    }

    /// Node titled `title` in `group` under the current selection
    pub fn find(&self, group: &str, title: &str) -> Result<NodeRef> {
        let depth = self.config.hierarchy.require(group)?;
        let parent = self.cursor.parent_for(&self.forest, depth)?;
        self.forest
            .find_child(parent, title)
            .ok_or_else(|| CmanError::NodeNotFound(format!("{} '{}'", group, title)))
    }

    /// Create a node in `group` under the current selection of the level above
    ///
    /// # Errors
    ///
    /// [`CmanError::SelectionIncomplete`] if the selection does not reach the
    /// level above `group`, plus everything [`create_under`](Self::create_under)
    /// returns.
    pub fn create(&mut self, group: &str, title: &str) -> Result<NodeRef> {
        let depth = self.config.hierarchy.require(group)?;
        let parent = self.cursor.parent_for(&self.forest, depth)?;
        self.create_under(parent, title)
    }

    /// Create a node one level below `parent` (or at the top level for `None`)
    ///
    /// Materializes the level's template, attaches the node, adds it to the
    /// parent's composite document and selects it. Nothing existing is
    /// overwritten. A failure after files were created leaves them in place;
    /// the error names the node and path.
    #[instrument(skip(self))]
    pub fn create_under(&mut self, parent: Option<NodeRef>, title: &str) -> Result<NodeRef> {
        let (depth, parent_path) = match parent {
            Some(p) => {
                let node = self.forest.node(p)?;
                let depth = self.config.hierarchy.child_depth(node.depth()).ok_or_else(|| {
                    CmanError::internal(format!(
                        "{} '{}' is a document and cannot have children",
                        node.group(),
                        node.title()
                    ))
                })?;
                (depth, Some(node.path().to_path_buf()))
            }
            None => (0, None),
        };
        let group = self
            .config
            .hierarchy
            .name_at(depth)
            .unwrap_or_default()
            .to_string();
        let path = self.config.node_path(parent_path.as_deref(), depth, title);

        let node = self
            .materialize(parent, parent_path.as_deref(), depth, &group, title, &path)
            .map_err(|e| e.for_node("create", &group, title, &path))?;
        info!("Created {} '{}' at {:?}", group, title, path);
        Ok(node)
    }

    fn materialize(
        &mut self,
        parent: Option<NodeRef>,
        parent_path: Option<&Path>,
        depth: usize,
        group: &str,
        title: &str,
        path: &Path,
    ) -> Result<NodeRef> {
        if self.forest.find_child(parent, title).is_some() {
            return Err(CmanError::DuplicateTitle {
                group: group.to_string(),
                title: title.to_string(),
                parent: match parent.and_then(|p| self.forest.get(p)) {
                    Some(p) => format!("{} '{}'", p.group(), p.title()),
                    None => "root".to_string(),
                },
            });
        }

        let id = if self.config.hierarchy.is_leaf(depth) {
            NodeId::for_leaf(title)
        } else {
            NodeId::generate()
        };
        let node = self.forest.create_node(group, title, path, id)?;

        let node = match self.place(node, parent, parent_path, depth) {
            Ok(node) => node,
            Err(e) => {
                self.forest.remove(node)?;
                return Err(e);
            }
        };

        if let Some(parent) = parent {
            CompositeSynchronizer::new(&self.config).reconcile_children(&self.forest, parent)?;
        }
        self.cursor.select(&self.forest, depth, title)?;
        Ok(node)
    }

    /// Write the detached node to disk and attach it
    fn place(
        &mut self,
        node: NodeRef,
        parent: Option<NodeRef>,
        parent_path: Option<&Path>,
        depth: usize,
    ) -> Result<NodeRef> {
        fs::create_dir_all(self.config.children_dir(parent_path, depth))?;
        TemplateApplier::new(&self.config).apply(&self.forest, node, parent)?;
        self.forest.attach(node, parent)
    }

    /// Delete a node with its subtree from disk, the forest and the selection
    ///
    /// The include line in the parent's composite is removed first; a missing
    /// line is logged and does not stop the removal.
    #[instrument(skip(self))]
    pub fn remove(&mut self, node: NodeRef) -> Result<Vec<Node>> {
        let target = self.forest.node(node)?.clone();
        let (group, title, path) = (target.group(), target.title(), target.path());

        self.unlink(node, &target)
            .map_err(|e| e.for_node("remove", group, title, path))?;

        let removed = self.forest.remove(node)?;
        info!("Removed {} '{}' ({} node(s))", group, title, removed.len());
        Ok(removed)
    }

    fn unlink(&mut self, node: NodeRef, target: &Node) -> Result<()> {
        let was_selected = self
            .cursor
            .validate(&self.forest)?
            .resolved
            .get(target.depth())
            == Some(&node);

        if let Some(parent) = target.parent() {
            let sync = CompositeSynchronizer::new(&self.config);
            match sync.remove_by_title(&self.forest, parent, target.title()) {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    warn!("No include line for '{}' to remove: {}", target.title(), e)
                }
                Err(e) => return Err(e),
            }
        }

        let path = target.path();
        if path.is_dir() {
            fs::remove_dir_all(path)?;
        } else if path.exists() {
            fs::remove_file(path)?;
        } else {
            debug!("{:?} is already gone from disk", path);
        }

        if was_selected {
            self.cursor.clear_from(target.depth())?;
        }
        Ok(())
    }
}

/// Builder for opening a [`Workspace`]
///
/// # Examples
///
/// ```rust
/// use cman::{MemoryConfigStore, WorkspaceBuilder, WorkspaceConfig};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let dir = tempfile::tempdir()?;
/// let mut config = WorkspaceConfig::default();
/// config.ignore = vec!["*.bak".to_string()];
///
/// let workspace = WorkspaceBuilder::new(dir.path())
///     .store(Box::new(MemoryConfigStore::new()))
///     .config(config)
///     .init()?;
/// assert!(workspace.forest().is_empty());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct WorkspaceBuilder {
    root: PathBuf,
    store: Option<Box<dyn ConfigStore>>,
    config: Option<WorkspaceConfig>,
}

impl WorkspaceBuilder {
    /// Start a builder for the workspace at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            store: None,
            config: None,
        }
    }

    /// Config store holding the selection; defaults to an in-memory store
    pub fn store(mut self, store: Box<dyn ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use this layout instead of reading `cman.json`
    pub fn config(mut self, config: WorkspaceConfig) -> Self {
        self.config = Some(config);
        self
    }

    fn resolve_config(&mut self) -> Result<WorkspaceConfig> {
        match self.config.take() {
            Some(mut config) => {
                config.root = self.root.clone();
                config.validate()?;
                Ok(config)
            }
            None => WorkspaceConfig::load(&self.root),
        }
    }

    /// Create missing workspace directories and templates, then build
    #[instrument(skip(self), fields(root = ?self.root))]
    pub fn init(mut self) -> Result<Workspace> {
        let config = self.resolve_config()?;
        fs::create_dir_all(config.top_dir())?;
        fs::create_dir_all(config.template_dir())?;

        let mut written = 0;
        for (file, content) in default_templates(&config) {
            if write_file_if_missing(&config.template_dir().join(file), &content)? {
                written += 1;
            }
        }
        info!("Initialized workspace at {:?} ({} template(s) written)", config.root, written);

        self.config = Some(config);
        self.build()
    }

    /// Load the layout, rebuild the forest from disk and sync composites
    #[instrument(skip(self), fields(root = ?self.root))]
    pub fn build(mut self) -> Result<Workspace> {
        let config = self.resolve_config()?;
        let store = self
            .store
            .take()
            .unwrap_or_else(|| Box::new(MemoryConfigStore::new()));

        let mut forest = Forest::new(config.hierarchy.clone());
        let last_reconcile = TreeReconciler::new(&config)?.reconcile(&mut forest);
        let last_sync = CompositeSynchronizer::new(&config).reconcile_all(&forest);
        let cursor = Cursor::new(store, config.hierarchy.clone());

        debug!("Opened workspace with {} node(s)", forest.len());
        Ok(Workspace {
            config,
            forest,
            cursor,
            last_reconcile,
            last_sync,
        })
    }
}
