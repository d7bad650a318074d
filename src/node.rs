//! In-memory node model
//!
//! All nodes of a workspace live in one [`Forest`], an arena owned by the
//! caller and passed by reference to every operation. A [`NodeRef`] is a
//! handle into that arena; a node's `parent` is a non-owning handle and its
//! `children` are owned by it, so removing a node removes its whole subtree.
//!
//! ## Invariants
//!
//! - `depth(node) == hierarchy.depth_of(node.group)`
//! - a child's depth is its parent's depth plus one; roots have depth 0
//! - a node is in `parent.children` iff its `parent` is `parent`
//! - titles are unique among the children of one parent
//!
//! All checks in [`Forest::attach`] run before anything is mutated, so a
//! failed attach leaves the forest as it was.

use crate::error::{CmanError, Result};
use crate::hierarchy::GroupHierarchy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use uuid::Uuid;

/// Namespace for identifiers derived from leaf file names
const LEAF_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_8d3e_2b7a_4c59_9e41_0d5a_37b2_c8f6);

/// Stable identifier of a node
///
/// Containers get a random id once, kept in their sidecar, so renaming the
/// title leaves it intact. Leaves have no sidecar; their id is derived from
/// the file stem and changes when the file is renamed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Fresh random identifier for a new container node
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Deterministic identifier of a leaf document with the given file stem
    pub fn for_leaf(stem: &str) -> Self {
        Self(Uuid::new_v5(&LEAF_ID_NAMESPACE, stem.as_bytes()).to_string())
    }

    /// Wrap an identifier read from disk
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to a node inside a [`Forest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef(usize);

/// One item at one level of the hierarchy
#[derive(Debug, Clone)]
pub struct Node {
    group: String,
    title: String,
    path: PathBuf,
    id: NodeId,
    depth: usize,
    parent: Option<NodeRef>,
    children: Vec<NodeRef>,
}

impl Node {
    /// Level name
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Title, unique among siblings
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Directory (container) or file (leaf) of this node
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stable identifier
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Depth derived from the group
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Parent handle, `None` for roots and detached nodes
    pub fn parent(&self) -> Option<NodeRef> {
        self.parent
    }

    /// Children in insertion order
    pub fn children(&self) -> &[NodeRef] {
        &self.children
    }
}

/// Arena of all nodes of one workspace
#[derive(Debug, Clone)]
pub struct Forest {
    hierarchy: GroupHierarchy,
    slots: Vec<Option<Node>>,
    roots: Vec<NodeRef>,
}

impl Forest {
    /// Create an empty forest for a hierarchy
    pub fn new(hierarchy: GroupHierarchy) -> Self {
        Self {
            hierarchy,
            slots: Vec::new(),
            roots: Vec::new(),
        }
    }

    /// Hierarchy the forest was built for
    pub fn hierarchy(&self) -> &GroupHierarchy {
        &self.hierarchy
    }

    /// Allocate a detached node
    ///
    /// # Errors
    ///
    /// - [`CmanError::UnknownGroup`] if `group` is not a hierarchy level
    /// - [`CmanError::InvalidTitle`] if `title` is blank or contains a path separator
    pub fn create_node(
        &mut self,
        group: &str,
        title: &str,
        path: impl Into<PathBuf>,
        id: NodeId,
    ) -> Result<NodeRef> {
        let depth = self
            .hierarchy
            .depth_of(group)
            .ok_or_else(|| CmanError::UnknownGroup(group.to_string()))?;
        validate_title(title)?;

        let node_ref = NodeRef(self.slots.len());
        self.slots.push(Some(Node {
            group: group.to_string(),
            title: title.to_string(),
            path: path.into(),
            id,
            depth,
            parent: None,
            children: Vec::new(),
        }));
        Ok(node_ref)
    }

    /// Attach a detached node under `parent`, or as a root when `parent` is `None`
    ///
    /// Returns the handle that now represents the node. When a sibling with
    /// the same id is already attached, the detached duplicate is discarded and
    /// the sibling's handle is returned.
    ///
    /// # Errors
    ///
    /// - [`CmanError::DepthMismatch`] if the child is not exactly one level below the parent
    /// - [`CmanError::DuplicateTitle`] if a sibling with another id has the same title
    /// - [`CmanError::NodeNotFound`] if either handle is stale
    /// - [`CmanError::Internal`] if the child is attached elsewhere
    pub fn attach(&mut self, child: NodeRef, parent: Option<NodeRef>) -> Result<NodeRef> {
        let child_node = self.node(child)?.clone();
        let expected_depth = match parent {
            Some(p) => self.node(p)?.depth + 1,
            None => 0,
        };

        if child_node.depth != expected_depth {
            return Err(CmanError::DepthMismatch {
                child_group: child_node.group,
                child_depth: child_node.depth,
                parent: self.describe(parent),
            });
        }

        let siblings = self.children_of(parent).to_vec();
        if siblings.contains(&child) {
            return Ok(child);
        }
        if child_node.parent.is_some() || self.roots.contains(&child) {
            return Err(CmanError::internal(format!(
                "{} '{}' is already attached elsewhere",
                child_node.group, child_node.title
            )));
        }

        for sibling in siblings {
            let existing = self.node(sibling)?;
            if existing.id == child_node.id {
                trace!("{} '{}' already attached", existing.group, existing.title);
                if child_node.children.is_empty() {
                    self.slots[child.0] = None;
                }
                return Ok(sibling);
            }
            if existing.title == child_node.title {
                return Err(CmanError::DuplicateTitle {
                    group: child_node.group,
                    title: child_node.title,
                    parent: self.describe(parent),
                });
            }
        }

        match parent {
            Some(p) => self.node_mut(p)?.children.push(child),
            None => self.roots.push(child),
        }
        self.node_mut(child)?.parent = parent;
        Ok(child)
    }

    /// Create a node and attach it in one call
    pub fn insert(
        &mut self,
        parent: Option<NodeRef>,
        group: &str,
        title: &str,
        path: impl Into<PathBuf>,
        id: NodeId,
    ) -> Result<NodeRef> {
        let child = self.create_node(group, title, path, id)?;
        match self.attach(child, parent) {
            Ok(attached) => Ok(attached),
            Err(e) => {
                self.slots[child.0] = None;
                Err(e)
            }
        }
    }

    /// Remove a node from its parent's children and clear its back-reference
    ///
    /// The node and its subtree stay allocated; use [`remove`](Self::remove)
    /// to destroy them.
    pub fn detach(&mut self, child: NodeRef) -> Result<()> {
        match self.node(child)?.parent {
            Some(parent) => self.node_mut(parent)?.children.retain(|c| *c != child),
            None => self.roots.retain(|c| *c != child),
        }
        self.node_mut(child)?.parent = None;
        Ok(())
    }

    /// Detach a node and destroy it together with its subtree
    ///
    /// Returns the removed nodes in pre-order.
    pub fn remove(&mut self, node: NodeRef) -> Result<Vec<Node>> {
        self.detach(node)?;

        let mut removed = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if let Some(taken) = self.slots.get_mut(current.0).and_then(Option::take) {
                stack.extend(taken.children.iter().rev().copied());
                removed.push(taken);
            }
        }

        debug!("Removed {} node(s) from forest", removed.len());
        Ok(removed)
    }

    /// Look up a live node
    pub fn get(&self, node: NodeRef) -> Option<&Node> {
        self.slots.get(node.0).and_then(Option::as_ref)
    }

    /// Look up a live node, failing with [`CmanError::NodeNotFound`]
    pub fn node(&self, node: NodeRef) -> Result<&Node> {
        self.get(node)
            .ok_or_else(|| CmanError::NodeNotFound(format!("handle {}", node.0)))
    }

    fn node_mut(&mut self, node: NodeRef) -> Result<&mut Node> {
        self.slots
            .get_mut(node.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| CmanError::NodeNotFound(format!("handle {}", node.0)))
    }

    /// Top-level nodes in insertion order
    pub fn roots(&self) -> &[NodeRef] {
        &self.roots
    }

    /// Children of `parent`, or the roots when `parent` is `None`
    pub fn children_of(&self, parent: Option<NodeRef>) -> &[NodeRef] {
        match parent {
            Some(p) => self.get(p).map(|n| n.children.as_slice()).unwrap_or(&[]),
            None => &self.roots,
        }
    }

    /// Find a child of `parent` by exact title
    pub fn find_child(&self, parent: Option<NodeRef>, title: &str) -> Option<NodeRef> {
        self.children_of(parent)
            .iter()
            .copied()
            .find(|c| self.get(*c).is_some_and(|n| n.title == title))
    }

    /// Find an attached node by its on-disk path
    pub fn find_by_path(&self, path: &Path) -> Option<NodeRef> {
        self.walk()
            .into_iter()
            .find(|n| self.get(*n).is_some_and(|node| node.path == path))
    }

    /// Follow a chain of titles from the roots downwards
    pub fn resolve_titles<S: AsRef<str>>(&self, titles: &[S]) -> Option<NodeRef> {
        let mut current = None;
        for title in titles {
            current = Some(self.find_child(current, title.as_ref())?);
        }
        current
    }

    /// Ancestors of a node, root first, excluding the node itself
    pub fn ancestors(&self, node: NodeRef) -> Vec<NodeRef> {
        let mut chain = Vec::new();
        let mut cursor = self.get(node).and_then(|n| n.parent);
        while let Some(current) = cursor {
            chain.push(current);
            cursor = self.get(current).and_then(|n| n.parent);
        }
        chain.reverse();
        chain
    }

    /// All attached nodes in pre-order
    pub fn walk(&self) -> Vec<NodeRef> {
        let mut order = Vec::new();
        let mut stack: Vec<NodeRef> = self.roots.iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            if let Some(node) = self.get(current) {
                order.push(current);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        order
    }

    /// Attached container nodes in pre-order
    pub fn containers(&self) -> Vec<NodeRef> {
        self.walk()
            .into_iter()
            .filter(|n| {
                self.get(*n)
                    .is_some_and(|node| self.hierarchy.is_container(node.depth))
            })
            .collect()
    }

    /// Number of attached nodes
    pub fn len(&self) -> usize {
        self.walk().len()
    }

    /// Whether no node is attached
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    fn describe(&self, parent: Option<NodeRef>) -> String {
        match parent.and_then(|p| self.get(p)) {
            Some(node) => format!("{} '{}'", node.group, node.title),
            None => "root".to_string(),
        }
    }
}

fn validate_title(title: &str) -> Result<()> {
    let invalid = title.trim().is_empty()
        || title != title.trim()
        || title.contains(['/', '\\'])
        || title == "."
        || title == "..";
    if invalid {
        return Err(CmanError::InvalidTitle(title.to_string()));
    }
    Ok(())
}
