//! Current-selection cursor
//!
//! The cursor remembers one selected title per level under the keys
//! `current-<level>` of a [`ConfigStore`]. Selecting at one level clears every
//! deeper level, so the stored path never points below a node that is no
//! longer selected. An empty value means "unset".

use crate::config::ConfigStore;
use crate::error::{CmanError, Result};
use crate::hierarchy::GroupHierarchy;
use crate::node::{Forest, NodeRef};
use tracing::{debug, instrument};

/// Prefix of the per-level selection keys
pub const CURRENT_KEY_PREFIX: &str = "current-";

/// How far the stored selection resolves
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionStatus {
    /// Every level resolves to a node
    Complete,
    /// The level at `depth` has no nodes to select yet
    Empty {
        /// First level without candidates
        depth: usize,
    },
    /// The level at `depth` has candidates but the stored title matches none
    Invalid {
        /// First unresolved level
        depth: usize,
        /// Stored value, `None` when unset
        stored: Option<String>,
    },
}

/// Result of [`Cursor::validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    /// Selected nodes from the top level down, as far as they resolve
    pub resolved: Vec<NodeRef>,
    /// Where resolution stopped
    pub status: SelectionStatus,
}

impl Validation {
    /// First level that needs a new selection
    pub fn first_invalid(&self) -> Option<usize> {
        match self.status {
            SelectionStatus::Invalid { depth, .. } => Some(depth),
            _ => None,
        }
    }

    /// Deepest selected node
    pub fn deepest(&self) -> Option<NodeRef> {
        self.resolved.last().copied()
    }
}

/// Selection state backed by a config store
#[derive(Debug)]
pub struct Cursor {
    store: Box<dyn ConfigStore>,
    hierarchy: GroupHierarchy,
}

impl Cursor {
    /// Create a cursor over `store` for a hierarchy
    pub fn new(store: Box<dyn ConfigStore>, hierarchy: GroupHierarchy) -> Self {
        Self { store, hierarchy }
    }

    /// Store backing the cursor
    pub fn store(&self) -> &dyn ConfigStore {
        self.store.as_ref()
    }

    /// Mutable access to the backing store
    pub fn store_mut(&mut self) -> &mut dyn ConfigStore {
        self.store.as_mut()
    }

    /// Config key of the level at `depth`
    pub fn key_for(&self, depth: usize) -> Option<String> {
        self.hierarchy
            .name_at(depth)
            .map(|name| format!("{}{}", CURRENT_KEY_PREFIX, name))
    }

    fn require_key(&self, depth: usize) -> Result<String> {
        self.key_for(depth)
            .ok_or_else(|| CmanError::UnknownGroup(format!("depth {}", depth)))
    }

    /// Stored selection at `depth`; `None` when unset or empty
    pub fn get(&self, depth: usize) -> Result<Option<String>> {
        let key = self.require_key(depth)?;
        match self.store.get(&key) {
            Ok(value) if value.is_empty() => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(CmanError::ConfigKeyNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Node selected at `depth - 1`, which new nodes at `depth` go under
    ///
    /// `None` for depth 0.
    ///
    /// # Errors
    ///
    /// [`CmanError::SelectionIncomplete`] naming the first level above
    /// `depth` whose selection does not resolve.
    pub fn parent_for(&self, forest: &Forest, depth: usize) -> Result<Option<NodeRef>> {
        let mut current = None;
        for d in 0..depth {
            let found = self
                .get(d)?
                .and_then(|title| forest.find_child(current, &title));
            match found {
                Some(node) => current = Some(node),
                None => {
                    return Err(CmanError::SelectionIncomplete {
                        group: self.hierarchy.name_at(d).unwrap_or_default().to_string(),
                    })
                }
            }
        }
        Ok(current)
    }

    /// Select `title` at `depth` and clear every deeper level
    ///
    /// # Errors
    ///
    /// - [`CmanError::SelectionIncomplete`] if the levels above do not resolve
    /// - [`CmanError::InvalidSelection`] if `title` is not a child of the selected parent
    #[instrument(skip(self, forest))]
    pub fn select(&mut self, forest: &Forest, depth: usize, title: &str) -> Result<NodeRef> {
        let key = self.require_key(depth)?;
        let parent = self.parent_for(forest, depth)?;
        let node = forest
            .find_child(parent, title)
            .ok_or_else(|| CmanError::InvalidSelection {
                group: self.hierarchy.name_at(depth).unwrap_or_default().to_string(),
                title: title.to_string(),
            })?;

        self.store.set(&key, title)?;
        self.clear_from(depth + 1)?;
        debug!("Selected {} '{}'", key, title);
        Ok(node)
    }

    /// Unset the selection at `depth` and below
    pub fn clear_from(&mut self, depth: usize) -> Result<()> {
        for d in depth..self.hierarchy.len() {
            if self.get(d)?.is_some() {
                let key = self.require_key(d)?;
                self.store.set(&key, "")?;
            }
        }
        Ok(())
    }

    /// Resolve the stored selection against the forest without changing it
    pub fn validate(&self, forest: &Forest) -> Result<Validation> {
        let mut resolved = Vec::new();
        let mut current = None;

        for depth in 0..self.hierarchy.len() {
            if forest.children_of(current).is_empty() {
                return Ok(Validation {
                    resolved,
                    status: SelectionStatus::Empty { depth },
                });
            }

            let stored = self.get(depth)?;
            match stored.as_deref().and_then(|t| forest.find_child(current, t)) {
                Some(node) => {
                    resolved.push(node);
                    current = Some(node);
                }
                None => {
                    return Ok(Validation {
                        resolved,
                        status: SelectionStatus::Invalid { depth, stored },
                    })
                }
            }
        }

        Ok(Validation {
            resolved,
            status: SelectionStatus::Complete,
        })
    }
}
