//! Static definition of the hierarchy levels
//!
//! A [`GroupHierarchy`] is an ordered list of levels. Depth 0 is the top-level
//! container, the last level holds leaf documents and everything in between is
//! a container. Every piece of group-specific behavior (which directory holds
//! a level's nodes, whether a node is a leaf, which template to apply) is looked
//! up here by depth instead of being encoded in per-level types.
//!
//! ```text
//! depth 0  semester   container   data/semester/<title>/
//! depth 1  course     container   <semester>/course/<title>/
//! depth 2  chapter    container   <course>/chapter/<title>/
//! depth 3  lecture    leaf        <chapter>/lecture/<title>.tex
//! ```

use crate::error::{CmanError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One level of the hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSpec {
    /// Group name, also used in config keys and placeholder names
    pub name: String,
    /// Subdirectory that holds nodes of this level; defaults to `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    /// Alternative spellings accepted on the command line
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl LevelSpec {
    /// Create a level with no aliases and the default directory
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            directory: None,
            aliases: Vec::new(),
        }
    }

    /// Add accepted aliases
    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    /// Directory name holding nodes of this level
    pub fn directory(&self) -> &str {
        self.directory.as_deref().unwrap_or(&self.name)
    }
}

/// Ordered, validated list of hierarchy levels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<LevelSpec>", into = "Vec<LevelSpec>")]
pub struct GroupHierarchy {
    levels: Vec<LevelSpec>,
}

impl GroupHierarchy {
    /// Build a hierarchy from level specs
    ///
    /// # Errors
    ///
    /// [`CmanError::InvalidConfiguration`] when there are no levels, a name is
    /// blank, or a name or alias is used twice.
    pub fn new(levels: Vec<LevelSpec>) -> Result<Self> {
        if levels.is_empty() {
            return Err(CmanError::InvalidConfiguration(
                "hierarchy needs at least one level".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for level in &levels {
            if level.name.trim().is_empty() || level.directory().trim().is_empty() {
                return Err(CmanError::InvalidConfiguration(
                    "hierarchy level names and directories must not be blank".to_string(),
                ));
            }
            for spelling in std::iter::once(&level.name).chain(level.aliases.iter()) {
                if !seen.insert(spelling.to_lowercase()) {
                    return Err(CmanError::InvalidConfiguration(format!(
                        "hierarchy name or alias '{}' is used more than once",
                        spelling
                    )));
                }
            }
        }

        Ok(Self { levels })
    }

    /// Build a hierarchy from plain names
    pub fn from_names(names: &[&str]) -> Result<Self> {
        Self::new(names.iter().map(|n| LevelSpec::new(*n)).collect())
    }

    /// Number of levels
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Always false; a hierarchy has at least one level
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// All levels, top first
    pub fn levels(&self) -> &[LevelSpec] {
        &self.levels
    }

    /// Depth of an exact group name
    pub fn depth_of(&self, name: &str) -> Option<usize> {
        self.levels.iter().position(|l| l.name == name)
    }

    /// Depth of a group given by name or alias, ignoring case
    pub fn resolve(&self, input: &str) -> Option<usize> {
        let input = input.trim().to_lowercase();
        self.levels.iter().position(|l| {
            l.name.to_lowercase() == input || l.aliases.iter().any(|a| a.to_lowercase() == input)
        })
    }

    /// Like [`resolve`](Self::resolve) but failing with [`CmanError::UnknownGroup`]
    pub fn require(&self, input: &str) -> Result<usize> {
        self.resolve(input)
            .ok_or_else(|| CmanError::UnknownGroup(input.to_string()))
    }

    /// Group name at a depth
    pub fn name_at(&self, depth: usize) -> Option<&str> {
        self.levels.get(depth).map(|l| l.name.as_str())
    }

    /// Directory holding nodes of the level at a depth
    pub fn directory_at(&self, depth: usize) -> Option<&str> {
        self.levels.get(depth).map(|l| l.directory())
    }

    /// Depth of the leaf (document) level
    pub fn leaf_depth(&self) -> usize {
        self.levels.len() - 1
    }

    /// Whether nodes at this depth are documents
    pub fn is_leaf(&self, depth: usize) -> bool {
        depth == self.leaf_depth()
    }

    /// Whether nodes at this depth are directories with children
    pub fn is_container(&self, depth: usize) -> bool {
        depth < self.leaf_depth()
    }

    /// Depth of the children of a node at `depth`, if it has any
    pub fn child_depth(&self, depth: usize) -> Option<usize> {
        self.is_container(depth).then_some(depth + 1)
    }
}

impl Default for GroupHierarchy {
    fn default() -> Self {
        Self {
            levels: vec![
                LevelSpec::new("semester").with_aliases(&["sem", "s"]),
                LevelSpec::new("course").with_aliases(&["cou", "co"]),
                LevelSpec::new("chapter").with_aliases(&["chap", "ch"]),
                LevelSpec::new("lecture").with_aliases(&["lec", "l"]),
            ],
        }
    }
}

impl TryFrom<Vec<LevelSpec>> for GroupHierarchy {
    type Error = CmanError;

    fn try_from(levels: Vec<LevelSpec>) -> Result<Self> {
        Self::new(levels)
    }
}

impl From<GroupHierarchy> for Vec<LevelSpec> {
    fn from(hierarchy: GroupHierarchy) -> Self {
        hierarchy.levels
    }
}
