//! Template-driven materialization of new nodes
//!
//! A container level `L` is described by `<templates>/L.json`, a JSON object
//! whose keys are entry names. A string value names a source file (relative
//! to the templates directory) that is copied; an object value is a nested
//! directory:
//!
//! ```json
//! {
//!     "course.tex": "course-composite.tex",
//!     "figures": {},
//!     "chapter": {}
//! }
//! ```
//!
//! The leaf level `L` is described by `<templates>/L.<ext>`, which is copied
//! to the new document as is.
//!
//! After copying, `%%name%%` placeholders in new documents are replaced from a
//! table built by [`Placeholders::for_node`].

use crate::error::{CmanError, Result};
use crate::node::{Forest, NodeRef};
use crate::sidecar::Sidecar;
use crate::types::WorkspaceConfig;
use crate::utils::{atomic_write, create_new_dir, create_new_file, has_extension};
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, instrument, trace};
use walkdir::WalkDir;

/// One entry of a container template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateEntry {
    /// File copied from a source in the templates directory
    File {
        /// Resolved source path
        source: PathBuf,
        /// Source content, read when the template is loaded
        content: Vec<u8>,
    },
    /// Directory with nested entries
    Directory(Vec<(String, TemplateEntry)>),
}

/// Parsed template of one hierarchy level
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Template {
    /// Directory structure for a container node
    Container {
        /// Template file it was loaded from
        path: PathBuf,
        /// Top-level entries of the node directory
        entries: Vec<(String, TemplateEntry)>,
    },
    /// Content of a new leaf document
    Leaf {
        /// Template file it was loaded from
        path: PathBuf,
        /// Document content
        content: Vec<u8>,
    },
}

impl Template {
    /// Template file for the level at `depth`
    pub fn path_for(config: &WorkspaceConfig, depth: usize) -> Option<PathBuf> {
        let name = config.hierarchy.name_at(depth)?;
        let file = if config.hierarchy.is_leaf(depth) {
            format!("{}.{}", name, config.document_extension)
        } else {
            format!("{}.json", name)
        };
        Some(config.template_dir().join(file))
    }

    /// Load the template for the level at `depth`, reading every source file
    ///
    /// # Errors
    ///
    /// - [`CmanError::TemplateRead`] if the template or a source it names is unreadable
    /// - [`CmanError::TemplateParse`] if a container template is malformed
    pub fn load(config: &WorkspaceConfig, depth: usize) -> Result<Self> {
        let path = Self::path_for(config, depth)
            .ok_or_else(|| CmanError::internal(format!("no hierarchy level at depth {}", depth)))?;
        let bytes = read_template_file(&path)?;

        if config.hierarchy.is_leaf(depth) {
            return Ok(Template::Leaf {
                path,
                content: bytes,
            });
        }

        let text = String::from_utf8(bytes).map_err(|e| CmanError::TemplateParse {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        Self::parse(&path, &text, &config.template_dir())
    }

    /// Parse a container template; `source_dir` resolves relative sources
    pub fn parse(path: &Path, text: &str, source_dir: &Path) -> Result<Self> {
        let value: Value = serde_json::from_str(text).map_err(|e| CmanError::TemplateParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let entries = parse_entries(path, &value, source_dir)?;
        Ok(Template::Container {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// File the template was loaded from
    pub fn path(&self) -> &Path {
        match self {
            Template::Container { path, .. } | Template::Leaf { path, .. } => path,
        }
    }
}

fn read_template_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|source| CmanError::TemplateRead {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_entries(
    template: &Path,
    value: &Value,
    source_dir: &Path,
) -> Result<Vec<(String, TemplateEntry)>> {
    let object = value.as_object().ok_or_else(|| CmanError::TemplateParse {
        path: template.to_path_buf(),
        reason: format!("expected an object, found {}", value),
    })?;

    let mut entries = Vec::with_capacity(object.len());
    for (label, entry) in object {
        check_label(template, label)?;
        let parsed = match entry {
            Value::String(source) => {
                let source = source_dir.join(source);
                let content = read_template_file(&source)?;
                TemplateEntry::File { source, content }
            }
            Value::Object(_) => {
                TemplateEntry::Directory(parse_entries(template, entry, source_dir)?)
            }
            other => {
                return Err(CmanError::TemplateParse {
                    path: template.to_path_buf(),
                    reason: format!("entry '{}' must be a string or an object, found {}", label, other),
                })
            }
        };
        entries.push((label.clone(), parsed));
    }
    Ok(entries)
}

fn check_label(template: &Path, label: &str) -> Result<()> {
    let mut components = Path::new(label).components();
    let single = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !single || label.contains(['/', '\\']) {
        return Err(CmanError::TemplateParse {
            path: template.to_path_buf(),
            reason: format!("'{}' is not a plain file or directory name", label),
        });
    }
    Ok(())
}

/// Placeholder values for one node
#[derive(Debug, Clone, Default)]
pub struct Placeholders {
    values: HashMap<String, String>,
}

impl Placeholders {
    /// Build the table for `node`, which will be attached under `parent`
    ///
    /// The table holds `title`, `group`, `id`, `path`, the node's own group
    /// name mapped to its title, and each ancestor's group name mapped to
    /// that ancestor's title.
    pub fn for_node(forest: &Forest, node: NodeRef, parent: Option<NodeRef>) -> Result<Self> {
        let mut placeholders = Self::default();

        if let Some(parent) = parent {
            let mut chain = forest.ancestors(parent);
            chain.push(parent);
            for ancestor in chain {
                let ancestor = forest.node(ancestor)?;
                placeholders.insert(ancestor.group(), ancestor.title());
            }
        }

        let node = forest.node(node)?;
        placeholders.insert(node.group(), node.title());
        placeholders.insert("title", node.title());
        placeholders.insert("group", node.group());
        placeholders.insert("id", node.id().as_str());
        placeholders.insert("path", &node.path().to_string_lossy());
        Ok(placeholders)
    }

    /// Add or replace one value
    pub fn insert(&mut self, name: &str, value: &str) {
        self.values.insert(name.to_string(), value.to_string());
    }

    /// Value of a placeholder
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Replace every known `<delimiter>name<delimiter>` token in one pass
    ///
    /// Unknown tokens are left as they are.
    pub fn substitute(&self, text: &str, delimiter: &str) -> Result<String> {
        let escaped = regex::escape(delimiter);
        let pattern = Regex::new(&format!("{0}([A-Za-z0-9_.-]+){0}", escaped))
            .map_err(|e| CmanError::InvalidPattern(e.to_string()))?;

        let replaced = pattern.replace_all(text, |caps: &Captures<'_>| {
            match self.values.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        });
        Ok(replaced.into_owned())
    }
}

/// Files and directories created by one [`TemplateApplier::apply`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Every created path, parents before children
    pub created: Vec<PathBuf>,
    /// Documents in which at least one placeholder was replaced
    pub substituted: Vec<PathBuf>,
}

/// Materializes new nodes on disk from their level's template
#[derive(Debug, Clone)]
pub struct TemplateApplier<'a> {
    config: &'a WorkspaceConfig,
}

impl<'a> TemplateApplier<'a> {
    /// Create an applier for a workspace layout
    pub fn new(config: &'a WorkspaceConfig) -> Self {
        Self { config }
    }

    /// Create the node's file or directory structure
    ///
    /// `node` may still be detached; `parent` is where it will be attached and
    /// supplies the ancestor placeholders. The template is loaded completely
    /// before anything is created. Nothing that already exists is
    /// overwritten, and a failure part way leaves what was created in place.
    ///
    /// # Errors
    ///
    /// - [`CmanError::TemplateRead`] / [`CmanError::TemplateParse`] for a bad template
    /// - [`CmanError::DestinationExists`] if the node or any entry already exists
    #[instrument(skip(self, forest), level = "debug")]
    pub fn apply(
        &self,
        forest: &Forest,
        node: NodeRef,
        parent: Option<NodeRef>,
    ) -> Result<ApplyReport> {
        let target = forest.node(node)?;
        let template = Template::load(self.config, target.depth())?;
        let placeholders = Placeholders::for_node(forest, node, parent)?;
        let root = target.path().to_path_buf();
        let mut report = ApplyReport::default();

        match &template {
            Template::Leaf { content, .. } => {
                create_new_file(&root, content)?;
                report.created.push(root.clone());
            }
            Template::Container { entries, .. } => {
                create_new_dir(&root)?;
                report.created.push(root.clone());
                materialize(&root, entries, &mut report)?;

                let sidecar = Sidecar::new(target.title(), target.group(), target.id().clone());
                sidecar.write(&root.join(&self.config.sidecar_name))?;
            }
        }

        self.substitute_documents(&root, &placeholders, &mut report)?;
        debug!(
            "Applied {:?} to {:?}: {} created, {} substituted",
            template.path(),
            root,
            report.created.len(),
            report.substituted.len()
        );
        Ok(report)
    }

    fn substitute_documents(
        &self,
        root: &Path,
        placeholders: &Placeholders,
        report: &mut ApplyReport,
    ) -> Result<()> {
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || !has_extension(path, &self.config.document_extension)
            {
                continue;
            }

            let text = fs::read_to_string(path)?;
            let replaced = placeholders.substitute(&text, &self.config.placeholder_delimiter)?;
            if replaced != text {
                atomic_write(path, replaced.as_bytes())?;
                trace!("Substituted placeholders in {:?}", path);
                report.substituted.push(path.to_path_buf());
            }
        }
        Ok(())
    }
}

fn materialize(dir: &Path, entries: &[(String, TemplateEntry)], report: &mut ApplyReport) -> Result<()> {
    for (label, entry) in entries {
        let target = dir.join(label);
        match entry {
            TemplateEntry::File { content, .. } => create_new_file(&target, content)?,
            TemplateEntry::Directory(children) => {
                create_new_dir(&target)?;
                report.created.push(target.clone());
                materialize(&target, children, report)?;
                continue;
            }
        }
        report.created.push(target);
    }
    Ok(())
}

/// Default template files for every level, relative to the templates directory
///
/// A container level gets a structure file holding its composite document and
/// an empty children directory; the leaf level gets a one-line document.
pub fn default_templates(config: &WorkspaceConfig) -> Vec<(PathBuf, String)> {
    let hierarchy = &config.hierarchy;
    let ext = &config.document_extension;
    let d = &config.placeholder_delimiter;
    let mut files = Vec::new();

    for (depth, level) in hierarchy.levels().iter().enumerate() {
        if hierarchy.is_leaf(depth) {
            files.push((
                PathBuf::from(format!("{}.{}", level.name, ext)),
                format!("\\subsection*{{{d}title{d}}}\n"),
            ));
            continue;
        }

        let composite_source = format!("{}-composite.{}", level.name, ext);
        let mut structure = serde_json::Map::new();
        structure.insert(
            format!("{}.{}", level.name, ext),
            Value::String(composite_source.clone()),
        );
        if let Some(child_dir) = hierarchy.directory_at(depth + 1) {
            structure.insert(child_dir.to_string(), Value::Object(serde_json::Map::new()));
        }
        let structure = Value::Object(structure);
        files.push((
            PathBuf::from(format!("{}.json", level.name)),
            format!("{:#}\n", structure),
        ));

        files.push((
            PathBuf::from(composite_source),
            format!(
                "{}\n\\section*{{{d}title{d}}}\n{}\n",
                config.composite.tag, config.composite.marker
            ),
        ));
    }

    files
}
