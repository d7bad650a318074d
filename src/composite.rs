//! Keeping composite documents in step with their container's children
//!
//! Every container directory holds one composite document: a file with the
//! document extension containing the composite tag line. Somewhere in it is
//! the marker line, and directly after the marker the managed region, a run
//! of include lines:
//!
//! ```text
//! % COMPOSITE
//! \section*{Groups}
//! % INPUT
//! \input{/notes/data/semester/WS24/course/Algebra/chapter/Groups/lecture/Intro.tex} % Intro
//! \input{/notes/data/semester/WS24/course/Algebra/chapter/Groups/lecture/Cosets.tex} % Cosets
//! \input{appendix.tex}
//!
//! \end{document}
//! ```
//!
//! Lines tagged with a title belong to cman; untagged include lines in the run
//! are the user's and are left alone. Nothing outside the run is touched.

use crate::error::{CmanError, Result};
use crate::node::{Forest, NodeRef};
use crate::types::{CompositeConfig, WorkspaceConfig};
use crate::utils::{atomic_write, has_extension, sorted_entries};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Expected include line for one child
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    /// Title the line is tagged with
    pub title: String,
    /// Complete line, without line ending
    pub line: String,
}

/// Result of synchronizing the managed region of one document's text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedText {
    /// New document text
    pub text: String,
    /// Titles whose lines were appended
    pub added: Vec<String>,
    /// Titles whose lines were dropped
    pub removed: Vec<String>,
}

/// Text operations on the managed region of a composite document
#[derive(Debug, Clone, Copy)]
pub struct ManagedRegion<'a> {
    config: &'a CompositeConfig,
}

impl<'a> ManagedRegion<'a> {
    /// Create the region helper for a composite protocol
    pub fn new(config: &'a CompositeConfig) -> Self {
        Self { config }
    }

    /// Include line for `target` tagged with `title`
    pub fn directive(&self, target: &Path, title: &str) -> Directive {
        let c = self.config;
        Directive {
            title: title.to_string(),
            line: format!(
                "{}{}{}{}{}",
                c.include_prefix,
                target.display(),
                c.include_suffix,
                c.tag_separator,
                title
            ),
        }
    }

    /// Whether a line is an include line
    pub fn is_include(&self, line: &str) -> bool {
        line.trim_start().starts_with(&self.config.include_prefix)
    }

    /// Title an include line is tagged with, if any
    pub fn tag_of<'l>(&self, line: &'l str) -> Option<&'l str> {
        let c = self.config;
        let body = line.trim().strip_prefix(c.include_prefix.as_str())?;
        // paths and titles may contain the suffix; the last closing one ends the path
        let tail = format!("{}{}", c.include_suffix, c.tag_separator);
        let close = body.rfind(&tail)?;
        let title = body[close + tail.len()..].trim();
        (!title.is_empty()).then_some(title)
    }

    /// Whether an include line ends with the tag for `title`
    fn carries_tag(&self, line: &str, title: &str) -> bool {
        let c = self.config;
        let tag = format!("{}{}{}", c.include_suffix, c.tag_separator, title);
        line.trim()
            .strip_prefix(c.include_prefix.as_str())
            .and_then(|body| body.strip_suffix(&tag))
            .is_some()
    }

    /// Whether the text has a line equal to the composite tag
    pub fn is_composite(&self, text: &str) -> bool {
        text.lines().any(|l| l.trim() == self.config.tag)
    }

    /// Bring the managed region in line with `expected`
    ///
    /// Tagged lines equal to an expected directive are kept in place, first
    /// occurrence only. Other tagged lines are dropped. Missing directives are
    /// appended after the run in the given order.
    ///
    /// # Errors
    ///
    /// [`CmanError::MarkerNotFound`] if the text has no marker line.
    pub fn sync(&self, path: &Path, text: &str, expected: &[Directive]) -> Result<SyncedText> {
        let lines: Vec<&str> = text.split('\n').collect();
        let (start, end) = self.run_bounds(path, &lines)?;
        let eol = line_end(lines[start - 1]);

        let mut matched = HashSet::new();
        let mut run = Vec::with_capacity(end - start + expected.len());
        let mut removed = Vec::new();

        for line in &lines[start..end] {
            match self.tag_of(line) {
                Some(title) => {
                    let hit = expected
                        .iter()
                        .position(|d| d.line == line.trim() && !matched.contains(&d.line));
                    match hit {
                        Some(i) => {
                            matched.insert(expected[i].line.clone());
                            run.push(line.to_string());
                        }
                        None => removed.push(title.to_string()),
                    }
                }
                None => run.push(line.to_string()),
            }
        }

        let mut added = Vec::new();
        for directive in expected {
            if matched.insert(directive.line.clone()) {
                run.push(format!("{}{}", directive.line, eol));
                added.push(directive.title.clone());
            }
        }

        Ok(SyncedText {
            text: splice(&lines, start, end, run),
            added,
            removed,
        })
    }

    /// Delete the first line of the run tagged with `title`
    ///
    /// # Errors
    ///
    /// - [`CmanError::MarkerNotFound`] if the text has no marker line
    /// - [`CmanError::EntryNotFound`] if no line in the run carries the tag
    pub fn remove(&self, path: &Path, text: &str, title: &str) -> Result<String> {
        let lines: Vec<&str> = text.split('\n').collect();
        let (start, end) = self.run_bounds(path, &lines)?;

        let index = (start..end)
            .find(|i| self.carries_tag(lines[*i], title))
            .ok_or_else(|| CmanError::EntryNotFound {
                path: path.to_path_buf(),
                title: title.to_string(),
            })?;

        let run = lines[start..end]
            .iter()
            .enumerate()
            .filter(|(offset, _)| start + offset != index)
            .map(|(_, l)| l.to_string())
            .collect();
        Ok(splice(&lines, start, end, run))
    }

    /// Index range of the run: starts after the marker, ends at the first non-include line
    fn run_bounds(&self, path: &Path, lines: &[&str]) -> Result<(usize, usize)> {
        let marker = lines
            .iter()
            .position(|l| l.trim() == self.config.marker)
            .ok_or_else(|| CmanError::MarkerNotFound {
                path: path.to_path_buf(),
                marker: self.config.marker.clone(),
            })?;

        let start = marker + 1;
        let end = (start..lines.len())
            .find(|i| !self.is_include(lines[*i]))
            .unwrap_or(lines.len());
        Ok((start, end))
    }
}

fn line_end(line: &str) -> &'static str {
    if line.ends_with('\r') {
        "\r"
    } else {
        ""
    }
}

fn splice(lines: &[&str], start: usize, end: usize, run: Vec<String>) -> String {
    let mut out: Vec<String> = Vec::with_capacity(lines.len() + run.len());
    out.extend(lines[..start].iter().map(|l| l.to_string()));
    out.extend(run);
    out.extend(lines[end..].iter().map(|l| l.to_string()));
    out.join("\n")
}

/// What [`CompositeSynchronizer::reconcile_children`] did to one document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Titles whose include lines were added
    pub added: Vec<String>,
    /// Titles whose include lines were dropped
    pub removed: Vec<String>,
    /// Whether the document was rewritten
    pub written: bool,
}

/// Outcome of synchronizing every container
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Containers that were processed
    pub synced: Vec<(NodeRef, SyncOutcome)>,
    /// Containers that could not be synchronized
    pub errors: Vec<(NodeRef, CmanError)>,
}

impl SyncReport {
    /// Number of documents that were rewritten
    pub fn written(&self) -> usize {
        self.synced.iter().filter(|(_, o)| o.written).count()
    }
}

/// Reads and rewrites composite documents on disk
#[derive(Debug, Clone, Copy)]
pub struct CompositeSynchronizer<'a> {
    config: &'a WorkspaceConfig,
}

impl<'a> CompositeSynchronizer<'a> {
    /// Create a synchronizer for a workspace layout
    pub fn new(config: &'a WorkspaceConfig) -> Self {
        Self { config }
    }

    fn region(&self) -> ManagedRegion<'a> {
        ManagedRegion::new(&self.config.composite)
    }

    /// Composite document of the container directory `dir`
    ///
    /// The first document in name order carrying the composite tag.
    pub fn locate(&self, dir: &Path) -> Result<PathBuf> {
        let region = self.region();
        for entry in sorted_entries(dir)? {
            let path = entry.path();
            if !path.is_file() || !has_extension(&path, &self.config.document_extension) {
                continue;
            }
            let Ok(text) = fs::read_to_string(&path) else {
                continue;
            };
            if region.is_composite(&text) {
                return Ok(path);
            }
        }
        Err(CmanError::CompositeNotFound(dir.to_path_buf()))
    }

    /// Document that represents `node` in its parent's composite
    pub fn document_for(&self, forest: &Forest, node: NodeRef) -> Result<PathBuf> {
        let node = forest.node(node)?;
        if forest.hierarchy().is_leaf(node.depth()) {
            Ok(node.path().to_path_buf())
        } else {
            self.locate(node.path())
        }
    }

    /// Include line for `node`
    pub fn directive(&self, forest: &Forest, node: NodeRef) -> Result<Directive> {
        let document = self.document_for(forest, node)?;
        let title = forest.node(node)?.title();
        Ok(self.region().directive(&document, title))
    }

    /// Make the managed region of `node`'s composite hold exactly one line per child
    ///
    /// The document is written only when its text changes.
    #[instrument(skip(self, forest), level = "debug")]
    pub fn reconcile_children(&self, forest: &Forest, node: NodeRef) -> Result<SyncOutcome> {
        let container = forest.node(node)?;
        let document = self.locate(container.path())?;

        let expected = container
            .children()
            .iter()
            .map(|child| self.directive(forest, *child))
            .collect::<Result<Vec<_>>>()?;

        let text = fs::read_to_string(&document)?;
        let synced = self.region().sync(&document, &text, &expected)?;

        let written = synced.text != text;
        if written {
            atomic_write(&document, synced.text.as_bytes())?;
            debug!(
                "Updated {:?}: +{:?} -{:?}",
                document, synced.added, synced.removed
            );
        }

        Ok(SyncOutcome {
            added: synced.added,
            removed: synced.removed,
            written,
        })
    }

    /// Remove the include line tagged `title` from `node`'s composite
    ///
    /// # Errors
    ///
    /// [`CmanError::EntryNotFound`] if the managed region has no such line.
    #[instrument(skip(self, forest), level = "debug")]
    pub fn remove_by_title(&self, forest: &Forest, node: NodeRef, title: &str) -> Result<()> {
        let document = self.locate(forest.node(node)?.path())?;
        let text = fs::read_to_string(&document)?;
        let updated = self.region().remove(&document, &text, title)?;
        atomic_write(&document, updated.as_bytes())?;
        debug!("Removed '{}' from {:?}", title, document);
        Ok(())
    }

    /// Synchronize every container, collecting failures per node
    #[instrument(skip_all)]
    pub fn reconcile_all(&self, forest: &Forest) -> SyncReport {
        let mut report = SyncReport::default();
        for node in forest.containers() {
            match self.reconcile_children(forest, node) {
                Ok(outcome) => report.synced.push((node, outcome)),
                Err(e) => {
                    warn!("Cannot synchronize composite of {:?}: {}", node, e);
                    report.errors.push((node, e));
                }
            }
        }
        info!(
            "Synchronized {} composite document(s), {} rewritten, {} error(s)",
            report.synced.len(),
            report.written(),
            report.errors.len()
        );
        report
    }
}
