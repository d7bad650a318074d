//! Rebuilding the in-memory forest from the directory tree
//!
//! The reconciler walks `<root>/<data>/<top level>/` downwards, one level per
//! hierarchy depth, and attaches every node it finds to the forest. It is safe
//! to run any number of times: nodes already in the forest are matched by path
//! and reused, and nodes whose path has disappeared are pruned first, so a
//! second pass only applies what changed on disk in between.
//!
//! A directory whose sidecar repeats the title or id of a sibling at another
//! path (a copied directory, typically) is reported, never merged into it.
//!
//! A broken subtree never stops the walk. Problems are collected in the
//! [`ReconcileReport`] and the walk continues with the next sibling.

use crate::error::{CmanError, Result};
use crate::node::{Forest, NodeId, NodeRef};
use crate::sidecar::Sidecar;
use crate::types::WorkspaceConfig;
use crate::utils::{file_stem, has_extension, is_hidden, sorted_entries};
use globset::GlobSet;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Outcome of one reconciliation pass
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Nodes attached during this pass, in discovery order
    pub added: Vec<NodeRef>,
    /// Containers whose children directory does not exist yet
    pub pending: Vec<NodeRef>,
    /// Container directories that had no sidecar and got one written
    pub migrated: Vec<PathBuf>,
    /// Paths of nodes dropped because they no longer exist on disk
    pub pruned: Vec<PathBuf>,
    /// Entries that could not be turned into nodes; their subtrees were skipped
    pub errors: Vec<(PathBuf, CmanError)>,
}

impl ReconcileReport {
    /// Whether the pass finished without collected errors
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Walks the data directory and attaches what it finds to a forest
#[derive(Debug)]
pub struct TreeReconciler<'a> {
    config: &'a WorkspaceConfig,
    ignore: GlobSet,
}

impl<'a> TreeReconciler<'a> {
    /// Create a reconciler for a workspace layout
    ///
    /// # Errors
    ///
    /// [`CmanError::InvalidPattern`] if an ignore glob does not compile.
    pub fn new(config: &'a WorkspaceConfig) -> Result<Self> {
        Ok(Self {
            config,
            ignore: config.ignore_set()?,
        })
    }

    /// Bring the forest in line with the directory tree
    ///
    /// Never fails part way; every problem ends up in the report.
    #[instrument(skip_all, fields(root = ?self.config.root))]
    pub fn reconcile(&self, forest: &mut Forest) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let top = self.config.top_dir();

        self.prune(forest, &mut report);
        if top.is_dir() {
            self.scan_level(forest, None, &top, 0, &mut report);
        } else {
            warn!("Top-level directory {:?} does not exist", top);
            let missing = io::Error::new(io::ErrorKind::NotFound, format!("{:?}", top));
            report.errors.push((top, CmanError::Io(missing)));
        }

        info!(
            "Reconciled {} node(s): {} added, {} pruned, {} pending, {} migrated, {} error(s)",
            forest.len(),
            report.added.len(),
            report.pruned.len(),
            report.pending.len(),
            report.migrated.len(),
            report.errors.len()
        );
        report
    }

    /// Drop every node whose file or directory is gone, subtree included
    fn prune(&self, forest: &mut Forest, report: &mut ReconcileReport) {
        for node in forest.walk() {
            // descendants of a pruned node are already gone
            let Some(path) = forest.get(node).map(|n| n.path().to_path_buf()) else {
                continue;
            };
            if path.exists() {
                continue;
            }
            match forest.remove(node) {
                Ok(removed) => {
                    info!("Pruned {:?}: {} node(s) no longer on disk", path, removed.len());
                    report.pruned.push(path);
                }
                Err(e) => report.errors.push((path, e)),
            }
        }
    }

    fn scan_level(
        &self,
        forest: &mut Forest,
        parent: Option<NodeRef>,
        dir: &Path,
        depth: usize,
        report: &mut ReconcileReport,
    ) {
        if !dir.is_dir() {
            if let Some(parent) = parent {
                debug!("Children directory {:?} does not exist yet", dir);
                report.pending.push(parent);
            }
            return;
        }

        let entries = match sorted_entries(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot list {:?}: {}", dir, e);
                report.errors.push((dir.to_path_buf(), e));
                return;
            }
        };

        let is_leaf = self.config.hierarchy.is_leaf(depth);
        for entry in entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_hidden(&name) || self.ignore.is_match(&name) {
                continue;
            }
            let path = entry.path();

            if is_leaf {
                if path.is_file() && has_extension(&path, &self.config.document_extension) {
                    self.add_leaf(forest, parent, &path, depth, report);
                }
            } else if path.is_dir() {
                if let Some(node) = self.add_container(forest, parent, &path, &name, depth, report)
                {
                    let children = self.config.children_dir(Some(&path), depth + 1);
                    self.scan_level(forest, Some(node), &children, depth + 1, report);
                }
            }
        }
    }

    fn add_leaf(
        &self,
        forest: &mut Forest,
        parent: Option<NodeRef>,
        path: &Path,
        depth: usize,
        report: &mut ReconcileReport,
    ) {
        let Some(title) = file_stem(path) else {
            return;
        };
        if self.existing(forest, parent, path).is_some() {
            return;
        }

        let group = self.config.hierarchy.name_at(depth).unwrap_or_default().to_string();
        let id = NodeId::for_leaf(&title);
        if let Err(e) = self.attach_new(forest, parent, &group, &title, path, id, report) {
            warn!("Skipping document {:?}: {}", path, e);
            report.errors.push((path.to_path_buf(), e));
        }
    }

    fn add_container(
        &self,
        forest: &mut Forest,
        parent: Option<NodeRef>,
        path: &Path,
        dir_name: &str,
        depth: usize,
        report: &mut ReconcileReport,
    ) -> Option<NodeRef> {
        if let Some(existing) = self.existing(forest, parent, path) {
            return Some(existing);
        }

        let level = self.config.hierarchy.name_at(depth).unwrap_or_default();
        let sidecar_path = path.join(&self.config.sidecar_name);
        let (sidecar, migrating) = if sidecar_path.exists() {
            match Sidecar::read(&sidecar_path) {
                Ok(sidecar) => (sidecar, false),
                Err(e) => {
                    warn!("Skipping {:?}: {}", path, e);
                    report.errors.push((path.to_path_buf(), e));
                    return None;
                }
            }
        } else {
            (Sidecar::new(dir_name, level, NodeId::generate()), true)
        };

        // top-level titles are the directory names
        let title = if depth == 0 { dir_name } else { sidecar.title.as_str() };
        let group = if depth == 0 { level } else { sidecar.group.as_str() };

        let node = match self.attach_new(forest, parent, group, title, path, sidecar.id.clone(), report)
        {
            Ok(node) => node,
            Err(e) => {
                warn!("Skipping {:?}: {}", path, e);
                report.errors.push((path.to_path_buf(), e));
                return None;
            }
        };

        if migrating {
            match sidecar.write(&sidecar_path) {
                Ok(()) => {
                    info!("Migrated {:?}: wrote sidecar with new id {}", path, sidecar.id);
                    report.migrated.push(path.to_path_buf());
                }
                Err(e) => {
                    warn!("Cannot write sidecar for {:?}: {}", path, e);
                    report.errors.push((sidecar_path, e));
                }
            }
        }
        Some(node)
    }

    fn existing(&self, forest: &Forest, parent: Option<NodeRef>, path: &Path) -> Option<NodeRef> {
        forest
            .children_of(parent)
            .iter()
            .copied()
            .find(|c| forest.get(*c).is_some_and(|n| n.path() == path))
    }

    #[allow(clippy::too_many_arguments)]
    fn attach_new(
        &self,
        forest: &mut Forest,
        parent: Option<NodeRef>,
        group: &str,
        title: &str,
        path: &Path,
        id: NodeId,
        report: &mut ReconcileReport,
    ) -> Result<NodeRef> {
        let before = forest.children_of(parent).len();
        let id_text = id.to_string();
        let node = forest.insert(parent, group, title, path, id)?;

        // a sibling with the same id answers the insert; it lives elsewhere
        let found = forest.node(node)?.path();
        if found != path {
            return Err(CmanError::DuplicateId {
                id: id_text,
                path: path.to_path_buf(),
                existing: found.to_path_buf(),
            });
        }
        if forest.children_of(parent).len() > before {
            debug!("Found {} '{}' at {:?}", group, title, path);
            report.added.push(node);
        }
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::GroupHierarchy;
    use std::fs;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn container(dir: &Path, group: &str, title: &str) -> PathBuf {
        fs::create_dir_all(dir).unwrap();
        Sidecar::new(title, group, NodeId::generate())
            .write(&dir.join("info.json"))
            .unwrap();
        dir.to_path_buf()
    }

    /// WS24 / Algebra / Groups / {Intro, Cosets}
    fn sample_tree(config: &WorkspaceConfig) {
        let sem = container(&config.top_dir().join("WS24"), "semester", "WS24");
        let course = container(&sem.join("course/Algebra"), "course", "Linear Algebra");
        let chapter = container(&course.join("chapter/Groups"), "chapter", "Groups");
        fs::create_dir_all(chapter.join("lecture")).unwrap();
        fs::write(chapter.join("lecture/Intro.tex"), "").unwrap();
        fs::write(chapter.join("lecture/Cosets.tex"), "").unwrap();
        fs::write(chapter.join("lecture/Intro.aux"), "").unwrap();
    }

    #[test]
    fn test_reconstructs_tree() {
        let root = TempDir::new().unwrap();
        let config = WorkspaceConfig::with_root(root.path());
        sample_tree(&config);

        let mut forest = Forest::new(config.hierarchy.clone());
        let report = TreeReconciler::new(&config).unwrap().reconcile(&mut forest);

        assert!(report.is_clean(), "{:?}", report.errors);
        assert_eq!(report.added.len(), 5);
        // sidecar title wins below the top level
        let chapter = forest
            .resolve_titles(&["WS24", "Linear Algebra", "Groups"])
            .unwrap();
        let lectures: Vec<_> = forest
            .children_of(Some(chapter))
            .iter()
            .map(|c| forest.node(*c).unwrap().title().to_string())
            .collect();
        assert_eq!(lectures, vec!["Cosets", "Intro"]);

        let intro = forest.find_child(Some(chapter), "Intro").unwrap();
        assert_eq!(forest.node(intro).unwrap().id(), &NodeId::for_leaf("Intro"));
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let root = TempDir::new().unwrap();
        let config = WorkspaceConfig::with_root(root.path());
        sample_tree(&config);

        let reconciler = TreeReconciler::new(&config).unwrap();
        let mut forest = Forest::new(config.hierarchy.clone());
        reconciler.reconcile(&mut forest);
        let ids: Vec<_> = forest
            .walk()
            .iter()
            .map(|n| forest.node(*n).unwrap().id().clone())
            .collect();

        let second = reconciler.reconcile(&mut forest);
        assert!(second.added.is_empty());
        let again: Vec<_> = forest
            .walk()
            .iter()
            .map(|n| forest.node(*n).unwrap().id().clone())
            .collect();
        assert_eq!(ids, again);

        // new grandchildren of existing nodes still show up
        let lecture_dir = config
            .top_dir()
            .join("WS24/course/Algebra/chapter/Groups/lecture");
        fs::write(lecture_dir.join("Lagrange.tex"), "").unwrap();
        let third = reconciler.reconcile(&mut forest);
        assert_eq!(third.added.len(), 1);
    }

    #[test]
    #[traced_test]
    fn test_migrates_missing_sidecar() {
        let root = TempDir::new().unwrap();
        let config = WorkspaceConfig::with_root(root.path());
        let sem = config.top_dir().join("WS24");
        fs::create_dir_all(sem.join("course/Old Course")).unwrap();

        let mut forest = Forest::new(config.hierarchy.clone());
        let report = TreeReconciler::new(&config).unwrap().reconcile(&mut forest);

        assert_eq!(report.migrated.len(), 2);
        let sidecar = Sidecar::read(&sem.join("course/Old Course/info.json")).unwrap();
        assert_eq!(sidecar.title, "Old Course");
        assert_eq!(sidecar.group, "course");
        let course = forest.resolve_titles(&["WS24", "Old Course"]).unwrap();
        assert_eq!(forest.node(course).unwrap().id(), &sidecar.id);
        assert!(logs_contain("Migrated"));
    }

    #[test]
    fn test_bad_sidecar_skips_subtree_only() {
        let root = TempDir::new().unwrap();
        let config = WorkspaceConfig::with_root(root.path());
        let sem = container(&config.top_dir().join("WS24"), "semester", "WS24");
        let broken = sem.join("course/Broken");
        fs::create_dir_all(broken.join("chapter/Inner")).unwrap();
        fs::write(broken.join("info.json"), r#"{"title": "Broken"}"#).unwrap();
        container(&sem.join("course/Fine"), "course", "Fine");

        let mut forest = Forest::new(config.hierarchy.clone());
        let report = TreeReconciler::new(&config).unwrap().reconcile(&mut forest);

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].0, broken);
        assert!(forest.resolve_titles(&["WS24", "Fine"]).is_some());
        assert!(forest.resolve_titles(&["WS24", "Broken"]).is_none());
        assert_eq!(forest.len(), 2);
    }

    #[test]
    fn test_copied_directory_is_reported_not_merged() {
        let root = TempDir::new().unwrap();
        let config = WorkspaceConfig::with_root(root.path());
        let sem = container(&config.top_dir().join("WS24"), "semester", "WS24");
        let course = container(&sem.join("course/Algebra"), "course", "Algebra");
        container(&course.join("chapter/Groups"), "chapter", "Groups");

        // cp -r keeps the sidecar, id included
        let copy = sem.join("course/Algebra-copy");
        fs::create_dir_all(copy.join("chapter/Rings")).unwrap();
        fs::copy(course.join("info.json"), copy.join("info.json")).unwrap();
        fs::copy(
            course.join("chapter/Groups/info.json"),
            copy.join("chapter/Rings/info.json"),
        )
        .unwrap();
        // same title, fresh id
        let twin = container(&sem.join("course/Algebra-two"), "course", "Algebra");
        container(&twin.join("chapter/Fields"), "chapter", "Fields");

        let mut forest = Forest::new(config.hierarchy.clone());
        let report = TreeReconciler::new(&config).unwrap().reconcile(&mut forest);

        assert_eq!(report.errors.len(), 2, "{:?}", report.errors);
        assert_eq!(report.errors[0].0, copy);
        assert!(matches!(report.errors[0].1, CmanError::DuplicateId { .. }));
        assert_eq!(report.errors[1].0, twin);
        assert!(matches!(report.errors[1].1, CmanError::DuplicateTitle { .. }));

        let algebra = forest.resolve_titles(&["WS24", "Algebra"]).unwrap();
        assert_eq!(forest.node(algebra).unwrap().path(), course.as_path());
        let chapters: Vec<_> = forest
            .children_of(Some(algebra))
            .iter()
            .map(|c| forest.node(*c).unwrap().path().to_path_buf())
            .collect();
        assert_eq!(chapters, vec![course.join("chapter/Groups")]);
        assert_eq!(forest.len(), 3);
    }

    #[test]
    fn test_prunes_vanished_nodes() {
        let root = TempDir::new().unwrap();
        let config = WorkspaceConfig::with_root(root.path());
        sample_tree(&config);

        let reconciler = TreeReconciler::new(&config).unwrap();
        let mut forest = Forest::new(config.hierarchy.clone());
        assert!(reconciler.reconcile(&mut forest).pruned.is_empty());
        assert_eq!(forest.len(), 5);

        let course = config.top_dir().join("WS24/course/Algebra");
        let cosets = course.join("chapter/Groups/lecture/Cosets.tex");
        fs::remove_file(&cosets).unwrap();
        let report = reconciler.reconcile(&mut forest);
        assert_eq!(report.pruned, vec![cosets]);
        assert!(report.added.is_empty());
        assert_eq!(forest.len(), 4);

        fs::remove_dir_all(&course).unwrap();
        let report = reconciler.reconcile(&mut forest);
        assert_eq!(report.pruned, vec![course]);
        assert!(report.is_clean());
        assert_eq!(forest.len(), 1);
    }

    #[test]
    fn test_missing_children_dir_is_pending() {
        let root = TempDir::new().unwrap();
        let config = WorkspaceConfig::with_root(root.path());
        container(&config.top_dir().join("WS24"), "semester", "WS24");

        let mut forest = Forest::new(config.hierarchy.clone());
        let report = TreeReconciler::new(&config).unwrap().reconcile(&mut forest);

        assert!(report.is_clean());
        assert_eq!(report.pending, forest.roots().to_vec());
    }

    #[test]
    fn test_missing_top_dir_is_reported() {
        let root = TempDir::new().unwrap();
        let config = WorkspaceConfig::with_root(root.path());
        let mut forest = Forest::new(config.hierarchy.clone());

        let report = TreeReconciler::new(&config).unwrap().reconcile(&mut forest);
        assert_eq!(report.errors.len(), 1);
        assert!(forest.is_empty());
    }

    #[test]
    fn test_skips_hidden_and_ignored() {
        let root = TempDir::new().unwrap();
        let mut config = WorkspaceConfig::with_root(root.path());
        config.hierarchy = GroupHierarchy::from_names(&["folder", "doc"]).unwrap();
        config.ignore = vec!["*-draft.tex".to_string()];

        let folder = container(&config.top_dir().join("F"), "folder", "F");
        fs::create_dir_all(folder.join("doc")).unwrap();
        for name in ["a.tex", ".hidden.tex", "b-draft.tex", "c.tex"] {
            fs::write(folder.join("doc").join(name), "").unwrap();
        }
        fs::create_dir_all(config.top_dir().join(".git")).unwrap();

        let mut forest = Forest::new(config.hierarchy.clone());
        TreeReconciler::new(&config).unwrap().reconcile(&mut forest);

        let f = forest.resolve_titles(&["F"]).unwrap();
        let docs: Vec<_> = forest
            .children_of(Some(f))
            .iter()
            .map(|c| forest.node(*c).unwrap().title().to_string())
            .collect();
        assert_eq!(docs, vec!["a", "c"]);
        assert_eq!(forest.roots().len(), 1);
    }
}
