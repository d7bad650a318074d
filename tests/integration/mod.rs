//! Integration tests for cman
//!
//! Multi-step scenarios against a real directory tree and a JSON config
//! store, including edits made behind the library's back.

use ::cman::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::info;

/// Workspace plus the temporary directories backing it
pub struct WorkspaceHarness {
    pub root: TempDir,
    pub config_dir: TempDir,
    pub workspace: Workspace,
}

impl WorkspaceHarness {
    /// Initialize a default four-level workspace
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        let config_dir = TempDir::new().unwrap();
        let store = JsonConfigStore::new(config_dir.path().join("config.json"));
        let workspace = Workspace::init(root.path().to_path_buf(), Box::new(store)).unwrap();
        Self {
            root,
            config_dir,
            workspace,
        }
    }

    /// Open the same workspace again with the same config file
    pub fn reopen(&mut self) {
        let store = JsonConfigStore::new(self.config_path());
        self.workspace = Workspace::open(self.root.path().to_path_buf(), Box::new(store)).unwrap();
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.path().join("config.json")
    }

    pub fn data(&self, rel: &str) -> PathBuf {
        self.root.path().join("data/semester").join(rel)
    }

    /// Create a full semester/course/chapter/lecture chain
    pub fn chain(&mut self, sem: &str, course: &str, chapter: &str, lectures: &[&str]) {
        self.workspace.select_or_create("semester", sem);
        self.workspace.select_or_create("course", course);
        self.workspace.select_or_create("chapter", chapter);
        for lecture in lectures {
            self.workspace.create("lecture", lecture).unwrap();
        }
    }
}

trait SelectOrCreate {
    fn select_or_create(&mut self, group: &str, title: &str);
}

impl SelectOrCreate for Workspace {
    fn select_or_create(&mut self, group: &str, title: &str) {
        if self.select(group, title).is_err() {
            self.create(group, title).unwrap();
        }
    }
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

#[test]
fn test_full_lifecycle_with_json_store() {
    let mut h = WorkspaceHarness::new();
    h.chain("WS24", "Algebra", "Groups", &["Intro", "Cosets"]);
    h.chain("WS24", "Algebra", "Rings", &["Ideals"]);
    h.chain("SS25", "Topology", "Spaces", &[]);
    info!("Built {} nodes", h.workspace.forest().len());

    // selection survives in the JSON file
    let stored: serde_json::Value = serde_json::from_str(&read(&h.config_path())).unwrap();
    assert_eq!(stored["current-semester"], "SS25");
    assert_eq!(stored["current-chapter"], "Spaces");
    assert_eq!(stored["current-lecture"], "");

    h.reopen();
    assert_eq!(h.workspace.forest().len(), 10);
    assert!(h.workspace.reconcile_report().is_clean());
    assert_eq!(h.workspace.sync_report().written(), 0);
    assert_eq!(
        h.workspace.validate_selection().unwrap().status,
        SelectionStatus::Empty { depth: 3 }
    );

    let algebra = h.data("WS24/course/Algebra/course.tex");
    let text = read(&algebra);
    let groups = text.find("% Groups").unwrap();
    let rings = text.find("% Rings").unwrap();
    assert!(groups < rings);
}

#[test]
fn test_externally_added_directory_is_migrated_and_included() {
    let mut h = WorkspaceHarness::new();
    h.chain("WS24", "Algebra", "Groups", &["Intro"]);

    // a chapter copied in by hand, without sidecar, with its own composite
    let manual = h.data("WS24/course/Algebra/chapter/Fields");
    fs::create_dir_all(manual.join("lecture")).unwrap();
    fs::write(
        manual.join("chapter.tex"),
        "% COMPOSITE\n\\section*{Fields}\n% INPUT\n",
    )
    .unwrap();
    fs::write(manual.join("lecture/Galois.tex"), "\\subsection*{Galois}\n").unwrap();

    h.reopen();
    let report = h.workspace.reconcile_report();
    assert_eq!(report.migrated, vec![manual.clone()]);
    assert!(manual.join("info.json").is_file());

    let course_doc = read(&h.data("WS24/course/Algebra/course.tex"));
    assert!(course_doc.contains(&format!(
        "\\input{{{}}} % Fields",
        manual.join("chapter.tex").display()
    )));
    let chapter_doc = read(&manual.join("chapter.tex"));
    assert!(chapter_doc.contains("% Galois"));

    // the migrated id is stable from now on
    let id = h
        .workspace
        .forest()
        .node(h.workspace.resolve_titles(&["WS24", "Algebra", "Fields"]).unwrap())
        .unwrap()
        .id()
        .clone();
    h.reopen();
    let again = h
        .workspace
        .forest()
        .node(h.workspace.resolve_titles(&["WS24", "Algebra", "Fields"]).unwrap())
        .unwrap()
        .id()
        .clone();
    assert_eq!(id, again);
    assert!(h.workspace.reconcile_report().migrated.is_empty());
}

#[test]
fn test_deleted_directory_invalidates_selection() {
    let mut h = WorkspaceHarness::new();
    h.chain("WS24", "Algebra", "Groups", &["Intro"]);
    h.workspace.select("semester", "WS24").unwrap();
    h.workspace.create("course", "Analysis").unwrap();

    fs::remove_dir_all(h.data("WS24/course/Analysis")).unwrap();
    h.reopen();

    let validation = h.workspace.validate_selection().unwrap();
    assert_eq!(
        validation.status,
        SelectionStatus::Invalid {
            depth: 1,
            stored: Some("Analysis".to_string())
        }
    );
    assert_eq!(validation.first_invalid(), Some(1));

    // the stale include line was dropped on open
    let sem_doc = read(&h.data("WS24/semester.tex"));
    assert!(!sem_doc.contains("% Analysis"));
    assert!(sem_doc.contains("% Algebra"));

    // creating below the stale selection is refused
    let err = h.workspace.create("chapter", "Limits").unwrap_err();
    assert!(matches!(err, CmanError::SelectionIncomplete { ref group } if group == "course"));
}

#[test]
fn test_remove_top_level_with_subtree() {
    let mut h = WorkspaceHarness::new();
    h.chain("WS24", "Algebra", "Groups", &["Intro", "Cosets"]);
    h.chain("SS25", "Topology", "Spaces", &[]);

    let ws24 = h.workspace.resolve_titles(&["WS24"]).unwrap();
    let removed = h.workspace.remove(ws24).unwrap();
    assert_eq!(removed.len(), 5);
    assert!(!h.data("WS24").exists());
    assert!(h.data("SS25").exists());

    // selection pointed at SS25, so it is untouched
    assert_eq!(h.workspace.current(0).unwrap().as_deref(), Some("SS25"));
    assert_eq!(h.workspace.forest().len(), 3);
}

#[test]
fn test_user_lines_in_composite_survive_changes() {
    let mut h = WorkspaceHarness::new();
    h.chain("WS24", "Algebra", "Groups", &["Intro"]);

    let chapter_doc = h.data("WS24/course/Algebra/chapter/Groups/chapter.tex");
    let text = read(&chapter_doc).replace(
        "% INPUT\n",
        "% INPUT\n\\input{notation.tex}\n",
    ) + "\\bibliography{refs}\n";
    fs::write(&chapter_doc, &text).unwrap();

    h.workspace.create("lecture", "Cosets").unwrap();
    let intro = h.workspace.find("lecture", "Intro").unwrap();
    h.workspace.remove(intro).unwrap();

    let after = read(&chapter_doc);
    assert!(after.contains("% INPUT\n\\input{notation.tex}\n"));
    assert!(after.ends_with("\\bibliography{refs}\n"));
    assert!(after.contains("% Cosets"));
    assert!(!after.contains("% Intro"));
}
