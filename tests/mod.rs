//! Main test module for cman
//!
//! This module includes all test suites:
//! - Integration tests for multi-step workspace scenarios
//! - Property-based tests for invariants

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::cman::*;
    use std::fs;
    use tempfile::TempDir;

    fn workspace(root: &TempDir) -> Workspace {
        WorkspaceBuilder::new(root.path())
            .store(Box::new(MemoryConfigStore::new()))
            .init()
            .unwrap()
    }

    #[test]
    fn test_empty_workspace() {
        let root = TempDir::new().unwrap();
        let ws = workspace(&root);

        assert!(ws.forest().is_empty());
        assert!(ws.reconcile_report().is_clean());
        assert!(ws.sync_report().synced.is_empty());
        assert_eq!(
            ws.validate_selection().unwrap().status,
            SelectionStatus::Empty { depth: 0 }
        );
    }

    #[test]
    fn test_titles_with_spaces_and_unicode() {
        let root = TempDir::new().unwrap();
        let mut ws = workspace(&root);

        ws.create("semester", "Winter 2024").unwrap();
        ws.create("course", "Lineare Algebra Ü").unwrap();
        let course = ws.resolve_titles(&["Winter 2024", "Lineare Algebra Ü"]).unwrap();
        assert!(ws.forest().node(course).unwrap().path().is_dir());

        let doc = root.path().join("data/semester/Winter 2024/semester.tex");
        assert!(fs::read_to_string(doc)
            .unwrap()
            .contains("% Lineare Algebra Ü"));
    }

    #[test]
    fn test_titles_with_braces() {
        let root = TempDir::new().unwrap();
        let mut ws = workspace(&root);
        ws.create("semester", "S{1}").unwrap();
        let course = ws.create("course", "a}b").unwrap();

        let doc = root.path().join("data/semester/S{1}/semester.tex");
        let reopened = Workspace::open(
            root.path().to_path_buf(),
            Box::new(MemoryConfigStore::new()),
        )
        .unwrap();
        assert!(reopened.reconcile_report().is_clean());
        assert_eq!(reopened.sync_report().written(), 0);
        assert_eq!(fs::read_to_string(&doc).unwrap().matches("% a}b").count(), 1);

        ws.remove(course).unwrap();
        assert!(!fs::read_to_string(&doc).unwrap().contains("% a}b"));
    }

    #[test]
    fn test_rejects_path_like_titles() {
        let root = TempDir::new().unwrap();
        let mut ws = workspace(&root);

        for title in ["a/b", "..", "", " padded"] {
            let err = ws.create("semester", title).unwrap_err();
            assert!(
                matches!(err.root_cause(), CmanError::InvalidTitle(_)),
                "{:?} gave {}",
                title,
                err
            );
        }
        assert_eq!(fs::read_dir(root.path().join("data/semester")).unwrap().count(), 0);
    }

    #[test]
    fn test_unknown_group_alias() {
        let root = TempDir::new().unwrap();
        let mut ws = workspace(&root);

        assert!(matches!(
            ws.create("module", "X"),
            Err(CmanError::UnknownGroup(_))
        ));
        // aliases resolve to levels
        ws.create("s", "WS24").unwrap();
        ws.create("co", "Algebra").unwrap();
        assert_eq!(ws.current(1).unwrap().as_deref(), Some("Algebra"));
    }

    #[test]
    fn test_missing_template_leaves_no_node() {
        let root = TempDir::new().unwrap();
        let mut ws = workspace(&root);
        fs::remove_file(root.path().join("data/templates/semester.json")).unwrap();

        let err = ws.create("semester", "WS24").unwrap_err();
        assert!(matches!(err.root_cause(), CmanError::TemplateRead { .. }));
        assert!(ws.forest().is_empty());
        assert!(!root.path().join("data/semester/WS24").exists());
    }
}
