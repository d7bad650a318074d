//! Property-based testing for cman
//!
//! Uses proptest to check the managed-region protocol and the forest
//! invariants across randomly generated documents and trees.

use ::cman::*;
use proptest::prelude::*;
use std::path::{Path, PathBuf};

/// Child titles: unique printable text, braces included, never padded
fn titles_strategy() -> impl Strategy<Value = Vec<String>> {
    let title = prop_oneof![
        "\\PC{1,12}",
        "[a-z]{0,3}[{}][a-z{} ]{0,4}[a-z}]",
    ]
    .prop_filter("no padding or tag separator", |t: &String| {
        !t.is_empty() && t.trim() == t && !t.contains(" % ")
    });
    prop::collection::btree_set(title, 0..6).prop_map(|set| set.into_iter().collect())
}

/// Lines a user might put around and inside the managed region
fn user_line_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        "[a-z ]{1,20}".prop_map(|s| s),
        "\\\\input\\{[a-z]{1,8}\\.tex\\}".prop_map(|s| s),
        "% [a-z]{1,10}".prop_map(|s| s),
    ]
}

/// A composite document: prefix lines, marker, untagged includes, suffix lines
fn document_strategy() -> impl Strategy<Value = String> {
    (
        prop::collection::vec(user_line_strategy(), 0..4),
        prop::collection::vec("[a-z]{1,8}".prop_map(|s| format!("\\input{{{s}.tex}}")), 0..3),
        prop::collection::vec(user_line_strategy(), 0..4),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(before, includes, after, trailing_newline, crlf)| {
            let eol = if crlf { "\r\n" } else { "\n" };
            let mut lines = vec!["% COMPOSITE".to_string()];
            lines.extend(before.into_iter().filter(|l| l.trim() != "% INPUT"));
            lines.push("% INPUT".to_string());
            lines.extend(includes);
            lines.push("\\end{document}".to_string());
            lines.extend(after);
            let mut text = lines.join(eol);
            if trailing_newline {
                text.push_str(eol);
            }
            text
        })
}

fn directives(region: &ManagedRegion<'_>, titles: &[String]) -> Vec<composite::Directive> {
    titles
        .iter()
        .map(|t| region.directive(&PathBuf::from(format!("/notes/{t}.tex")), t))
        .collect()
}

fn managed_lines(region: &ManagedRegion<'_>, text: &str) -> Vec<String> {
    text.lines()
        .skip_while(|l| l.trim() != "% INPUT")
        .skip(1)
        .take_while(|l| region.is_include(l))
        .filter(|l| region.tag_of(l).is_some())
        .map(|l| l.trim().to_string())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_sync_is_idempotent(doc in document_strategy(), titles in titles_strategy()) {
        let config = CompositeConfig::default();
        let region = ManagedRegion::new(&config);
        let expected = directives(&region, &titles);
        let path = Path::new("/notes/composite.tex");

        let once = region.sync(path, &doc, &expected).unwrap();
        let twice = region.sync(path, &once.text, &expected).unwrap();
        prop_assert_eq!(&once.text, &twice.text);
        prop_assert!(twice.added.is_empty());
        prop_assert!(twice.removed.is_empty());

        // exactly one tagged line per child, in child order
        let lines = managed_lines(&region, &once.text);
        let wanted: Vec<_> = expected.iter().map(|d| d.line.clone()).collect();
        prop_assert_eq!(lines, wanted);
    }

    #[test]
    fn prop_sync_only_touches_the_run(doc in document_strategy(), titles in titles_strategy()) {
        let config = CompositeConfig::default();
        let region = ManagedRegion::new(&config);
        let out = region
            .sync(Path::new("/c.tex"), &doc, &directives(&region, &titles))
            .unwrap();

        let untagged = |text: &str| -> Vec<String> {
            text.lines()
                .filter(|l| region.tag_of(l).is_none())
                .map(str::to_string)
                .collect()
        };
        prop_assert_eq!(untagged(&doc), untagged(&out.text));
        prop_assert_eq!(doc.ends_with('\n'), out.text.ends_with('\n'));
    }

    #[test]
    fn prop_add_then_remove_restores(doc in document_strategy(), titles in titles_strategy()) {
        prop_assume!(!titles.is_empty());
        let config = CompositeConfig::default();
        let region = ManagedRegion::new(&config);
        let path = Path::new("/c.tex");

        let base = region.sync(path, &doc, &[]).unwrap().text;
        let all = directives(&region, &titles);
        let added = region.sync(path, &base, &all).unwrap().text;

        let mut text = added;
        for title in titles.iter().rev() {
            text = region.remove(path, &text, title).unwrap();
        }
        prop_assert_eq!(text, base);
    }

    #[test]
    fn prop_attach_never_crosses_levels(parent_depth in 0usize..4, child_depth in 0usize..4) {
        let mut forest = Forest::new(GroupHierarchy::default());
        let names = ["semester", "course", "chapter", "lecture"];

        // build a chain down to parent_depth
        let mut parent = None;
        for (depth, name) in names.iter().enumerate().take(parent_depth + 1) {
            let node = forest
                .insert(parent, name, &format!("N{depth}"), format!("/n/{depth}"), NodeId::generate())
                .unwrap();
            parent = Some(node);
        }

        let child = forest
            .create_node(names[child_depth], "Child", "/n/child", NodeId::generate())
            .unwrap();
        let result = forest.attach(child, parent);

        if child_depth == parent_depth + 1 {
            prop_assert!(result.is_ok());
        } else {
            let is_depth_mismatch = matches!(result, Err(CmanError::DepthMismatch { .. }));
            prop_assert!(is_depth_mismatch);
            prop_assert!(forest.children_of(parent).is_empty());
        }
    }

    #[test]
    fn prop_placeholders_leave_unknown_tokens(name in "[a-z]{1,8}", value in "[A-Za-z %]{0,12}") {
        let mut table = Placeholders::default();
        table.insert("title", &value);
        let text = format!("%%title%% %%{name}x%%");
        let out = table.substitute(&text, "%%").unwrap();
        prop_assert_eq!(out, format!("{value} %%{name}x%%"));
    }
}
