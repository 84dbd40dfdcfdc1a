//! Metadata index tests

use super::*;
use crate::types::{GitSnapshotRef, SnapshotId, SnapshotMetadata};
use chrono::{Duration, Utc};
use std::path::PathBuf;

fn meta(id: &str, instruction: &str) -> SnapshotMetadata {
    SnapshotMetadata::new(SnapshotId::from_string(id), instruction)
}

fn ids(results: Vec<&SnapshotMetadata>) -> Vec<&str> {
    results.into_iter().map(|m| m.id.as_str()).collect()
}

#[test]
fn test_extract_keywords() {
    let words = extract_keywords("Add JWT auth to the login-form, fix it");
    assert!(words.contains("jwt"));
    assert!(words.contains("auth"));
    assert!(words.contains("login"));
    assert!(words.contains("form"));
    assert!(words.contains("fix"));
    assert!(!words.contains("the"));
    assert!(!words.contains("to"));
}

#[test]
fn test_newest_first_breaks_ties_by_insertion() {
    let mut index = SnapshotIndex::new();
    let now = Utc::now();
    for id in ["aaaa0001", "aaaa0002", "aaaa0003"] {
        let mut m = meta(id, "same time");
        m.timestamp = now;
        index.insert(m);
    }
    assert_eq!(
        ids(index.newest_first()),
        vec!["aaaa0003", "aaaa0002", "aaaa0001"]
    );
    assert_eq!(index.latest().map(|m| m.id.as_str()), Some("aaaa0003"));
}

#[test]
fn test_search_filters_combine() {
    let mut index = SnapshotIndex::new();
    index.insert(meta("aaaa0001", "Add auth middleware").with_author("ana").with_session("s1"));
    index.insert(meta("aaaa0002", "Fix auth bug").with_author("bo").with_session("s1"));
    index.insert(meta("aaaa0003", "Refactor parser").with_author("ana").with_session("s2"));

    let auth = index.search(&SnapshotQuery::new().with_keyword("auth"));
    assert_eq!(ids(auth), vec!["aaaa0002", "aaaa0001"]);

    let ana_auth = index.search(&SnapshotQuery::new().with_keyword("AUTH").with_author("ana"));
    assert_eq!(ids(ana_auth), vec!["aaaa0001"]);

    let session = index.search(&SnapshotQuery::new().with_session("s1").with_limit(1));
    assert_eq!(ids(session), vec!["aaaa0002"]);

    assert!(index.search(&SnapshotQuery::new().with_keyword("missing")).is_empty());
}

#[test]
fn test_search_short_keyword_falls_back_to_substring() {
    let mut index = SnapshotIndex::new();
    index.insert(meta("aaaa0001", "Use Go modules"));
    index.insert(meta("aaaa0002", "Rename files"));
    assert_eq!(
        ids(index.search(&SnapshotQuery::new().with_keyword("go"))),
        vec!["aaaa0001"]
    );
}

#[test]
fn test_search_by_time_and_path() {
    let mut index = SnapshotIndex::new();
    let now = Utc::now();
    let mut old = meta("aaaa0001", "old change");
    old.timestamp = now - Duration::hours(2);
    old.modified_files.insert(PathBuf::from("src/a.rs"));
    let mut recent = meta("aaaa0002", "recent change");
    recent.timestamp = now;
    index.insert(old);
    index.insert(recent);

    let since = index.search(&SnapshotQuery::new().between(Some(now - Duration::hours(1)), None));
    assert_eq!(ids(since), vec!["aaaa0002"]);

    let touching = index.search(&SnapshotQuery::new().touching("src/a.rs"));
    assert_eq!(ids(touching), vec!["aaaa0001"]);
}

#[test]
fn test_update_reindexes() {
    let mut index = SnapshotIndex::new();
    let id = SnapshotId::from_string("aaaa0001");
    index.insert(meta("aaaa0001", "first draft"));

    index
        .update(&id, |m| {
            m.instruction = "second attempt".to_string();
            m.tags.push("keep".to_string());
        })
        .unwrap();

    assert!(index.search(&SnapshotQuery::new().with_keyword("draft")).is_empty());
    assert_eq!(ids(index.search(&SnapshotQuery::new().with_keyword("attempt"))), vec!["aaaa0001"]);
    assert_eq!(ids(index.search(&SnapshotQuery::new().with_tag("keep"))), vec!["aaaa0001"]);
    assert_eq!(index.tags(), vec!["keep".to_string()]);

    let err = index
        .update(&SnapshotId::from_string("ffff0000"), |_| {})
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_remove_clears_postings() {
    let mut index = SnapshotIndex::new();
    let mut m = meta("aaaa0001", "tagged change");
    m.tags.push("wip".to_string());
    index.insert(m);

    assert!(index.remove(&SnapshotId::from_string("aaaa0001")).is_some());
    assert!(index.is_empty());
    assert!(index.tags().is_empty());
    assert!(index.newest_first().is_empty());
    assert!(index.remove(&SnapshotId::from_string("aaaa0001")).is_none());
}

#[test]
fn test_prefix_and_commit_lookup() {
    let mut index = SnapshotIndex::new();
    index.insert(meta("abcd0001", "one"));
    index.insert(meta("abcd0002", "two"));
    index.insert(
        meta("ef010003", "three").with_git(GitSnapshotRef {
            commit_hash: "c0ffee".to_string(),
            branch_name: "rewind/x".to_string(),
        }),
    );

    assert_eq!(index.ids_with_prefix("abcd").len(), 2);
    assert_eq!(index.ids_with_prefix("ef01").len(), 1);
    assert!(index.ids_with_prefix("zz").is_empty());
    assert_eq!(
        index.by_commit("c0ffee").map(|m| m.id.as_str()),
        Some("ef010003")
    );
}
