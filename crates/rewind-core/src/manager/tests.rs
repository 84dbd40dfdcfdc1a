//! Snapshot manager tests

use super::*;
use crate::config::RewindConfig;
use crate::git::GitSessionState;
use crate::git::testing::{ScriptedGit, fail, ok};
use crate::metadata::SnapshotQuery;
use crate::monitor::ToolDescriptor;
use crate::types::{
    ListOptions, RestoreOptions, RestorePreview, SnapshotId, SnapshotMetadata, SnapshotMode,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const HEAD: &str = "1111111111111111111111111111111111111111";

fn file_manager(dir: &TempDir) -> SnapshotManager {
    SnapshotManager::new(RewindConfig::new(dir.path()).without_git()).unwrap()
}

fn git_manager(dir: &TempDir, git: &Arc<ScriptedGit>) -> SnapshotManager {
    SnapshotManager::with_git_runner(RewindConfig::new(dir.path()), git.clone()).unwrap()
}

fn write(dir: &TempDir, path: &str, content: &str) {
    let full = dir.path().join(path);
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(full, content).unwrap();
}

fn read(dir: &TempDir, path: &str) -> Option<String> {
    std::fs::read_to_string(dir.path().join(path)).ok()
}

#[tokio::test]
async fn test_restore_file_mode_round_trip() {
    let dir = TempDir::new().unwrap();
    let manager = file_manager(&dir);
    write(&dir, "src/a.js", "v1");

    let snapshot = manager.create_snapshot("add auth").await.unwrap();
    assert_eq!(snapshot.mode(), SnapshotMode::File);
    assert!(manager.backup_file_if_needed("src/a.js").await.unwrap());
    assert!(manager.backup_file_if_needed("new.js").await.unwrap());

    write(&dir, "src/a.js", "v2 with auth");
    write(&dir, "new.js", "created by the instruction");

    let result = manager
        .restore_snapshot(snapshot.id().as_str(), RestoreOptions::all())
        .await
        .unwrap();
    assert!(result.is_success());
    assert_eq!(result.restored_count(), 2);
    assert_eq!(read(&dir, "src/a.js").as_deref(), Some("v1"));
    assert!(read(&dir, "new.js").is_none());
}

#[tokio::test]
async fn test_backup_once_per_snapshot() {
    let dir = TempDir::new().unwrap();
    let manager = file_manager(&dir);
    write(&dir, "a.js", "v1");

    manager.create_snapshot("edit").await.unwrap();
    assert!(manager.backup_file_if_needed("a.js").await.unwrap());
    write(&dir, "a.js", "v2 edited");
    assert!(!manager.backup_file_if_needed("a.js").await.unwrap());

    let active = manager.active_snapshot().await.unwrap();
    let snapshot = manager.get_snapshot(active.id.as_str()).await.unwrap();
    assert_eq!(snapshot.file_text("a.js"), Some("v1"));
}

#[tokio::test]
async fn test_absolute_paths_are_normalized() {
    let dir = TempDir::new().unwrap();
    let manager = file_manager(&dir);
    write(&dir, "a.js", "v1");

    manager.create_snapshot("edit").await.unwrap();
    assert!(manager.backup_file_if_needed(dir.path().join("a.js")).await.unwrap());
    assert!(!manager.backup_file_if_needed("./a.js").await.unwrap());

    let active = manager.active_snapshot().await.unwrap();
    assert!(active.tracks(Path::new("a.js")));

    let outside = manager.backup_file_if_needed("/definitely/elsewhere.js").await;
    assert!(outside.is_err());
    let escaping = manager.backup_file_if_needed("../up.js").await;
    assert!(escaping.is_err());
}

#[tokio::test]
async fn test_backup_requires_active_snapshot() {
    let dir = TempDir::new().unwrap();
    let manager = file_manager(&dir);
    write(&dir, "a.js", "v1");

    let result = manager.backup_file_if_needed("a.js").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_empty_active_snapshot_is_reused() {
    let dir = TempDir::new().unwrap();
    let manager = file_manager(&dir);

    let first = manager.create_snapshot("add auth").await.unwrap();
    let second = manager.create_snapshot("add auth with tests").await.unwrap();
    assert_eq!(first.id(), second.id());
    assert_eq!(second.instruction(), "add auth with tests");

    let listed = manager.list_snapshots(ListOptions::all()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].instruction, "add auth with tests");
    assert_eq!(manager.capacity().await.snapshot_count, 1);
}

#[tokio::test]
async fn test_unchanged_content_is_referenced() {
    let dir = TempDir::new().unwrap();
    let manager = file_manager(&dir);
    write(&dir, "a.js", "shared content");

    manager.create_snapshot("first").await.unwrap();
    manager.backup_file_if_needed("a.js").await.unwrap();
    let second = manager.create_snapshot("second").await.unwrap();
    manager.backup_file_if_needed("a.js").await.unwrap();

    let capacity = manager.capacity().await;
    assert_eq!(capacity.snapshot_count, 2);
    assert_eq!(capacity.unique_blobs, 1);

    write(&dir, "a.js", "rewritten by second");
    manager
        .restore_snapshot(second.id().as_str(), RestoreOptions::all())
        .await
        .unwrap();
    assert_eq!(read(&dir, "a.js").as_deref(), Some("shared content"));
}

#[tokio::test]
async fn test_preview_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let manager = file_manager(&dir);
    write(&dir, "a.js", "v1");
    write(&dir, "same.js", "unchanged");

    let snapshot = manager.create_snapshot("edit").await.unwrap();
    manager
        .backup_files_if_needed(&["a.js", "same.js", "b.js"])
        .await
        .unwrap();
    write(&dir, "a.js", "v2 edited");
    write(&dir, "b.js", "created");

    let result = manager
        .restore_snapshot(snapshot.id().as_str(), RestoreOptions::preview())
        .await
        .unwrap();
    assert!(result.was_preview);
    assert!(result.preview.contains(&RestorePreview::WillOverwrite(PathBuf::from("a.js"))));
    assert!(result.preview.contains(&RestorePreview::WillDelete(PathBuf::from("b.js"))));
    assert!(result.preview.contains(&RestorePreview::NoChange(PathBuf::from("same.js"))));
    assert_eq!(result.restored_count(), 2);

    assert_eq!(read(&dir, "a.js").as_deref(), Some("v2 edited"));
    assert_eq!(read(&dir, "b.js").as_deref(), Some("created"));
}

#[tokio::test]
async fn test_restore_with_file_filter() {
    let dir = TempDir::new().unwrap();
    let manager = file_manager(&dir);
    write(&dir, "a.js", "a1");
    write(&dir, "b.js", "b1");

    let snapshot = manager.create_snapshot("edit both").await.unwrap();
    manager.backup_files_if_needed(&["a.js", "b.js"]).await.unwrap();
    write(&dir, "a.js", "a2 edited");
    write(&dir, "b.js", "b2 edited");

    let result = manager
        .restore_snapshot(
            snapshot.id().as_str(),
            RestoreOptions::all().with_files([PathBuf::from("a.js")]),
        )
        .await
        .unwrap();
    assert_eq!(result.restored_files, vec![PathBuf::from("a.js")]);
    assert_eq!(read(&dir, "a.js").as_deref(), Some("a1"));
    assert_eq!(read(&dir, "b.js").as_deref(), Some("b2 edited"));
}

#[tokio::test]
async fn test_batch_backup_report() {
    let dir = TempDir::new().unwrap();
    let manager = file_manager(&dir);
    write(&dir, "a.js", "a");
    write(&dir, "b.js", "bb");

    manager.create_snapshot("batch").await.unwrap();
    let report = manager
        .backup_files_if_needed(&["a.js", "b.js", "a.js", "../outside.js"])
        .await
        .unwrap();
    assert_eq!(
        report.backed_up,
        vec![PathBuf::from("a.js"), PathBuf::from("b.js")]
    );
    assert_eq!(report.failed.len(), 1);
    assert!(!report.is_success());

    let again = manager.backup_files_if_needed(&["a.js", "c.js"]).await.unwrap();
    assert_eq!(again.skipped, vec![PathBuf::from("a.js")]);
    assert_eq!(again.backed_up, vec![PathBuf::from("c.js")]);
}

#[tokio::test]
async fn test_eviction_removes_oldest_from_index() {
    let dir = TempDir::new().unwrap();
    let manager =
        SnapshotManager::new(RewindConfig::new(dir.path()).without_git().with_max_snapshots(2))
            .unwrap();

    let mut ids = Vec::new();
    for (i, content) in ["one", "two!", "three"].iter().enumerate() {
        write(&dir, "a.js", content);
        let snapshot = manager.create_snapshot(&format!("step {}", i)).await.unwrap();
        manager.backup_file_if_needed("a.js").await.unwrap();
        ids.push(snapshot.id().clone());
    }

    let listed = manager.list_snapshots(ListOptions::all()).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(
        manager
            .resolve_snapshot_id(ids[0].as_str())
            .await
            .unwrap_err()
            .is_not_found()
    );

    write(&dir, "a.js", "later edit");
    manager
        .restore_snapshot(ids[1].as_str(), RestoreOptions::all())
        .await
        .unwrap();
    assert_eq!(read(&dir, "a.js").as_deref(), Some("two!"));
}

#[tokio::test]
async fn test_resolve_prefixes() {
    let dir = TempDir::new().unwrap();
    let manager = file_manager(&dir);
    {
        let mut state = manager.state.lock().await;
        for id in ["abc111", "abc222", "def333"] {
            state
                .index
                .insert(SnapshotMetadata::new(SnapshotId::from_string(id), "x"));
        }
    }

    assert_eq!(manager.resolve_snapshot_id("abc1").await.unwrap().as_str(), "abc111");
    assert_eq!(manager.resolve_snapshot_id("def333").await.unwrap().as_str(), "def333");

    let ambiguous = manager.resolve_snapshot_id("abc").await.unwrap_err();
    assert!(ambiguous.is_ambiguous());
    assert!(ambiguous.to_string().contains("abc111"));
    assert!(ambiguous.to_string().contains("abc222"));

    let missing = manager.resolve_snapshot_id("zzz").await.unwrap_err();
    assert!(missing.is_not_found());
    assert!(!missing.is_ambiguous());
}

#[tokio::test]
async fn test_delete_snapshot_keeps_later_restorable() {
    let dir = TempDir::new().unwrap();
    let manager = file_manager(&dir);
    write(&dir, "a.js", "kept");

    let first = manager.create_snapshot("first").await.unwrap();
    manager.backup_file_if_needed("a.js").await.unwrap();
    let second = manager.create_snapshot("second").await.unwrap();
    manager.backup_file_if_needed("a.js").await.unwrap();

    let report = manager.delete_snapshot(first.id().as_str()).await.unwrap();
    assert_eq!(report.evicted, vec![first.id().clone()]);
    assert!(report.warnings.is_empty());

    write(&dir, "a.js", "changed later");
    manager
        .restore_snapshot(second.id().as_str(), RestoreOptions::all())
        .await
        .unwrap();
    assert_eq!(read(&dir, "a.js").as_deref(), Some("kept"));
}

#[tokio::test]
async fn test_delete_prunes_mirrored_blobs() {
    let dir = TempDir::new().unwrap();
    let manager =
        SnapshotManager::new(RewindConfig::new(dir.path()).without_git().with_mirror()).unwrap();
    write(&dir, "a.js", "one");

    let first = manager.create_snapshot("first").await.unwrap();
    manager.backup_file_if_needed("a.js").await.unwrap();
    write(&dir, "a.js", "two, longer");
    let second = manager.create_snapshot("second").await.unwrap();
    manager.backup_file_if_needed("a.js").await.unwrap();

    let blob = |checksum: &str| dir.path().join(format!(".rewind/cache/{}.gz", checksum));
    let mut sums = Vec::new();
    for id in [first.id(), second.id()] {
        let snapshot = manager.get_snapshot(id.as_str()).await.unwrap();
        sums.push(snapshot.metadata.file_checksums[Path::new("a.js")].clone());
    }
    let (first_sum, second_sum) = (&sums[0], &sums[1]);
    assert!(blob(first_sum).exists());

    manager.delete_snapshot(first.id().as_str()).await.unwrap();
    assert!(!blob(first_sum).exists());
    assert!(blob(second_sum).exists());
}

#[tokio::test]
async fn test_tag_and_search() {
    let dir = TempDir::new().unwrap();
    let manager = file_manager(&dir);
    write(&dir, "a.js", "v1");

    let snapshot = manager.create_snapshot("refactor login handler").await.unwrap();
    manager.backup_file_if_needed("a.js").await.unwrap();
    manager
        .tag_snapshot(snapshot.id().short(), "milestone")
        .await
        .unwrap();
    assert!(manager.tag_snapshot(snapshot.id().as_str(), "two words").await.is_err());

    let hits = manager
        .search_snapshots(&SnapshotQuery::new().with_keyword("login"))
        .await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].tags, vec!["milestone".to_string()]);

    let by_session = manager
        .search_snapshots(&SnapshotQuery::new().with_session(manager.session_id()))
        .await;
    assert_eq!(by_session.len(), 1);
}

#[tokio::test]
async fn test_changed_files() {
    let dir = TempDir::new().unwrap();
    let manager = file_manager(&dir);
    write(&dir, "a.js", "v1");

    let first = manager.changed_files(&[PathBuf::from("a.js")]).await.unwrap();
    assert_eq!(first.get(Path::new("a.js")), Some(&true));
    let second = manager.changed_files(&[PathBuf::from("a.js")]).await.unwrap();
    assert_eq!(second.get(Path::new("a.js")), Some(&false));

    write(&dir, "a.js", "v2 is longer");
    let third = manager.changed_files(&[PathBuf::from("a.js")]).await.unwrap();
    assert_eq!(third.get(Path::new("a.js")), Some(&true));
}

#[tokio::test]
async fn test_git_mode_snapshot() {
    let dir = TempDir::new().unwrap();
    let git = Arc::new(ScriptedGit::repo());
    let manager = git_manager(&dir, &git);
    write(&dir, "a.js", "v1");

    let snapshot = manager.create_snapshot("add auth").await.unwrap();
    assert_eq!(snapshot.mode(), SnapshotMode::Git);
    let git_ref = snapshot.metadata.git.clone().unwrap();
    assert_eq!(git_ref.commit_hash, HEAD);
    assert!(git_ref.branch_name.starts_with("rewind/"));
    assert!(git.called(&["checkout", "-b"]));

    assert!(manager.backup_file_if_needed("a.js").await.unwrap());
    let active = manager.active_snapshot().await.unwrap();
    assert!(active.file_checksums.contains_key(Path::new("a.js")));
    assert_eq!(manager.capacity().await.snapshot_count, 0);

    let status = manager.git_status().await;
    assert!(status.git_available);
    assert_eq!(status.state, GitSessionState::FeatureBranchActive);
    assert_eq!(status.original_branch.as_deref(), Some("main"));
}

#[tokio::test]
async fn test_git_failure_degrades_to_file_mode() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let dir = TempDir::new().unwrap();
    let git = Arc::new(ScriptedGit::repo());
    git.on(&["checkout", "-b"], fail(128, "fatal: cannot lock ref"));
    let manager = git_manager(&dir, &git);
    write(&dir, "a.js", "v1");

    let snapshot = manager.create_snapshot("add auth").await.unwrap();
    assert_eq!(snapshot.mode(), SnapshotMode::File);
    assert_eq!(manager.git_status().await.state, GitSessionState::FileOnly);

    manager.backup_file_if_needed("a.js").await.unwrap();
    write(&dir, "a.js", "v2 edited");
    manager
        .restore_snapshot(snapshot.id().as_str(), RestoreOptions::all())
        .await
        .unwrap();
    assert_eq!(read(&dir, "a.js").as_deref(), Some("v1"));
}

#[tokio::test]
async fn test_failed_commit_returns_to_original_branch() {
    let dir = TempDir::new().unwrap();
    let git = Arc::new(ScriptedGit::repo());
    git.on(&["status", "--porcelain"], ok(" M a.js\0"));
    git.on(&["commit"], fail(128, "Author identity unknown\n*** Please tell me who you are."));
    let manager = git_manager(&dir, &git);
    write(&dir, "a.js", "v1");

    let snapshot = manager.create_snapshot("add auth").await.unwrap();
    assert_eq!(snapshot.mode(), SnapshotMode::File);
    assert!(git.called(&["checkout", "-b"]));
    assert!(git.called(&["checkout", "main"]));

    let status = manager.git_status().await;
    assert_eq!(status.state, GitSessionState::FileOnly);
    assert_eq!(status.feature_branch, None);

    manager.backup_file_if_needed("a.js").await.unwrap();
    let active = manager.active_snapshot().await.unwrap();
    assert!(active.tracks(Path::new("a.js")));
}

#[tokio::test]
async fn test_missing_git_uses_file_mode() {
    let dir = TempDir::new().unwrap();
    let git = Arc::new(ScriptedGit::missing());
    let manager = git_manager(&dir, &git);

    manager.start().await.unwrap();
    let snapshot = manager.create_snapshot("add auth").await.unwrap();
    assert_eq!(snapshot.mode(), SnapshotMode::File);
    assert!(!manager.git_status().await.git_available);
}

#[tokio::test]
async fn test_git_restore_resets_to_commit() {
    let dir = TempDir::new().unwrap();
    let git = Arc::new(ScriptedGit::repo());
    let manager = git_manager(&dir, &git);

    let snapshot = manager.create_snapshot("add auth").await.unwrap();
    git.on(&["diff", "--name-status"], ok("M\ta.js\nA\tb.js\n"));

    let preview = manager
        .restore_snapshot(snapshot.id().as_str(), RestoreOptions::preview())
        .await
        .unwrap();
    assert_eq!(
        preview.preview,
        vec![
            RestorePreview::WillOverwrite(PathBuf::from("a.js")),
            RestorePreview::WillDelete(PathBuf::from("b.js")),
        ]
    );
    assert!(!git.called(&["reset"]));

    let result = manager
        .restore_snapshot(snapshot.id().as_str(), RestoreOptions::all())
        .await
        .unwrap();
    assert_eq!(result.mode, SnapshotMode::Git);
    assert_eq!(result.restored_count(), 2);
    assert!(git.called(&["reset", "--hard", HEAD]));
}

#[tokio::test]
async fn test_git_restore_of_vanished_commit_fails() {
    let dir = TempDir::new().unwrap();
    let git = Arc::new(ScriptedGit::repo());
    let manager = git_manager(&dir, &git);

    let snapshot = manager.create_snapshot("add auth").await.unwrap();
    git.once(&["cat-file"], fail(128, "fatal: Not a valid object name"));

    let err = manager
        .restore_snapshot(snapshot.id().as_str(), RestoreOptions::all())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(!git.called(&["reset"]));
}

#[tokio::test]
async fn test_git_snapshot_cannot_be_deleted() {
    let dir = TempDir::new().unwrap();
    let git = Arc::new(ScriptedGit::repo());
    let manager = git_manager(&dir, &git);

    let snapshot = manager.create_snapshot("add auth").await.unwrap();
    assert!(manager.delete_snapshot(snapshot.id().as_str()).await.is_err());
    assert!(manager.get_snapshot(snapshot.id().as_str()).await.is_ok());
}

#[tokio::test]
async fn test_git_listing_includes_session_commits() {
    let dir = TempDir::new().unwrap();
    let git = Arc::new(ScriptedGit::repo());
    let manager = git_manager(&dir, &git);

    manager.create_snapshot("add auth").await.unwrap();
    let log = format!(
        "{hash}\u{1f}1714566600\u{1f}rewind: add auth\n{head}\u{1f}1714566500\u{1f}base\n",
        hash = "2222222222222222222222222222222222222222",
        head = HEAD,
    );
    git.on(&["log"], ok(&log));

    let listed = manager.list_snapshots(ListOptions::all()).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().any(|s| s.commit.as_deref() == Some(HEAD) && s.file_count == 0));
    assert!(
        listed
            .iter()
            .any(|s| s.id.as_str() == "2222222222222222222222222222222222222222")
    );
    assert!(git.called(&["log", "--max-count=100"]));
}

#[tokio::test]
async fn test_shutdown_commits_and_writes_mirror_index() {
    let dir = TempDir::new().unwrap();
    let git = Arc::new(ScriptedGit::repo());
    let manager =
        SnapshotManager::with_git_runner(RewindConfig::new(dir.path()).with_mirror(), git.clone())
            .unwrap();

    manager.start().await.unwrap();
    manager.create_snapshot("add auth").await.unwrap();
    git.on(&["status", "--porcelain"], ok(" M a.js\0"));

    manager.shutdown().await.unwrap();
    assert!(git.called(&["commit", "--no-verify", "-m"]));
    assert!(dir.path().join(".rewind/index/index.json").exists());
    assert!(manager.active_snapshot().await.is_none());
}

#[tokio::test]
async fn test_merge_requires_feature_branch() {
    let dir = TempDir::new().unwrap();
    let git = Arc::new(ScriptedGit::repo());
    let manager = git_manager(&dir, &git);

    let err = manager.merge_feature_branch().await.unwrap_err();
    assert!(err.is_git());

    manager.create_snapshot("add auth").await.unwrap();
    let merged = manager.merge_feature_branch().await.unwrap();
    assert_eq!(merged, HEAD);
    assert_eq!(manager.git_status().await.state, GitSessionState::Merged);
}

#[test]
fn test_should_snapshot_uses_monitor() {
    let dir = TempDir::new().unwrap();
    let manager = file_manager(&dir);
    assert!(manager.should_snapshot(&ToolDescriptor::new("Write")));
    assert!(!manager.should_snapshot(&ToolDescriptor::new("Read")));
}
