//! End-to-end scan behavior against real repositories: worker → parser →
//! cache, verified through the published events and snapshots. Each test
//! builds its repository with the actual `git` binary and returns early when
//! none is installed.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use protocol::{BusEvent, FileState, StatusMap};
use services::{StatusCache, VersionWorker, worker::repository_root_state};

fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) {
    let output = std::process::Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["-c", "user.name=tester", "-c", "user.email=tester@example.com"])
        .args(args)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Like [`git`] but tolerates a failing exit code (merges that conflict).
fn git_allow_failure(dir: &Path, args: &[&str]) {
    let _ = std::process::Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["-c", "user.name=tester", "-c", "user.email=tester@example.com"])
        .args(args)
        .output()
        .unwrap();
}

fn init_repo(dir: &Path) {
    git(dir, &["init"]);
    // Pin the unborn branch name; old and new git versions agree on this.
    git(dir, &["symbolic-ref", "HEAD", "refs/heads/main"]);
}

fn write(dir: &Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// Enqueue a scan and wait for its change event, then return the snapshot.
async fn scan(
    cache: &Arc<StatusCache>,
    worker: &Arc<VersionWorker>,
    root: &Path,
) -> (StatusMap, StatusMap) {
    let mut events = cache.subscribe();
    worker.enqueue(root.to_path_buf());
    let changes = loop {
        let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("scan did not complete in time")
            .expect("event channel closed");
        if let BusEvent::RepositoryStatusChanged {
            root: event_root,
            changes,
        } = event
        {
            if event_root == root {
                break changes;
            }
        }
    };
    let snapshot = cache.repository_snapshot(root).unwrap_or_default();
    (snapshot, changes)
}

fn engine() -> (Arc<StatusCache>, Arc<VersionWorker>) {
    let cache = Arc::new(StatusCache::new());
    let worker = VersionWorker::new(Arc::clone(&cache));
    (cache, worker)
}

#[tokio::test]
async fn clean_repository_reports_a_normal_root() {
    if !git_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path());
    write(dir.path(), "a.txt", "content\n");
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-m", "init"]);

    let (cache, worker) = engine();
    let (snapshot, changes) = scan(&cache, &worker, dir.path()).await;

    let expected: StatusMap = [(dir.path().to_path_buf(), FileState::Normal)].into();
    assert_eq!(snapshot, expected);
    assert_eq!(changes, expected);
}

#[tokio::test]
async fn modified_file_marks_its_whole_ancestor_chain() {
    if !git_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path());
    write(dir.path(), "a/b/c.txt", "original\n");
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-m", "init"]);
    write(dir.path(), "a/b/c.txt", "edited\n");

    let (cache, worker) = engine();
    let (snapshot, changes) = scan(&cache, &worker, dir.path()).await;

    for rel in ["a/b/c.txt", "a/b", "a"] {
        assert_eq!(
            snapshot.get(&dir.path().join(rel)),
            Some(&FileState::LocallyModifiedUnstaged),
            "{rel}"
        );
        assert_eq!(
            changes.get(&dir.path().join(rel)),
            Some(&FileState::LocallyModifiedUnstaged),
            "{rel}"
        );
    }
    assert_eq!(
        snapshot.get(dir.path()),
        Some(&FileState::LocallyModifiedUnstaged)
    );
}

#[tokio::test]
async fn untracked_file_lifts_the_root_to_modified() {
    if !git_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path());
    write(dir.path(), "a.txt", "content\n");
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-m", "init"]);
    write(dir.path(), "x.new", "loose\n");

    let (cache, worker) = engine();
    let (snapshot, _) = scan(&cache, &worker, dir.path()).await;

    let expected: StatusMap = [
        (dir.path().join("x.new"), FileState::Unversioned),
        (dir.path().to_path_buf(), FileState::LocallyModified),
    ]
    .into();
    assert_eq!(snapshot, expected);
}

#[tokio::test]
async fn conflict_dominates_the_rollup() {
    if !git_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path());
    write(dir.path(), "f.txt", "base\n");
    write(dir.path(), "g.txt", "stable\n");
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-m", "base"]);
    git(dir.path(), &["checkout", "-b", "side"]);
    write(dir.path(), "f.txt", "side\n");
    git(dir.path(), &["commit", "-am", "side"]);
    git(dir.path(), &["checkout", "main"]);
    write(dir.path(), "f.txt", "main\n");
    git(dir.path(), &["commit", "-am", "main"]);
    git_allow_failure(dir.path(), &["merge", "side"]);
    // One ordinary modification next to the conflict.
    write(dir.path(), "g.txt", "edited\n");

    let (cache, worker) = engine();
    let (snapshot, _) = scan(&cache, &worker, dir.path()).await;

    assert_eq!(
        snapshot.get(&dir.path().join("f.txt")),
        Some(&FileState::Conflicting)
    );
    assert_eq!(
        snapshot.get(&dir.path().join("g.txt")),
        Some(&FileState::LocallyModifiedUnstaged)
    );
    assert_eq!(snapshot.get(dir.path()), Some(&FileState::Conflicting));
}

#[tokio::test]
async fn staged_rename_reports_only_the_new_name() {
    if !git_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path());
    write(dir.path(), "old.txt", "content\n");
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-m", "init"]);
    git(dir.path(), &["mv", "old.txt", "new.txt"]);

    let (cache, worker) = engine();
    let (snapshot, _) = scan(&cache, &worker, dir.path()).await;

    assert_eq!(
        snapshot.get(&dir.path().join("new.txt")),
        Some(&FileState::LocallyModified)
    );
    assert_eq!(snapshot.get(&dir.path().join("old.txt")), None);
    assert_eq!(snapshot.get(dir.path()), Some(&FileState::LocallyModified));
}

#[tokio::test]
async fn ignored_only_contents_leave_the_root_clean() {
    if !git_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path());
    write(dir.path(), ".gitignore", "*.o\n");
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-m", "init"]);
    write(dir.path(), "junk.o", "obj\n");

    let (cache, worker) = engine();
    let (snapshot, _) = scan(&cache, &worker, dir.path()).await;

    assert_eq!(
        snapshot.get(&dir.path().join("junk.o")),
        Some(&FileState::Ignored)
    );
    assert_eq!(snapshot.get(dir.path()), Some(&FileState::Normal));
}

#[tokio::test]
async fn vanished_repository_reports_an_empty_snapshot() {
    if !git_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path());
    write(dir.path(), "a.txt", "content\n");
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-m", "init"]);

    let (cache, worker) = engine();
    let root = dir.path().to_path_buf();
    let (first, _) = scan(&cache, &worker, &root).await;
    assert!(!first.is_empty());

    drop(dir);
    let (snapshot, changes) = scan(&cache, &worker, &root).await;
    assert!(snapshot.is_empty());
    // The old entries are reported away so subscribers can evict them.
    assert_eq!(
        changes.get(&root),
        Some(&FileState::Unversioned)
    );
}

#[tokio::test]
async fn rescans_converge_to_an_empty_diff() {
    if !git_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path());
    write(dir.path(), "a.txt", "content\n");
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-m", "init"]);
    write(dir.path(), "a.txt", "edited\n");

    let (cache, worker) = engine();
    let (_, first_changes) = scan(&cache, &worker, dir.path()).await;
    assert!(!first_changes.is_empty());

    // Nothing moved since: same snapshot, empty diff, event still emitted.
    let (_, second_changes) = scan(&cache, &worker, dir.path()).await;
    assert!(second_changes.is_empty());
}

#[test]
fn rollup_matches_the_parser_view() {
    // Sanity link between the two halves the worker composes.
    let map: StatusMap = [
        (PathBuf::from("/r/a"), FileState::Ignored),
        (PathBuf::from("/r/b"), FileState::Unversioned),
    ]
    .into();
    assert_eq!(repository_root_state(&map), FileState::LocallyModified);
}
