//! Full-stack tests: daemon router served on an ephemeral port, exercised
//! through the real bus client, including the SSE event bridge.

use std::{path::Path, time::Duration};

use client::{BusClient, ClientEvent};
use daemon::{AppState, routes};
use protocol::FileState;

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

fn init_repo(dir: &Path) {
    git(dir, &["init"]);
    git(dir, &["symbolic-ref", "HEAD", "refs/heads/main"]);
}

async fn spawn_daemon() -> (BusClient, AppState) {
    let state = AppState::initialize().unwrap();
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    let router = routes::router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let client = BusClient::with_endpoint(endpoint).unwrap();
    for _ in 0..100 {
        if client.is_connected() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(client.is_connected(), "client never reached the daemon");
    (client, state)
}

async fn next_event(
    events: &mut tokio::sync::broadcast::Receiver<ClientEvent>,
) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("no event within deadline")
        .expect("event channel closed")
}

#[tokio::test]
async fn registration_discovers_and_reports_a_clean_repository() {
    if !git_available() {
        return;
    }
    let (client, _state) = spawn_daemon().await;
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path());
    std::fs::write(dir.path().join("a.txt"), "content\n").unwrap();
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-m", "init"]);

    let mut events = client.subscribe();
    assert!(client.register_repository(dir.path()).await.unwrap());

    // Discovery first, then the scan result.
    match next_event(&mut events).await {
        ClientEvent::RepositoryDiscovered { root } => assert_eq!(root, dir.path()),
        other => panic!("expected discovery, got {other:?}"),
    }
    match next_event(&mut events).await {
        ClientEvent::RepositoryStatusChanged { root, changes } => {
            assert_eq!(root, dir.path());
            assert_eq!(
                changes.get(dir.path()),
                Some(&FileState::Normal),
                "clean repository announces a normal root"
            );
        }
        other => panic!("expected status change, got {other:?}"),
    }

    let snapshot = client.get_repository_status(dir.path()).await.unwrap();
    assert_eq!(snapshot.get(dir.path()), Some(&FileState::Normal));

    let statuses = client
        .get_file_statuses(vec![dir.path().to_path_buf()])
        .await
        .unwrap();
    assert_eq!(statuses.get(dir.path()), Some(&FileState::Normal));
}

#[tokio::test]
async fn refresh_publishes_the_new_state_of_an_edited_file() {
    if !git_available() {
        return;
    }
    let (client, _state) = spawn_daemon().await;
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path());
    std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
    std::fs::write(dir.path().join("a/b/c.txt"), "original\n").unwrap();
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-m", "init"]);

    let mut events = client.subscribe();
    assert!(client.register_repository(dir.path()).await.unwrap());
    // Swallow discovery + first scan.
    loop {
        if let ClientEvent::RepositoryStatusChanged { .. } = next_event(&mut events).await {
            break;
        }
    }

    std::fs::write(dir.path().join("a/b/c.txt"), "edited\n").unwrap();
    assert!(client.refresh_repository(dir.path()).await.unwrap());

    let changes = loop {
        if let ClientEvent::RepositoryStatusChanged { changes, .. } = next_event(&mut events).await
        {
            break changes;
        }
    };
    for rel in ["a/b/c.txt", "a/b", "a"] {
        assert_eq!(
            changes.get(&dir.path().join(rel)),
            Some(&FileState::LocallyModifiedUnstaged),
            "{rel}"
        );
    }
    assert_eq!(
        changes.get(dir.path()),
        Some(&FileState::LocallyModifiedUnstaged)
    );
}

#[tokio::test]
async fn non_repositories_are_refused() {
    let (client, _state) = spawn_daemon().await;
    let dir = tempfile::tempdir().unwrap();
    assert!(!client.register_repository(dir.path()).await.unwrap());
    assert!(!client.refresh_repository(dir.path()).await.unwrap());
}

#[tokio::test]
async fn service_status_reflects_registrations() {
    if !git_available() {
        return;
    }
    let (client, _state) = spawn_daemon().await;
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path());

    let before = client.get_service_status().await.unwrap();
    assert!(before.service_ready);
    assert_eq!(before.registered_repositories, 0);

    let mut events = client.subscribe();
    assert!(client.register_repository(dir.path()).await.unwrap());
    let after = client.get_service_status().await.unwrap();
    assert_eq!(after.registered_repositories, 1);
    assert_eq!(after.watcher.watched_repositories, 1);

    let roots = client.get_registered_repositories().await.unwrap();
    assert_eq!(roots, vec![dir.path().to_path_buf()]);

    // Wait out the registration scan so it cannot re-create the entry after
    // the unregister below.
    loop {
        if let ClientEvent::RepositoryStatusChanged { .. } = next_event(&mut events).await {
            break;
        }
    }
    assert!(client.unregister_repository(dir.path()).await.unwrap());
    assert!(client.get_registered_repositories().await.unwrap().is_empty());
}

#[tokio::test]
async fn clear_all_resources_empties_the_daemon() {
    if !git_available() {
        return;
    }
    let (client, state) = spawn_daemon().await;
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path());

    let mut events = client.subscribe();
    assert!(client.register_repository(dir.path()).await.unwrap());
    // Let the registration scan land before wiping, so nothing re-populates
    // the cache afterwards.
    loop {
        if let ClientEvent::RepositoryStatusChanged { .. } = next_event(&mut events).await {
            break;
        }
    }

    assert!(client.clear_all_resources().await.unwrap());
    assert!(client.get_registered_repositories().await.unwrap().is_empty());
    assert_eq!(state.cache.total_paths(), 0);
    assert!(!state.watcher.is_watching(dir.path()));
}

#[tokio::test]
async fn file_watcher_drives_scans_through_the_daemon() {
    if !git_available() {
        return;
    }
    // Compressed debounce keeps the test snappy; the production default is
    // half a second.
    let state = AppState::initialize_with_debounce(Duration::from_millis(100)).unwrap();
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    let router = routes::router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    let client = BusClient::with_endpoint(endpoint).unwrap();
    for _ in 0..100 {
        if client.is_connected() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path());
    std::fs::write(dir.path().join("tracked.txt"), "original\n").unwrap();
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-m", "init"]);

    let mut events = client.subscribe();
    assert!(client.register_repository(dir.path()).await.unwrap());
    loop {
        if let ClientEvent::RepositoryStatusChanged { .. } = next_event(&mut events).await {
            break;
        }
    }

    // No explicit refresh: the watcher must notice the edit on its own.
    std::fs::write(dir.path().join("tracked.txt"), "edited\n").unwrap();
    let changes = loop {
        if let ClientEvent::RepositoryStatusChanged { changes, .. } = next_event(&mut events).await
        {
            if !changes.is_empty() {
                break changes;
            }
        }
    };
    assert_eq!(
        changes.get(&dir.path().join("tracked.txt")),
        Some(&FileState::LocallyModifiedUnstaged)
    );
}
