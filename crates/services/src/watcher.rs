//! Filesystem watcher for registered repositories.
//!
//! Watches each repository's git metadata (index, HEAD, refs) plus the
//! working-tree directories, and collapses the resulting event storms into
//! one repository-changed notification per burst. Checkouts touch hundreds
//! of paths in well under a second; the debounce window makes that exactly
//! one downstream scan. The watcher itself never reads the cache and never
//! runs git; it only names repositories that need a rescan.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use protocol::{WatcherStats, repo};
use tokio::sync::mpsc;

/// Quiet period after the last raw event before pending repositories are
/// reported. Restarted by every new event.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Cadence of the resync pass that drops vanished watches and picks up new
/// ref files. Also the recovery path when the OS refuses new watches.
const RESYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Working-tree directories that never influence git status but generate
/// endless event noise.
const IGNORED_DIR_NAMES: [&str; 9] = [
    "build", "dist", "node_modules", "target", "bin", "obj", "__pycache__", ".vscode", ".idea",
];

const GIT_METADATA_FILES: [&str; 6] =
    ["index", "HEAD", "ORIG_HEAD", "FETCH_HEAD", "MERGE_HEAD", "config"];

#[derive(Default)]
struct RepoWatch {
    files: HashSet<PathBuf>,
    dirs: HashSet<PathBuf>,
}

struct Shared {
    watcher: Mutex<RecommendedWatcher>,
    repos: Mutex<HashMap<PathBuf, RepoWatch>>,
    watch_events: AtomicU64,
    update_events: AtomicU64,
}

pub struct RepositoryWatcher {
    shared: Arc<Shared>,
}

impl RepositoryWatcher {
    /// Build the watcher and its notification channel. The receiver yields
    /// one repository root per debounced change burst. Must be called inside
    /// a tokio runtime; the debounce and resync tasks live on it.
    pub fn new(
        debounce: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<PathBuf>), notify::Error> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let watcher = notify::recommended_watcher(move |result: Result<Event, notify::Error>| {
            match result {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Access(_)) {
                        return;
                    }
                    for path in event.paths {
                        let _ = raw_tx.send(path);
                    }
                }
                Err(err) => tracing::warn!(error = %err, "filesystem watch error"),
            }
        })?;

        let shared = Arc::new(Shared {
            watcher: Mutex::new(watcher),
            repos: Mutex::new(HashMap::new()),
            watch_events: AtomicU64::new(0),
            update_events: AtomicU64::new(0),
        });

        let (changed_tx, changed_rx) = mpsc::unbounded_channel();
        tokio::spawn(debounce_loop(
            Arc::clone(&shared),
            raw_rx,
            changed_tx,
            debounce,
        ));
        tokio::spawn(resync_loop(Arc::downgrade(&shared)));

        Ok((Self { shared }, changed_rx))
    }

    /// Start watching a repository: its root directory, the critical git
    /// metadata files, every existing ref file, and the heads/remotes ref
    /// directories so new branches are noticed.
    pub fn add_repository(&self, root: &Path) {
        if !repo::is_repository_root(root) {
            tracing::warn!(repo = %root.display(), "not watching non-repository path");
            return;
        }
        let mut repos = self.shared.repos.lock().unwrap();
        if repos.contains_key(root) {
            return;
        }
        let mut watch = RepoWatch::default();
        self.shared.sync_repository_watches(root, &mut watch);
        repos.insert(root.to_path_buf(), watch);
        tracing::debug!(repo = %root.display(), "watching repository");
    }

    pub fn remove_repository(&self, root: &Path) {
        let mut repos = self.shared.repos.lock().unwrap();
        let Some(watch) = repos.remove(root) else {
            return;
        };
        let mut watcher = self.shared.watcher.lock().unwrap();
        for path in watch.files.iter().chain(watch.dirs.iter()) {
            let _ = watcher.unwatch(path);
        }
        tracing::debug!(repo = %root.display(), "stopped watching repository");
    }

    pub fn is_watching(&self, root: &Path) -> bool {
        self.shared.repos.lock().unwrap().contains_key(root)
    }

    pub fn stats(&self) -> WatcherStats {
        let repos = self.shared.repos.lock().unwrap();
        WatcherStats {
            watched_repositories: repos.len(),
            watched_files: repos.values().map(|w| w.files.len()).sum(),
            watched_directories: repos.values().map(|w| w.dirs.len()).sum(),
            watch_events: self.shared.watch_events.load(Ordering::Relaxed),
            update_events: self.shared.update_events.load(Ordering::Relaxed),
        }
    }
}

impl Shared {
    /// Map an event path to the registered repository owning it.
    fn owning_repository(&self, path: &Path) -> Option<PathBuf> {
        let repos = self.repos.lock().unwrap();
        repos
            .keys()
            .filter(|root| path.starts_with(root))
            .max_by_key(|root| root.as_os_str().len())
            .cloned()
    }

    /// Bring one repository's watch set up to date: watch the root, the
    /// metadata files and ref files that exist right now, and drop watches
    /// whose paths vanished.
    fn sync_repository_watches(&self, root: &Path, watch: &mut RepoWatch) {
        let mut watcher = self.watcher.lock().unwrap();

        for set in [&mut watch.files, &mut watch.dirs] {
            set.retain(|path| {
                if path.exists() {
                    true
                } else {
                    let _ = watcher.unwatch(path);
                    false
                }
            });
        }

        let git_dir = root.join(".git");
        let mut dirs = vec![root.to_path_buf()];
        for name in ["refs/heads", "refs/remotes"] {
            let dir = git_dir.join(name);
            if dir.is_dir() {
                dirs.push(dir);
            }
        }
        for dir in dirs {
            watch_path(&mut watcher, &mut watch.dirs, &dir);
        }

        let mut files = Vec::new();
        for name in GIT_METADATA_FILES {
            let file = git_dir.join(name);
            if file.is_file() {
                files.push(file);
            }
        }
        collect_ref_files(&git_dir.join("refs"), &mut files);
        for file in files {
            watch_path(&mut watcher, &mut watch.files, &file);
        }
    }

    /// A directory event may reveal paths worth watching: a fresh working
    /// tree subdirectory, or a new ref file after a branch was created.
    fn extend_watches(&self, path: &Path, root: &Path) {
        let git_dir = root.join(".git");
        if path.starts_with(&git_dir) {
            if path.starts_with(git_dir.join("refs")) && path.is_file() {
                let mut repos = self.repos.lock().unwrap();
                if let Some(watch) = repos.get_mut(root) {
                    let mut watcher = self.watcher.lock().unwrap();
                    watch_path(&mut watcher, &mut watch.files, path);
                }
            }
            return;
        }
        if !path.is_dir() || !should_watch_directory(path) {
            return;
        }
        let mut repos = self.repos.lock().unwrap();
        let Some(watch) = repos.get_mut(root) else {
            return;
        };
        let mut watcher = self.watcher.lock().unwrap();
        watch_path(&mut watcher, &mut watch.dirs, path);
        // The directory may have been moved in with children already inside;
        // those never produce their own creation events.
        if let Ok(entries) = std::fs::read_dir(path) {
            for entry in entries.flatten() {
                let child = entry.path();
                if child.is_dir() && should_watch_directory(&child) {
                    watch_path(&mut watcher, &mut watch.dirs, &child);
                }
            }
        }
    }
}

fn watch_path(watcher: &mut RecommendedWatcher, set: &mut HashSet<PathBuf>, path: &Path) {
    if set.contains(path) {
        return;
    }
    match watcher.watch(path, RecursiveMode::NonRecursive) {
        Ok(()) => {
            set.insert(path.to_path_buf());
        }
        // Descriptor exhaustion lands here; the resync tick retries later.
        Err(err) => tracing::warn!(path = %path.display(), error = %err, "failed to add watch"),
    }
}

fn collect_ref_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_ref_files(&path, out);
        } else if path.is_file() {
            out.push(path);
        }
    }
}

fn should_watch_directory(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.starts_with('.') && name != ".git" {
        return false;
    }
    !IGNORED_DIR_NAMES.contains(&name)
}

fn far_future() -> tokio::time::Instant {
    tokio::time::Instant::now() + Duration::from_secs(60 * 60 * 24)
}

/// Single shared debounce over all repositories: every raw event inserts its
/// repository into the pending set and restarts one timer; when the timer
/// fires, each pending repository is reported exactly once.
async fn debounce_loop(
    shared: Arc<Shared>,
    mut raw_rx: mpsc::UnboundedReceiver<PathBuf>,
    changed_tx: mpsc::UnboundedSender<PathBuf>,
    debounce: Duration,
) {
    let mut pending: HashSet<PathBuf> = HashSet::new();
    let sleeper = tokio::time::sleep_until(far_future());
    tokio::pin!(sleeper);

    loop {
        tokio::select! {
            maybe = raw_rx.recv() => {
                let Some(path) = maybe else { break };
                shared.watch_events.fetch_add(1, Ordering::Relaxed);
                let Some(root) = shared.owning_repository(&path) else { continue };
                shared.extend_watches(&path, &root);
                pending.insert(root);
                sleeper.as_mut().reset(tokio::time::Instant::now() + debounce);
            }
            () = &mut sleeper, if !pending.is_empty() => {
                for root in pending.drain() {
                    shared.update_events.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(repo = %root.display(), "repository changed");
                    if changed_tx.send(root).is_err() {
                        return;
                    }
                }
                sleeper.as_mut().reset(far_future());
            }
        }
    }
}

/// Periodic garbage collection: drop watches on vanished paths, pick up new
/// metadata files (refs created since registration). Stops when the watcher
/// is dropped.
async fn resync_loop(shared: Weak<Shared>) {
    let mut tick = tokio::time::interval(RESYNC_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tick.tick().await;
    loop {
        tick.tick().await;
        let Some(shared) = shared.upgrade() else {
            return;
        };
        let roots: Vec<PathBuf> = shared.repos.lock().unwrap().keys().cloned().collect();
        for root in roots {
            let mut repos = shared.repos.lock().unwrap();
            if let Some(watch) = repos.get_mut(&root) {
                shared.sync_repository_watches(&root, watch);
            }
        }
    }
}
