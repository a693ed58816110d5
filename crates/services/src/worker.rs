//! Version worker: turns "this repository changed" into a committed cache
//! update.
//!
//! Scans run concurrently across repositories but serially within one: a
//! request landing while a scan is in flight marks the repository for one
//! follow-up pass instead of piling up subprocesses. The cache lock is only
//! taken for the final `reset`; the git subprocess and the parse happen
//! entirely outside it.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry};
use protocol::{FileState, StatusMap, repo};
use tokio_util::task::TaskTracker;

use crate::{
    git::GitCli,
    porcelain,
    status_cache::StatusCache,
};

#[derive(Default)]
struct ScanSlot {
    rerun: bool,
}

pub struct VersionWorker {
    cache: Arc<StatusCache>,
    git: GitCli,
    scans: DashMap<PathBuf, ScanSlot>,
    tracker: TaskTracker,
}

impl VersionWorker {
    pub fn new(cache: Arc<StatusCache>) -> Arc<Self> {
        Arc::new(Self {
            cache,
            git: GitCli::new(),
            scans: DashMap::new(),
            tracker: TaskTracker::new(),
        })
    }

    /// Request a scan of `root`. Returns immediately; the result lands in the
    /// cache and is announced through its change event.
    pub fn enqueue(self: &Arc<Self>, root: PathBuf) {
        match self.scans.entry(root.clone()) {
            Entry::Occupied(mut slot) => {
                slot.get_mut().rerun = true;
            }
            Entry::Vacant(slot) => {
                slot.insert(ScanSlot::default());
                let worker = Arc::clone(self);
                self.tracker.spawn(async move {
                    worker.run(root).await;
                });
            }
        }
    }

    /// Number of scans currently in flight.
    pub fn in_flight(&self) -> usize {
        self.scans.len()
    }

    /// Wait for in-flight scans to finish, up to `grace`. Abandoned scans
    /// take their subprocesses with them (`kill_on_drop`).
    pub async fn shutdown(&self, grace: Duration) {
        self.tracker.close();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            tracing::warn!("scans still running after shutdown grace period");
        }
    }

    async fn run(&self, root: PathBuf) {
        loop {
            self.scan_once(&root).await;
            match self.scans.entry(root.clone()) {
                Entry::Occupied(mut slot) => {
                    if slot.get().rerun {
                        slot.get_mut().rerun = false;
                        continue;
                    }
                    slot.remove();
                    break;
                }
                Entry::Vacant(_) => break,
            }
        }
    }

    async fn scan_once(&self, root: &Path) {
        if !repo::is_repository_root(root) {
            // Still committed so subscribers learn their entries are stale.
            tracing::info!(repo = %root.display(), "repository gone, reporting empty status");
            self.cache.reset(root, StatusMap::new());
            return;
        }
        match self.git.status_porcelain(root).await {
            Ok(output) => {
                let mut map = porcelain::parse_status_output(root, &output);
                let root_state = repository_root_state(&map);
                map.insert(root.to_path_buf(), root_state);
                self.cache.reset(root, map);
            }
            Err(err) => {
                // No reset here: publishing an empty snapshot every time git
                // hiccups would make every badge in the repository flap.
                tracing::warn!(repo = %root.display(), error = %err, "status scan failed");
            }
        }
    }
}

/// Summary state attributed to the repository root. Conflicts win outright,
/// then unstaged and staged modifications; any other change (added, removed,
/// missing, untracked) makes the root "modified"; a repository is never
/// badged as added or removed wholesale. Ignored entries and an empty
/// repository read as clean.
pub fn repository_root_state(map: &StatusMap) -> FileState {
    let mut root = FileState::Normal;
    for state in map.values() {
        match state {
            FileState::Ignored | FileState::Normal => {}
            FileState::Conflicting => return FileState::Conflicting,
            FileState::LocallyModifiedUnstaged => root = FileState::LocallyModifiedUnstaged,
            FileState::LocallyModified => {
                if root != FileState::LocallyModifiedUnstaged {
                    root = FileState::LocallyModified;
                }
            }
            _ => {
                if root == FileState::Normal {
                    root = FileState::LocallyModified;
                }
            }
        }
    }
    root
}
