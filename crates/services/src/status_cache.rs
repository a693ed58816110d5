//! Authoritative in-memory status store.
//!
//! One instance lives in the daemon and is the only source of truth; the
//! extension's local cache is a short-lived copy fed by the change events
//! published here. A single mutex guards the repository map: writes arrive
//! seconds apart per repository and reads are mostly absorbed by the
//! extension side, so lock contention is not a concern. What matters is
//! that the lock is only ever held for map work, never across a scan.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Mutex,
};

use protocol::{BusEvent, FileState, StatusMap, repo};
use thiserror::Error;
use tokio::sync::broadcast;

/// Hard cap on registered repositories. Past this, registration is refused;
/// nothing is evicted behind the caller's back.
pub const MAX_REPOSITORIES: usize = 100;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatusCacheError {
    #[error("not a git repository: {}", .0.display())]
    InvalidRepository(PathBuf),
    #[error("repository limit reached, unregister one first")]
    CapacityExceeded,
}

#[derive(Default)]
struct CacheInner {
    repositories: BTreeMap<PathBuf, StatusMap>,
    hits: u64,
    misses: u64,
}

pub struct StatusCache {
    inner: Mutex<CacheInner>,
    events: broadcast::Sender<BusEvent>,
}

impl Default for StatusCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusCache {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(CacheInner::default()),
            events,
        }
    }

    /// Subscribe to change and discovery events. Events are published after
    /// the corresponding cache update commits, so a subscriber that sees an
    /// event and then reads the cache observes at least that state.
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.events.subscribe()
    }

    /// Register a repository root. Idempotent: `Ok(true)` for a new
    /// registration (publishes `RepositoryDiscovered`), `Ok(false)` when the
    /// root was already known.
    pub fn register(&self, root: &Path) -> Result<bool, StatusCacheError> {
        if !repo::is_repository_root(root) {
            return Err(StatusCacheError::InvalidRepository(root.to_path_buf()));
        }
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.repositories.contains_key(root) {
                return Ok(false);
            }
            if inner.repositories.len() >= MAX_REPOSITORIES {
                return Err(StatusCacheError::CapacityExceeded);
            }
            inner.repositories.insert(root.to_path_buf(), StatusMap::new());
        }
        let _ = self.events.send(BusEvent::RepositoryDiscovered {
            root: root.to_path_buf(),
        });
        Ok(true)
    }

    pub fn unregister(&self, root: &Path) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.repositories.remove(root).is_some()
    }

    pub fn contains(&self, root: &Path) -> bool {
        self.inner.lock().unwrap().repositories.contains_key(root)
    }

    /// Replace a repository's entries with a fresh scan result and publish
    /// one `RepositoryStatusChanged` carrying the set of paths whose state
    /// differs from the previous snapshot (removed paths are reported as
    /// `Unversioned`). The event is published even when nothing changed;
    /// an empty change set is how scan attempts on clean or vanished
    /// repositories are reported.
    pub fn reset(&self, root: &Path, new_map: StatusMap) {
        let changes = {
            let mut inner = self.inner.lock().unwrap();
            let changes = match inner.repositories.get(root) {
                Some(old) => diff_status_maps(old, &new_map),
                None => new_map.clone(),
            };
            inner.repositories.insert(root.to_path_buf(), new_map);
            changes
        };
        tracing::debug!(
            repo = %root.display(),
            changed = changes.len(),
            "repository status committed"
        );
        let _ = self.events.send(BusEvent::RepositoryStatusChanged {
            root: root.to_path_buf(),
            changes,
        });
    }

    /// State of one path, routed to the repository whose root is the longest
    /// prefix. Paths nobody tracks are `Unversioned`.
    pub fn get(&self, path: &Path) -> FileState {
        let mut inner = self.inner.lock().unwrap();
        let state = owning_repository(&inner.repositories, path)
            .and_then(|root| inner.repositories[&root].get(path).copied());
        match state {
            Some(state) => {
                inner.hits += 1;
                state
            }
            None => {
                inner.misses += 1;
                FileState::Unversioned
            }
        }
    }

    /// Batch lookup under a single lock acquisition.
    pub fn get_batch(&self, paths: &[PathBuf]) -> StatusMap {
        let mut inner = self.inner.lock().unwrap();
        let mut result = StatusMap::with_capacity(paths.len());
        for path in paths {
            let state = owning_repository(&inner.repositories, path)
                .and_then(|root| inner.repositories[&root].get(path).copied());
            match state {
                Some(state) => {
                    inner.hits += 1;
                    result.insert(path.clone(), state);
                }
                None => {
                    inner.misses += 1;
                    result.insert(path.clone(), FileState::Unversioned);
                }
            }
        }
        result
    }

    /// Full snapshot of one repository entry.
    pub fn repository_snapshot(&self, root: &Path) -> Option<StatusMap> {
        let mut inner = self.inner.lock().unwrap();
        let snapshot = inner.repositories.get(root).cloned();
        match snapshot {
            Some(map) => {
                inner.hits += 1;
                Some(map)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    pub fn registered_roots(&self) -> Vec<PathBuf> {
        self.inner.lock().unwrap().repositories.keys().cloned().collect()
    }

    /// Drop a repository's entries without rescanning and without publishing
    /// per-path diffs; the registration itself stays.
    pub fn clear_repository(&self, root: &Path) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.repositories.get_mut(root) {
            Some(map) => {
                map.clear();
                true
            }
            None => false,
        }
    }

    /// Drop everything, including the hit/miss statistics.
    pub fn clear_all(&self) {
        let mut inner = self.inner.lock().unwrap();
        let dropped = inner.repositories.len();
        inner.repositories.clear();
        inner.hits = 0;
        inner.misses = 0;
        tracing::info!(dropped, "cleared all repository state");
    }

    /// Remove repositories whose root is no longer a git repository on disk.
    /// Returns the removed roots so the caller can drop their watches too.
    pub fn cleanup(&self) -> Vec<PathBuf> {
        let mut inner = self.inner.lock().unwrap();
        let gone: Vec<PathBuf> = inner
            .repositories
            .keys()
            .filter(|root| !repo::is_repository_root(root))
            .cloned()
            .collect();
        for root in &gone {
            inner.repositories.remove(root);
        }
        if !gone.is_empty() {
            tracing::info!(removed = gone.len(), "dropped vanished repositories");
        }
        gone
    }

    /// Total number of cached path entries across all repositories.
    pub fn total_paths(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .repositories
            .values()
            .map(StatusMap::len)
            .sum()
    }

    pub fn stats(&self) -> (u64, u64) {
        let inner = self.inner.lock().unwrap();
        (inner.hits, inner.misses)
    }
}

/// Longest-prefix owner of `path`. `Path::starts_with` is component-wise, so
/// `/a/bc` does not match a repository at `/a/b`, while the root itself does.
fn owning_repository(repositories: &BTreeMap<PathBuf, StatusMap>, path: &Path) -> Option<PathBuf> {
    repositories
        .keys()
        .filter(|root| path.starts_with(root))
        .max_by_key(|root| root.as_os_str().len())
        .cloned()
}

/// Symmetric difference between two snapshots, with absent keys treated as
/// `Unversioned`.
fn diff_status_maps(old: &StatusMap, new: &StatusMap) -> StatusMap {
    let mut changes = StatusMap::new();
    for (path, state) in new {
        if old.get(path) != Some(state) {
            changes.insert(path.clone(), *state);
        }
    }
    for path in old.keys() {
        if !new.contains_key(path) {
            changes.insert(path.clone(), FileState::Unversioned);
        }
    }
    changes
}
