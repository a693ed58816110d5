//! Per-process status cache with a 100 ms TTL.
//!
//! The TTL matches a display-refresh horizon: a user clicking between
//! folders never sees a stale badge, while a scroll repainting the same
//! directory sixty times a second costs at most one daemon fetch. Entries
//! are fed by the daemon's change events and by the results of coalesced
//! directory fetches; expiry is lazy on read with a periodic sweep capping
//! memory.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use client::ClientEvent;
use dashmap::{DashMap, mapref::entry::Entry};
use protocol::{FileState, StatusMap};

/// How long a cached state answers paints before the next fetch.
pub const CACHE_TTL: Duration = Duration::from_millis(100);

/// Upper bound on cached paths; the cleanup sweep enforces it.
pub const MAX_CACHE_ENTRIES: usize = 10_000;

/// Cadence of the expiry sweep.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(5);

/// A directory with a fetch in flight is not fetched again until either the
/// results land or this window elapses (lost responses must not wedge the
/// directory forever).
const FETCH_COALESCE_WINDOW: Duration = Duration::from_secs(1);

#[derive(Clone, Copy)]
struct CacheEntry {
    state: FileState,
    stamp: Instant,
}

pub struct LocalStatusCache {
    entries: DashMap<PathBuf, CacheEntry>,
    roots: Mutex<BTreeSet<PathBuf>>,
    inflight: DashMap<PathBuf, Instant>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for LocalStatusCache {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStatusCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            roots: Mutex::new(BTreeSet::new()),
            inflight: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Fresh state for `path`, or `None` on a miss (absent or expired). The
    /// caller decides whether a miss schedules a directory fetch.
    pub fn get(&self, path: &Path) -> Option<FileState> {
        self.get_at(path, Instant::now())
    }

    fn get_at(&self, path: &Path, now: Instant) -> Option<FileState> {
        if let Some(entry) = self.entries.get(path) {
            if now.duration_since(entry.stamp) <= CACHE_TTL {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.state);
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Merge a status payload with the current timestamp. Fetches pending on
    /// the covered directories are considered answered.
    pub fn apply(&self, statuses: &StatusMap) {
        let stamp = Instant::now();
        for (path, state) in statuses {
            self.entries.insert(
                path.clone(),
                CacheEntry {
                    state: *state,
                    stamp,
                },
            );
            if let Some(parent) = path.parent() {
                self.inflight.remove(parent);
            }
        }
        if self.entries.len() > MAX_CACHE_ENTRIES {
            self.sweep(Instant::now());
        }
    }

    /// Record a known repository root (from discovery events or change
    /// events); used to answer "is this path inside any repository".
    pub fn note_repository(&self, root: &Path) {
        self.roots.lock().unwrap().insert(root.to_path_buf());
    }

    pub fn forget_repository(&self, root: &Path) {
        self.roots.lock().unwrap().remove(root);
        self.entries.retain(|path, _| !path.starts_with(root));
    }

    /// Longest known repository root that is a prefix of `path`.
    pub fn known_repository_for(&self, path: &Path) -> Option<PathBuf> {
        let roots = self.roots.lock().unwrap();
        roots
            .iter()
            .filter(|root| path.starts_with(root))
            .max_by_key(|root| root.as_os_str().len())
            .cloned()
    }

    /// True when `path` is inside some repository this process has heard of.
    /// Falls back to live cached ancestors: a fresh non-`Unversioned` entry
    /// anywhere up the chain proves a repository around the path even before
    /// a discovery event arrived.
    pub fn is_inside_repository(&self, path: &Path) -> bool {
        if self.known_repository_for(path).is_some() {
            return true;
        }
        let now = Instant::now();
        path.ancestors().any(|ancestor| {
            self.entries.get(ancestor).is_some_and(|entry| {
                now.duration_since(entry.stamp) <= CACHE_TTL
                    && entry.state != FileState::Unversioned
            })
        })
    }

    /// Claim the fetch slot for a directory. Returns true when the caller
    /// should issue the fetch, false when one is already outstanding.
    pub fn begin_directory_fetch(&self, dir: &Path) -> bool {
        let now = Instant::now();
        match self.inflight.entry(dir.to_path_buf()) {
            Entry::Occupied(mut slot) => {
                if now.duration_since(*slot.get()) > FETCH_COALESCE_WINDOW {
                    *slot.get_mut() = now;
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }

    /// Drop expired entries; past the size cap, drop oldest-first until the
    /// cache fits again.
    pub fn cleanup(&self) {
        self.sweep(Instant::now());
    }

    fn sweep(&self, now: Instant) {
        self.entries
            .retain(|_, entry| now.duration_since(entry.stamp) <= CACHE_TTL);
        self.inflight
            .retain(|_, started| now.duration_since(*started) <= FETCH_COALESCE_WINDOW);

        let excess = self.entries.len().saturating_sub(MAX_CACHE_ENTRIES);
        if excess > 0 {
            let mut stamped: Vec<(PathBuf, Instant)> = self
                .entries
                .iter()
                .map(|kv| (kv.key().clone(), kv.value().stamp))
                .collect();
            stamped.sort_by_key(|(_, stamp)| *stamp);
            for (path, _) in stamped.into_iter().take(excess) {
                self.entries.remove(&path);
            }
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.inflight.clear();
        self.roots.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    /// Entry point for the controller's event pump.
    pub fn handle_event(&self, event: &ClientEvent) {
        match event {
            ClientEvent::RepositoryStatusChanged { root, changes } => {
                self.note_repository(root);
                self.apply(changes);
            }
            ClientEvent::RepositoryDiscovered { root } => self.note_repository(root),
            ClientEvent::FileStatusesReady { statuses } => self.apply(statuses),
            // Entries age out through the TTL on their own when the daemon
            // goes away; nothing to drop eagerly.
            ClientEvent::ServiceAvailability { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, FileState)]) -> StatusMap {
        entries
            .iter()
            .map(|(p, s)| (PathBuf::from(p), *s))
            .collect()
    }

    #[test]
    fn fresh_entries_hit_and_stale_entries_miss() {
        let cache = LocalStatusCache::new();
        cache.apply(&map(&[("/repo/a.txt", FileState::Added)]));

        let inserted = Instant::now();
        assert_eq!(
            cache.get_at(Path::new("/repo/a.txt"), inserted + Duration::from_millis(99)),
            Some(FileState::Added)
        );
        assert_eq!(
            cache.get_at(Path::new("/repo/a.txt"), inserted + Duration::from_millis(101)),
            None
        );
        let (hits, misses) = cache.stats();
        assert_eq!((hits, misses), (1, 1));
    }

    #[test]
    fn unknown_paths_miss() {
        let cache = LocalStatusCache::new();
        assert_eq!(cache.get(Path::new("/nowhere")), None);
    }

    #[test]
    fn directory_fetches_coalesce() {
        let cache = LocalStatusCache::new();
        let dir = Path::new("/repo/src");
        assert!(cache.begin_directory_fetch(dir));
        assert!(!cache.begin_directory_fetch(dir));
        // A different directory has its own slot.
        assert!(cache.begin_directory_fetch(Path::new("/repo/doc")));

        // Arriving results release the slot.
        cache.apply(&map(&[("/repo/src/main.rs", FileState::LocallyModified)]));
        assert!(cache.begin_directory_fetch(dir));
    }

    #[test]
    fn status_events_teach_the_cache_about_roots() {
        let cache = LocalStatusCache::new();
        cache.handle_event(&ClientEvent::RepositoryStatusChanged {
            root: PathBuf::from("/repo"),
            changes: map(&[("/repo/f", FileState::LocallyModifiedUnstaged)]),
        });

        assert!(cache.is_inside_repository(Path::new("/repo/deep/nested/file")));
        assert!(!cache.is_inside_repository(Path::new("/elsewhere/file")));
        assert_eq!(
            cache.get(Path::new("/repo/f")),
            Some(FileState::LocallyModifiedUnstaged)
        );
    }

    #[test]
    fn live_tracked_ancestors_prove_a_repository() {
        let cache = LocalStatusCache::new();
        cache.apply(&map(&[("/somewhere/proj/src", FileState::LocallyModified)]));
        assert!(cache.is_inside_repository(Path::new("/somewhere/proj/src/lib.rs")));
        // An Unversioned entry proves nothing; paths outside repositories
        // report exactly that state.
        let cache = LocalStatusCache::new();
        cache.apply(&map(&[("/tmp/stuff", FileState::Unversioned)]));
        assert!(!cache.is_inside_repository(Path::new("/tmp/stuff/file")));
    }

    #[test]
    fn forget_repository_drops_the_subtree() {
        let cache = LocalStatusCache::new();
        cache.note_repository(Path::new("/repo"));
        cache.apply(&map(&[
            ("/repo/a", FileState::Added),
            ("/other/b", FileState::Added),
        ]));

        cache.forget_repository(Path::new("/repo"));
        assert!(!cache.is_inside_repository(Path::new("/repo/a")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn sweep_enforces_the_size_cap() {
        let cache = LocalStatusCache::new();
        let mut big = StatusMap::new();
        for i in 0..(MAX_CACHE_ENTRIES + 50) {
            big.insert(PathBuf::from(format!("/repo/f{i}")), FileState::Normal);
        }
        cache.apply(&big);
        // All entries are fresh, so the cap eviction had to kick in.
        assert!(cache.len() <= MAX_CACHE_ENTRIES);
    }

    #[test]
    fn longest_root_wins_for_nested_repositories() {
        let cache = LocalStatusCache::new();
        cache.note_repository(Path::new("/a"));
        cache.note_repository(Path::new("/a/sub"));
        assert_eq!(
            cache.known_repository_for(Path::new("/a/sub/file")),
            Some(PathBuf::from("/a/sub"))
        );
        assert_eq!(
            cache.known_repository_for(Path::new("/a/other")),
            Some(PathBuf::from("/a"))
        );
    }
}
