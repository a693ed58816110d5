//! Badge provider for the file manager's icon pipeline.
//!
//! `emblem_for` runs on the host's UI thread for every icon it paints, so
//! the budget is microseconds: one local-cache lookup, at worst a `.git`
//! stat for paths in unknown territory. Anything slower (registration,
//! directory fetches) is handed to the controller and resolved on a later
//! paint.

use std::{
    collections::{HashMap, VecDeque},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, Once},
    time::{Duration, Instant},
};

use protocol::repo;

use crate::{controller::VersionController, local_cache::LocalStatusCache};

/// Bound on the not-a-repository probe cache.
pub const PROBE_CACHE_SIZE: usize = 1000;

/// Probe results go stale after this; a directory can become a repository
/// at any time (`git init`).
pub const PROBE_CACHE_TTL: Duration = Duration::from_secs(30);

/// Empty-directory suppression gives up below this depth and assumes the
/// directory has content.
const EMPTY_DIR_MAX_DEPTH: usize = 3;

/// Likewise past this many subdirectories per level.
const EMPTY_DIR_MAX_CHILDREN: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmblemPosition {
    #[default]
    BottomLeft,
}

/// Badge descriptor handed back to the host; `icon: None` means paint
/// nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Emblem {
    pub icon: Option<&'static str>,
    pub position: EmblemPosition,
}

impl Emblem {
    fn none() -> Self {
        Self::default()
    }

    fn badge(icon: &'static str) -> Self {
        Self {
            icon: Some(icon),
            position: EmblemPosition::BottomLeft,
        }
    }
}

struct ProbeEntry {
    is_repository: bool,
    stamp: Instant,
}

#[derive(Default)]
struct ProbeCache {
    map: HashMap<PathBuf, ProbeEntry>,
    order: VecDeque<PathBuf>,
}

pub struct EmblemProvider {
    cache: Arc<LocalStatusCache>,
    controller: Arc<VersionController>,
    bootstrap: Once,
    probes: Mutex<ProbeCache>,
}

impl EmblemProvider {
    pub fn new(cache: Arc<LocalStatusCache>, controller: Arc<VersionController>) -> Self {
        Self {
            cache,
            controller,
            bootstrap: Once::new(),
            probes: Mutex::new(ProbeCache::default()),
        }
    }

    /// Badge for one painted icon. Synchronous and non-blocking: on any kind
    /// of miss this returns "no badge" now and gets the real answer onto a
    /// later paint via the controller.
    pub fn emblem_for(&self, path: &Path) -> Emblem {
        // The very first query seeds discovery with the directory being
        // painted; whatever of it is a repository registers itself.
        self.bootstrap.call_once(|| {
            let seed = path.parent().unwrap_or(path);
            self.controller.register_repository(seed);
        });

        let mut treat_as_root = false;
        if !self.cache.is_inside_repository(path) {
            match self.probe(path) {
                ProbeResult::NotARepository => return Emblem::none(),
                ProbeResult::KnownRepository => treat_as_root = true,
                ProbeResult::Discovered => {
                    // Freshly found root: register, warm the cache, and let
                    // the next repaint show the real state.
                    self.controller.register_repository(path);
                    self.controller.request_directory(path);
                    return Emblem::none();
                }
            }
        }

        let state = match self.cache.get(path) {
            Some(state) => state,
            None => {
                let fetch_target = if treat_as_root || path.is_dir() {
                    path
                } else {
                    path.parent().unwrap_or(path)
                };
                self.controller.request_directory(fetch_target);
                return Emblem::none();
            }
        };

        match state.emblem_icon() {
            Some(icon) => {
                // Directories that are git-empty carry no badge even when a
                // state nominally applies to them.
                if path.is_dir() && is_directory_empty(path) {
                    Emblem::none()
                } else {
                    Emblem::badge(icon)
                }
            }
            None => Emblem::none(),
        }
    }

    fn probe(&self, path: &Path) -> ProbeResult {
        let now = Instant::now();
        let mut probes = self.probes.lock().unwrap();
        probes.evict_expired(now);

        let cached = probes.map.get(path).map(|entry| entry.is_repository);
        if let Some(is_repository) = cached {
            probes.touch(path);
            return if is_repository {
                ProbeResult::KnownRepository
            } else {
                ProbeResult::NotARepository
            };
        }

        let is_repository = repo::is_repository_root(path);
        probes.insert(path.to_path_buf(), is_repository, now);
        if is_repository {
            ProbeResult::Discovered
        } else {
            ProbeResult::NotARepository
        }
    }
}

enum ProbeResult {
    /// Cached positive: path is a repository root we already reported.
    KnownRepository,
    /// Cached or fresh negative.
    NotARepository,
    /// Fresh positive, not yet registered anywhere.
    Discovered,
}

impl ProbeCache {
    fn evict_expired(&mut self, now: Instant) {
        self.map
            .retain(|_, entry| now.duration_since(entry.stamp) <= PROBE_CACHE_TTL);
        self.order.retain(|path| self.map.contains_key(path));
    }

    fn touch(&mut self, path: &Path) {
        if let Some(pos) = self.order.iter().position(|p| p == path) {
            let owned = self.order.remove(pos).unwrap();
            self.order.push_back(owned);
        }
    }

    fn insert(&mut self, path: PathBuf, is_repository: bool, now: Instant) {
        self.map.insert(
            path.clone(),
            ProbeEntry {
                is_repository,
                stamp: now,
            },
        );
        self.order.retain(|p| *p != path);
        self.order.push_back(path);
        while self.map.len() > PROBE_CACHE_SIZE {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.map.remove(&oldest);
                }
                None => break,
            }
        }
    }
}

/// Git-empty check with cost caps: recursion stops at depth 3 and at ten
/// subdirectories per level, assuming "non-empty" when a cap is hit.
fn is_directory_empty(path: &Path) -> bool {
    empty_to_depth(path, EMPTY_DIR_MAX_DEPTH)
}

fn empty_to_depth(path: &Path, depth: usize) -> bool {
    if depth == 0 {
        return false;
    }
    let Ok(entries) = std::fs::read_dir(path) else {
        // Unreadable or vanished: nothing visible to badge.
        return true;
    };
    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        match entry.file_type() {
            Ok(kind) if kind.is_dir() => {
                subdirs.push(entry.path());
                if subdirs.len() > EMPTY_DIR_MAX_CHILDREN {
                    return false;
                }
            }
            // Any file (or unknown) counts as content.
            _ => return false,
        }
    }
    subdirs
        .iter()
        .all(|subdir| empty_to_depth(subdir, depth - 1))
}
