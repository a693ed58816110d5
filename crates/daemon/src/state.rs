use std::{sync::Arc, time::Duration};

use services::{RepositoryWatcher, StatusCache, VersionWorker, watcher::DEFAULT_DEBOUNCE};

/// Grace given to in-flight scans on shutdown before their subprocesses are
/// killed outright.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Everything the request handlers need. `main` builds one of these and the
/// components hold no hidden references to each other beyond what is wired
/// here.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<StatusCache>,
    pub worker: Arc<VersionWorker>,
    pub watcher: Arc<RepositoryWatcher>,
}

impl AppState {
    /// Construct the service graph and wire the watcher's debounced
    /// notifications into the worker. Must run inside the runtime that will
    /// drive the daemon.
    pub fn initialize() -> anyhow::Result<Self> {
        Self::initialize_with_debounce(DEFAULT_DEBOUNCE)
    }

    pub fn initialize_with_debounce(debounce: Duration) -> anyhow::Result<Self> {
        let cache = Arc::new(StatusCache::new());
        let worker = VersionWorker::new(Arc::clone(&cache));
        let (watcher, mut changed_rx) = RepositoryWatcher::new(debounce)?;

        let scan_worker = Arc::clone(&worker);
        tokio::spawn(async move {
            while let Some(root) = changed_rx.recv().await {
                tracing::debug!(repo = %root.display(), "repository changed on disk");
                scan_worker.enqueue(root);
            }
        });

        Ok(Self {
            cache,
            worker,
            watcher: Arc::new(watcher),
        })
    }
}
