//! Glue between the bus client and the local cache.
//!
//! The controller pumps daemon events into the cache and fans emblem-path
//! misses out as coalesced directory fetches. All of its work runs on the
//! bus client's runtime; nothing here ever blocks the caller.

use std::{path::Path, sync::Arc};

use client::BusClient;
use tokio::sync::broadcast;

use crate::local_cache::{CLEANUP_INTERVAL, LocalStatusCache};

pub struct VersionController {
    client: Arc<BusClient>,
    cache: Arc<LocalStatusCache>,
}

impl VersionController {
    /// Wire the event pump and the cache's cleanup timer. The tasks hold a
    /// weak reference through the broadcast channel: they end when the
    /// client is dropped and its runtime shuts down.
    pub fn new(client: Arc<BusClient>, cache: Arc<LocalStatusCache>) -> Arc<Self> {
        let controller = Arc::new(Self {
            client: Arc::clone(&client),
            cache: Arc::clone(&cache),
        });

        let mut events = client.subscribe();
        let pump_cache = Arc::clone(&cache);
        client.handle().spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => pump_cache.handle_event(&event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::debug!(missed, "event pump lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let sweep_cache = Arc::clone(&cache);
        client.handle().spawn(async move {
            let mut tick = tokio::time::interval(CLEANUP_INTERVAL);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                // The cache outlives the session only through this Arc; when
                // the pump is gone the session is tearing down anyway.
                sweep_cache.cleanup();
                let (hits, misses) = sweep_cache.stats();
                tracing::trace!(size = sweep_cache.len(), hits, misses, "local cache swept");
            }
        });

        controller
    }

    pub fn cache(&self) -> &Arc<LocalStatusCache> {
        &self.cache
    }

    pub fn client(&self) -> &Arc<BusClient> {
        &self.client
    }

    /// Best-effort registration of a possible repository root.
    pub fn register_repository(&self, path: &Path) {
        self.client.register_repository_background(path);
    }

    /// Fetch statuses for a directory's entries (and the directory itself).
    /// Coalesced: while a fetch for `dir` is outstanding, further calls are
    /// no-ops. Results arrive through the event pump.
    pub fn request_directory(&self, dir: &Path) {
        if !self.cache.begin_directory_fetch(dir) {
            return;
        }
        let client = Arc::clone(&self.client);
        let dir = dir.to_path_buf();
        self.client.handle().spawn(async move {
            let mut paths = vec![dir.clone()];
            match tokio::fs::read_dir(&dir).await {
                Ok(mut entries) => {
                    while let Ok(Some(entry)) = entries.next_entry().await {
                        paths.push(entry.path());
                    }
                }
                Err(err) => {
                    tracing::debug!(dir = %dir.display(), error = %err, "cannot list directory");
                }
            }
            client.get_file_statuses_async(paths);
        });
    }
}
