//! Periodic maintenance: the health tick logs statistics and reins in a
//! cache that grew past its soft limit; the cleanup tick unregisters
//! repositories whose roots vanished from disk.

use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::state::AppState;

const HEALTH_INTERVAL: Duration = Duration::from_secs(30);
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Total cached path entries above which the health tick forces an
/// immediate cleanup instead of waiting for the five-minute pass.
const CACHE_SOFT_LIMIT: usize = 50_000;

pub fn spawn_health_tick(state: AppState) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(HEALTH_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tick.tick().await;
        loop {
            tick.tick().await;
            let (hits, misses) = state.cache.stats();
            let total_paths = state.cache.total_paths();
            let repositories = state.cache.registered_roots().len();
            tracing::info!(repositories, total_paths, hits, misses, "cache health");
            if total_paths > CACHE_SOFT_LIMIT {
                tracing::warn!(total_paths, "cache over soft limit, running cleanup");
                drop_vanished(&state);
            }
        }
    });
}

pub fn spawn_cleanup_tick(state: AppState) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(CLEANUP_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tick.tick().await;
        loop {
            tick.tick().await;
            drop_vanished(&state);
        }
    });
}

fn drop_vanished(state: &AppState) {
    for root in state.cache.cleanup() {
        state.watcher.remove_repository(&root);
    }
}
