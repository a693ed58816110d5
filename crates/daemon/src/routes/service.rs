use axum::{Json, Router, extract::State, routing::{get, post}};
use protocol::messages::ServiceStatus;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/service-status", get(service_status))
        .route("/clear-all-resources", post(clear_all_resources))
}

pub async fn service_status(State(state): State<AppState>) -> Json<ServiceStatus> {
    let (cache_hits, cache_misses) = state.cache.stats();
    Json(ServiceStatus {
        cache_size: state.cache.total_paths(),
        registered_repositories: state.cache.registered_roots().len(),
        service_ready: true,
        cache_hits,
        cache_misses,
        watcher: state.watcher.stats(),
    })
}

/// Invoked when the file manager's last window closes: drop every watch and
/// every cached entry. The daemon keeps running and re-registers repositories
/// as they are visited again.
pub async fn clear_all_resources(State(state): State<AppState>) -> Json<bool> {
    for root in state.cache.registered_roots() {
        state.watcher.remove_repository(&root);
    }
    state.cache.clear_all();
    Json(true)
}
