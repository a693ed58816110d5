use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use protocol::messages::RepositoryRequest;
use std::path::PathBuf;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register-repository", post(register))
        .route("/unregister-repository", post(unregister))
        .route("/refresh-repository", post(refresh))
        .route("/clear-repository-cache", post(clear_cache))
        .route("/registered-repositories", get(registered))
}

/// Idempotent registration. A fresh registration publishes a discovery
/// event; either way an async scan is queued. Refusals (capacity, not a
/// repository) come back as `false`, never as an error across the bus.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RepositoryRequest>,
) -> Json<bool> {
    match state.cache.register(&req.path) {
        Ok(newly_registered) => {
            if newly_registered {
                tracing::info!(repo = %req.path.display(), "repository registered");
            }
            state.watcher.add_repository(&req.path);
            state.worker.enqueue(req.path);
            Json(true)
        }
        Err(err) => {
            tracing::warn!(repo = %req.path.display(), error = %err, "registration refused");
            Json(false)
        }
    }
}

pub async fn unregister(
    State(state): State<AppState>,
    Json(req): Json<RepositoryRequest>,
) -> Json<bool> {
    state.watcher.remove_repository(&req.path);
    let removed = state.cache.unregister(&req.path);
    if removed {
        tracing::info!(repo = %req.path.display(), "repository unregistered");
    }
    Json(removed)
}

/// Force a rescan of a registered repository. Returns whether the scan was
/// accepted; completion is announced through the change event.
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RepositoryRequest>,
) -> Json<bool> {
    if !state.cache.contains(&req.path) {
        tracing::debug!(repo = %req.path.display(), "refresh for unknown repository");
        return Json(false);
    }
    state.worker.enqueue(req.path);
    Json(true)
}

pub async fn clear_cache(
    State(state): State<AppState>,
    Json(req): Json<RepositoryRequest>,
) -> Json<bool> {
    Json(state.cache.clear_repository(&req.path))
}

pub async fn registered(State(state): State<AppState>) -> Json<Vec<PathBuf>> {
    Json(state.cache.registered_roots())
}
