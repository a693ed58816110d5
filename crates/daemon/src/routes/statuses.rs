use axum::{Json, Router, extract::State, routing::post};
use protocol::{
    StatusMap,
    messages::{FileStatusesRequest, RepositoryRequest},
};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/file-statuses", post(file_statuses))
        .route("/repository-status", post(repository_status))
}

/// Pure cache read; paths nobody tracks come back as `Unversioned`. This is
/// the endpoint behind the extension's coalesced directory fetches, so it
/// must never trigger git work.
pub async fn file_statuses(
    State(state): State<AppState>,
    Json(req): Json<FileStatusesRequest>,
) -> Json<StatusMap> {
    Json(state.cache.get_batch(&req.paths))
}

/// Full snapshot of one repository entry; empty when the root is unknown.
pub async fn repository_status(
    State(state): State<AppState>,
    Json(req): Json<RepositoryRequest>,
) -> Json<StatusMap> {
    Json(state.cache.repository_snapshot(&req.path).unwrap_or_default())
}
