use axum::{Router, routing::get};

use crate::state::AppState;

pub mod events;
pub mod health;
pub mod repositories;
pub mod service;
pub mod statuses;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health::health))
        .merge(repositories::router())
        .merge(statuses::router())
        .merge(service::router())
        .route("/events", get(events::stream))
        .with_state(state);

    Router::new().nest(protocol::API_PREFIX, api)
}
