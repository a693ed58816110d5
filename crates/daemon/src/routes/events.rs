use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use tokio_stream::{
    Stream, StreamExt, wrappers::BroadcastStream, wrappers::errors::BroadcastStreamRecvError,
};

use crate::state::AppState;

/// The signal surface: every cache change and discovery event, serialized as
/// one SSE data frame each. Slow subscribers that lag simply miss events;
/// their local caches recover through the TTL.
pub async fn stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.cache.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|item| match item {
        Ok(event) => match Event::default().json_data(&event) {
            Ok(frame) => Some(Ok(frame)),
            Err(err) => {
                tracing::error!(error = %err, "failed to encode bus event");
                None
            }
        },
        Err(BroadcastStreamRecvError::Lagged(missed)) => {
            tracing::warn!(missed, "event subscriber lagged, dropping");
            None
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
