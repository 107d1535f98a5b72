//! SSE events handler.

use std::convert::Infallible;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::sse::{Event, Sse};
use futures_util::stream::Stream;

use crate::dto::EventsQuery;
use crate::error::HttpError;
use crate::sse::event_stream;
use crate::state::AppState;

/// `GET /events?servers=a,b` - lifecycle events, tool refreshes and server
/// notifications, optionally limited to some servers.
pub async fn stream(
    State(state): State<AppState>,
    query: Result<Query<EventsQuery>, QueryRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static>, HttpError> {
    let Query(query) = query?;
    let subscription = state.service.subscribe(query.filter());
    Ok(event_stream(subscription, state.settings.keep_alive))
}
