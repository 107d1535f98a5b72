//! SSE adapter for bridge event subscriptions.
//!
//! Each event becomes one SSE message whose `event:` field is the event's
//! `type` tag and whose `data:` field is the JSON-serialized event.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::future;
use futures_util::stream::{Stream, StreamExt};

use mcp_bridge_core::BridgeEvent;
use mcp_bridge_runtime::Subscription;

/// Stream a subscription to one client.
///
/// The subscription is dropped (and unregistered) when the client
/// disconnects. A keep-alive comment is sent every `keep_alive`.
pub fn event_stream(
    subscription: Subscription,
    keep_alive: Duration,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static> {
    tracing::debug!(connection_id = subscription.connection_id(), "Event stream opened");

    let stream = subscription
        .into_stream()
        .filter_map(|event| future::ready(to_sse_event(&event).map(Ok)));

    Sse::new(stream).keep_alive(KeepAlive::new().interval(keep_alive).text("ping"))
}

/// Encode one bridge event.
pub fn to_sse_event(event: &BridgeEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event.event_type()).data(json)),
        Err(e) => {
            tracing::warn!("Failed to serialize event: {}", e);
            None
        }
    }
}
