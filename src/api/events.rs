/// Server-sent event stream for live dashboards
///
/// Bridges the organization's broadcast channel onto an SSE response. The
/// subscription lives exactly as long as the connection: when the client
/// disconnects the stream (and its receiver) is dropped, which is the
/// unsubscribe.

use crate::api::{organization_id, AppState};
use axum::{
    extract::State,
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

/// Keepalive interval, matching typical proxy idle timeouts
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Create the event stream routes
pub fn create_event_routes() -> Router<AppState> {
    Router::new().route("/api/events", get(stream_events))
}

/// Subscribe to the caller's organization channel
///
/// GET /api/events
///
/// Emits `{"type": "...", "data": {...}}` frames. A subscriber that falls
/// further behind than the channel buffer loses the oldest events and the
/// stream continues from wherever the channel currently is.
async fn stream_events(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let org = organization_id(&headers);
    tracing::info!("📡 SSE subscriber connected on '{}'", org);

    let receiver = state.broadcaster.subscribe(&org).await;

    let stream = BroadcastStream::new(receiver).filter_map(|message| match message {
        Ok(event) => match Event::default().json_data(&event) {
            Ok(frame) => Some(Ok(frame)),
            Err(e) => {
                tracing::error!("❌ Failed to serialize event frame: {}", e);
                None
            }
        },
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!("📡 SSE subscriber lagged, skipped {} events", skipped);
            None
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEPALIVE_INTERVAL)
            .text("keepalive"),
    )
}
