//! Live event stream over Server-Sent Events.
//!
//! Best-effort and non-durable: a client that connects after an event fired
//! never sees it, and a lagging client silently loses the oldest frames.
//! Clients that need the authoritative state poll the job endpoints.

use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    extract::Extension,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
};
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

use crate::app::services::AppServices;

/// GET /stream
pub async fn stream_events(
    Extension(services): Extension<Arc<AppServices>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.scheduler.subscribe();

    let greeting = tokio_stream::once(Ok(SseEvent::default()
        .event("connected")
        .data("{}")));

    let events = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(event) => {
            let data = serde_json::to_string(&event.payload).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(event.topic).data(data)))
        }
        // Lagged receiver; skip the gap and keep streaming.
        Err(_) => None,
    });

    Sse::new(greeting.chain(events))
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
