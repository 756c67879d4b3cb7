//! Streaming agent diagnosis over Server-Sent Events.
//!
//! Each [`StreamEvent`] becomes one SSE event named after its `type`, with
//! the JSON event as data. The run is cancelled when the client goes away.

use std::convert::Infallible;

use axum::{
    Json,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};

use faultline_agent::StreamEvent;

use crate::error::ServerError;
use crate::routes::diagnose::{AgentRequest, require_error_log};
use crate::state::AppState;

/// POST /api/diagnose/stream
pub async fn stream_handler(
    State(state): State<AppState>,
    Json(request): Json<AgentRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
    require_error_log(&request.error_log)?;

    tracing::info!(error_len = request.error_log.len(), "Streaming diagnosis requested");
    let events = state.monitor.run(request.error_log).map(|event| Ok(to_sse(&event)));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn to_sse(event: &StreamEvent) -> Event {
    Event::default()
        .event(event.kind())
        .json_data(event)
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to serialize stream event");
            Event::default().event("error").data(e.to_string())
        })
}

