use axum::{
    body::{Body, Bytes},
    extract::{rejection::QueryRejection, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use futures::stream;
use serde_json::Value;
use std::collections::HashMap;
use std::convert::Infallible;
use tracing::{debug, info, instrument, warn};

use super::types::EventLine;
use crate::event::Event;
use crate::shared::{ApiError, AppState};

/// HTTP handler streaming the event log
///
/// GET /rex/v0/events?start=<index>
/// Responds with one JSON object per line for every event from `start`
/// onwards. The response stays open and new events are written as they are
/// appended; it ends when the bus closes or the client goes away.
#[instrument(name = "stream_events", skip(state, query))]
pub async fn stream_events(
    State(state): State<AppState>,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = query.map_err(|e| ApiError::ParameterInvalid(e.body_text()))?;
    let start = parse_start(params.get("start").map(String::as_str))?;

    info!(start, "Opening event stream");

    let subscription = state.event_bus.subscribe(start);
    let lines = stream::unfold(subscription, |mut subscription| async move {
        let event = subscription.next().await?;
        match encode_line(&event) {
            Ok(line) => {
                debug!(index = event.index(), "Delivering event");
                Some((Ok::<_, Infallible>(line), subscription))
            }
            Err(e) => {
                warn!(index = event.index(), error = %e, "Failed to encode event");
                None
            }
        }
    });

    Ok((
        [(header::CONTENT_TYPE, "application/json")],
        Body::from_stream(lines),
    )
        .into_response())
}

/// HTTP handler accepting a client message
///
/// POST /rex/v0/messages
/// Body: {"session": <text>, "data": <text>, "time": <ignored>}
/// Returns 200 with an empty body once the message is queued on the bus
#[instrument(name = "post_message", skip(state, body))]
pub async fn post_message(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let msg: Value = serde_json::from_slice(&body).map_err(|e| {
        let reason = if e.is_eof() {
            "could not read a complete entity".to_string()
        } else {
            e.to_string()
        };
        ApiError::RequestInvalid(reason)
    })?;

    let data = msg
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::ProtocolError("missing message content".to_string()))?;
    let session = msg
        .get("session")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::ProtocolError("missing session identifier".to_string()))?;

    info!(session = %session, bytes = data.len(), "Message received");

    state
        .event_bus
        .message(session, data)
        .map_err(|_| ApiError::BusClosed)?;

    Ok(StatusCode::OK)
}

pub async fn events_method_not_allowed() -> ApiError {
    ApiError::MethodInvalid { allow: "GET" }
}

pub async fn messages_method_not_allowed() -> ApiError {
    ApiError::MethodInvalid { allow: "POST" }
}

/// An absent or empty `start` means the beginning of the log
fn parse_start(start: Option<&str>) -> Result<u64, ApiError> {
    match start {
        None | Some("") => Ok(0),
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| ApiError::ParameterInvalid("invalid start index".to_string())),
    }
}

fn encode_line(event: &Event) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(&EventLine::from(event))?;
    line.push('\n');
    Ok(line)
}
