// Long-poll HTTP transport exposing an event bus
//
// GET  /rex/v0/events?start=<index>  newline-delimited JSON event stream
// POST /rex/v0/messages              session-tagged client message

use axum::{
    routing::{on, post, MethodFilter},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::event::EventBus;
use crate::shared::AppState;

// Public API - what other modules can use
pub use handlers::{post_message, stream_events};
pub use types::{EventLine, MessageBody};

// Internal modules
mod handlers;
mod types;

pub const EVENTS_PATH: &str = "/rex/v0/events";
pub const MESSAGES_PATH: &str = "/rex/v0/messages";

/// Builds the transport routes for `event_bus`
pub fn router(event_bus: EventBus) -> Router {
    Router::new()
        .route(
            EVENTS_PATH,
            on(MethodFilter::GET, handlers::stream_events)
                .fallback(handlers::events_method_not_allowed),
        )
        .route(
            MESSAGES_PATH,
            post(handlers::post_message).fallback(handlers::messages_method_not_allowed),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(AppState::new(event_bus))
}
