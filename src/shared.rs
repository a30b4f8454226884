use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::event::EventBus;

/// Shared state handed to every transport handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(event_bus: EventBus) -> Self {
        Self { event_bus }
    }
}

/// Request failures reported to the peer as `{"error": <id>, "reason": <text>}`
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    ParameterInvalid(String),

    #[error("{0}")]
    ProtocolError(String),

    #[error("{0}")]
    RequestInvalid(String),

    #[error("request method must be one of [{allow}]")]
    MethodInvalid { allow: &'static str },

    #[error("event bus is closed")]
    BusClosed,
}

impl ApiError {
    /// Stable machine-readable identifier for the error
    pub fn id(&self) -> &'static str {
        match self {
            ApiError::ParameterInvalid(_) => "parameter_invalid",
            ApiError::ProtocolError(_) => "protocol_error",
            ApiError::RequestInvalid(_) => "http_request_invalid",
            ApiError::MethodInvalid { .. } => "http_method_invalid",
            ApiError::BusClosed => "bus_closed",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::ParameterInvalid(_)
            | ApiError::ProtocolError(_)
            | ApiError::RequestInvalid(_) => StatusCode::BAD_REQUEST,
            ApiError::MethodInvalid { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::BusClosed => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.id(),
            "reason": self.to_string(),
        }));

        match self {
            ApiError::MethodInvalid { allow } => {
                (self.status(), [(header::ALLOW, allow)], body).into_response()
            }
            _ => (self.status(), body).into_response(),
        }
    }
}
