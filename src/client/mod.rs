//! HTTP client for a room server.
//!
//! [`Client::run`] follows the server's event log over long-poll requests,
//! [`Client::send`] posts messages to the server's handlers.

mod decoder;
mod handler;
mod remote;

pub use decoder::LineDecoder;
pub use handler::EventHandler;
pub use remote::{Client, ClientError, RunError};
