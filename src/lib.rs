// Library crate for REx room servers and clients
// This file exposes the public API for the binary and integration tests

pub mod client;
pub mod config;
pub mod discovery;
pub mod event;
pub mod room;
pub mod server;
pub mod shared;
pub mod transport;

// Re-export commonly used types for easier access in tests
pub use client::{Client, ClientError, EventHandler, RunError};
pub use config::{ConfigError, RexConfig};
pub use discovery::{lookup_room, DiscoveryError, DiscoveryServer, ServerDisco, ZoneConfig};
pub use event::{
    Broadcaster, BusError, Content, Event, EventBus, HandlerError, MessageHandler, Msg,
    Subscription, Time,
};
pub use room::{Room, RoomError};
pub use server::{Server, ServerConfig, ServerError, ShutdownHandle};
pub use shared::ApiError;
