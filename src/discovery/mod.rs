// Local network service discovery (mDNS / DNS-SD)
//
// A server advertises its room with a DiscoveryServer built from a
// ZoneConfig; clients find it with lookup_room.

use thiserror::Error;

use crate::room::RoomError;

// Public API - what other modules can use
pub use lookup::{lookup_room, ServerDisco, ServiceRecord, LOOKUP_TIMEOUT};
pub use zone::{DiscoveryServer, ZoneConfig};

// Internal modules
mod lookup;
mod zone;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Server not bound to a port")]
    NotBound,

    #[error("Invalid host ip: {0:?}")]
    InvalidHost(String),

    #[error("Invalid port: {0:?}")]
    InvalidPort(String),

    #[error(transparent)]
    Room(#[from] RoomError),

    #[error("mDNS failure: {0}")]
    Mdns(#[from] mdns_sd::Error),
}
