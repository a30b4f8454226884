use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::DiscoveryError;
use crate::room::Room;

/// How long `lookup_room` keeps listening for answers
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(60);

/// The resolved DNS-SD record a server was found through
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceRecord {
    pub fullname: String,
    pub hostname: String,
    pub port: u16,
    pub addresses: Vec<IpAddr>,
    pub txt: BTreeMap<String, String>,
}

impl From<&ServiceInfo> for ServiceRecord {
    fn from(info: &ServiceInfo) -> Self {
        let mut addresses: Vec<IpAddr> = info.get_addresses().iter().copied().collect();
        addresses.sort();

        let txt = info
            .get_properties()
            .iter()
            .map(|prop| (prop.key().to_string(), prop.val_str().to_string()))
            .collect();

        Self {
            fullname: info.get_fullname().to_string(),
            hostname: info.get_hostname().to_string(),
            port: info.get_port(),
            addresses,
            txt,
        }
    }
}

/// A running server for a room, reachable at `addr`
#[derive(Debug, Clone)]
pub struct ServerDisco {
    pub room: Arc<Room>,
    pub addr: SocketAddr,
    pub record: ServiceRecord,
}

impl ServerDisco {
    /// Picks a connectable address from `record`, preferring IPv4
    pub fn from_record(room: Arc<Room>, record: ServiceRecord) -> Option<Self> {
        let ip = record
            .addresses
            .iter()
            .find(|ip| ip.is_ipv4())
            .or_else(|| record.addresses.first())
            .copied()?;

        Some(Self {
            room,
            addr: SocketAddr::new(ip, record.port),
            record,
        })
    }
}

/// Finds servers advertising `room`'s service and sends them to `servers`
///
/// Instance names are ignored; any server with the room's service type
/// matches. Returns after [`LOOKUP_TIMEOUT`] or as soon as the receiving end
/// of `servers` is dropped, so callers wanting one server can take the first
/// result and drop the receiver.
#[instrument(skip(room, servers), fields(service = %room.service))]
pub async fn lookup_room(
    room: Arc<Room>,
    servers: mpsc::Sender<ServerDisco>,
) -> Result<(), DiscoveryError> {
    room.validate()?;

    let service = room.service_domain();
    let daemon = ServiceDaemon::new()?;
    let events = daemon.browse(&service)?;

    let deadline = tokio::time::sleep(LOOKUP_TIMEOUT);
    tokio::pin!(deadline);

    let mut found = 0;
    loop {
        tokio::select! {
            _ = &mut deadline => {
                debug!(found, "Lookup timed out");
                break;
            }
            _ = servers.closed() => break,
            event = events.recv_async() => match event {
                Ok(ServiceEvent::ServiceResolved(info)) => {
                    let record = ServiceRecord::from(&info);
                    let Some(server) = ServerDisco::from_record(room.clone(), record) else {
                        debug!(instance = %info.get_fullname(), "Resolved service has no address");
                        continue;
                    };

                    info!(instance = %server.record.fullname, addr = %server.addr, "Found server");
                    found += 1;
                    if servers.send(server).await.is_err() {
                        break;
                    }
                }
                Ok(other) => debug!(event = ?other, "Discovery event"),
                Err(_) => break,
            }
        }
    }

    if let Err(e) = daemon.stop_browse(&service) {
        debug!(error = %e, "Failed to stop browsing");
    }
    if let Err(e) = daemon.shutdown() {
        warn!(error = %e, "Failed to shut down mDNS daemon");
    }
    Ok(())
}
