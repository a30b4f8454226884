use mdns_sd::{ServiceDaemon, ServiceInfo};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{info, warn};

use super::DiscoveryError;
use crate::room::Room;
use crate::server::Server;

/// What a server advertises about its room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneConfig {
    pub room: Arc<Room>,
    pub port: u16,
    /// Addresses to advertise; empty means every interface address
    pub ips: Vec<IpAddr>,
    /// TXT record entries, `key=value` or a bare `key`
    pub txt: Vec<String>,
}

impl ZoneConfig {
    /// Describes a started server from its bound address
    pub fn from_server(server: &Server) -> Result<Self, DiscoveryError> {
        let addr = server.addr().ok_or(DiscoveryError::NotBound)?;
        Ok(Self::from_addr(server.room(), addr))
    }

    pub fn from_addr(room: Arc<Room>, addr: SocketAddr) -> Self {
        let ips = if addr.ip().is_unspecified() {
            Vec::new()
        } else {
            vec![addr.ip()]
        };

        Self {
            room,
            port: addr.port(),
            ips,
            txt: Vec::new(),
        }
    }

    /// Parses a `host:port` string; an empty or unspecified host means all
    /// interfaces
    pub fn parse(room: Arc<Room>, addr: &str) -> Result<Self, DiscoveryError> {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| DiscoveryError::InvalidPort(addr.to_string()))?;

        let port = port
            .parse::<u16>()
            .map_err(|_| DiscoveryError::InvalidPort(port.to_string()))?;

        let host = host.trim_start_matches('[').trim_end_matches(']');
        let ips = if host.is_empty() {
            Vec::new()
        } else {
            let ip = host
                .parse::<IpAddr>()
                .map_err(|_| DiscoveryError::InvalidHost(host.to_string()))?;
            if ip.is_unspecified() {
                Vec::new()
            } else {
                vec![ip]
            }
        };

        Ok(Self {
            room,
            port,
            ips,
            txt: Vec::new(),
        })
    }

    pub fn with_txt(mut self, txt: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.txt = txt.into_iter().map(Into::into).collect();
        self
    }

    /// The advertised instance name: `<YYYYMMDDhhmmss>_<pid>_<room name>`
    pub fn instance(&self) -> String {
        let now = chrono::Local::now().format("%Y%m%d%H%M%S");
        format!("{}_{}_{}", now, std::process::id(), self.room.name)
    }

    fn properties(&self) -> HashMap<String, String> {
        self.txt
            .iter()
            .map(|entry| match entry.split_once('=') {
                Some((key, value)) => (key.to_string(), value.to_string()),
                None => (entry.clone(), String::new()),
            })
            .collect()
    }

    fn service_info(&self) -> Result<ServiceInfo, DiscoveryError> {
        let host_name = format!("rex-{}.local.", std::process::id());
        let info = ServiceInfo::new(
            &self.room.service_domain(),
            &self.instance(),
            &host_name,
            &self.ips[..],
            self.port,
            self.properties(),
        )?;

        if self.ips.is_empty() {
            Ok(info.enable_addr_auto())
        } else {
            Ok(info)
        }
    }
}

/// Handle to a running mDNS advertisement
///
/// Advertising stops on [`DiscoveryServer::close`] or when the handle is
/// dropped.
pub struct DiscoveryServer {
    daemon: Option<ServiceDaemon>,
    fullname: String,
}

impl DiscoveryServer {
    /// Starts advertising `zone` in the background
    pub fn start(zone: &ZoneConfig) -> Result<Self, DiscoveryError> {
        zone.room.validate()?;

        let info = zone.service_info()?;
        let fullname = info.get_fullname().to_string();

        let daemon = ServiceDaemon::new()?;
        daemon.register(info)?;

        info!(
            instance = %fullname,
            port = zone.port,
            ips = ?zone.ips,
            "Discovery server started"
        );

        Ok(Self {
            daemon: Some(daemon),
            fullname,
        })
    }

    /// Fully qualified name of the advertised instance
    pub fn fullname(&self) -> &str {
        &self.fullname
    }

    pub fn close(mut self) -> Result<(), DiscoveryError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<(), DiscoveryError> {
        let Some(daemon) = self.daemon.take() else {
            return Ok(());
        };

        daemon.unregister(&self.fullname)?;
        daemon.shutdown()?;
        info!(instance = %self.fullname, "Discovery server stopped");
        Ok(())
    }
}

impl Drop for DiscoveryServer {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(instance = %self.fullname, error = %e, "Failed to stop discovery server");
        }
    }
}

impl std::fmt::Debug for DiscoveryServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryServer")
            .field("fullname", &self.fullname)
            .field("running", &self.daemon.is_some())
            .finish()
    }
}
