use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

use crate::event::{BusError, Content, EventBus};
use crate::room::{Room, RoomError};
use crate::transport;

/// Bind address used when none is configured
pub const DEFAULT_ADDR: &str = ":0";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Room(#[from] RoomError),

    #[error("Invalid address {addr:?}: {reason}")]
    InvalidAddr { addr: String, reason: &'static str },

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server already started")]
    AlreadyStarted,

    #[error("Server not started")]
    NotStarted,

    #[error("Too many waiters")]
    TooManyWaiters,

    #[error("HTTP server failed: {0}")]
    Serve(#[source] std::io::Error),

    #[error("HTTP server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// How a server is identified and where it listens
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub room: Arc<Room>,
    pub bus: EventBus,
    /// `host:port` to bind; `:port` binds every IPv4 interface. Defaults to
    /// [`DEFAULT_ADDR`].
    pub addr: Option<String>,
}

impl ServerConfig {
    pub fn new(room: Room, bus: EventBus) -> Self {
        Self {
            room: Arc::new(room),
            bus,
            addr: None,
        }
    }

    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = Some(addr.into());
        self
    }
}

enum State {
    Constructed,
    Serving(JoinHandle<std::io::Result<()>>),
    Stopped,
}

/// HTTP server exposing a room's event bus to clients
///
/// `start` binds the listener and serves in the background; `wait` blocks
/// until serving ends. Dropping the server and every [`ShutdownHandle`]
/// stops the listener.
pub struct Server {
    room: Arc<Room>,
    bus: EventBus,
    bind: SocketAddr,
    addr: Option<SocketAddr>,
    state: State,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Server {
    /// Validates `config` without binding anything
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        config.room.validate()?;
        let bind = parse_bind_addr(config.addr.as_deref().unwrap_or(DEFAULT_ADDR))?;
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            room: config.room,
            bus: config.bus,
            bind,
            addr: None,
            state: State::Constructed,
            shutdown: Arc::new(shutdown),
        })
    }

    /// Binds the listener and starts serving in the background
    ///
    /// Returns once the bind has succeeded or failed.
    #[instrument(skip(self), fields(room = %self.room.name, bind = %self.bind))]
    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        if !matches!(self.state, State::Constructed) {
            return Err(ServerError::AlreadyStarted);
        }

        let listener = TcpListener::bind(self.bind)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.bind,
                source,
            })?;
        let addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: self.bind,
            source,
        })?;

        let app = transport::router(self.bus.clone());
        let mut signal = self.shutdown.subscribe();
        let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
            // Also stops once every sender is gone.
            let _ = signal.wait_for(|stop| *stop).await;
        });

        self.state = State::Serving(tokio::spawn(async move { serve.await }));
        self.addr = Some(addr);

        info!(addr = %addr, "Server listening");
        Ok(addr)
    }

    /// Waits for the background server to stop and returns its outcome
    ///
    /// Only one call gets the outcome; later calls fail with
    /// [`ServerError::TooManyWaiters`]. Dropping the future before it
    /// completes leaves the server waitable.
    pub async fn wait(&mut self) -> Result<(), ServerError> {
        let handle = match &mut self.state {
            State::Serving(handle) => handle,
            State::Constructed => return Err(ServerError::NotStarted),
            State::Stopped => return Err(ServerError::TooManyWaiters),
        };

        let outcome = handle.await;
        self.state = State::Stopped;

        match outcome? {
            Ok(()) => {
                info!("Server stopped");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Server failed");
                Err(ServerError::Serve(e))
            }
        }
    }

    /// `start` followed by `wait`
    pub async fn run(&mut self) -> Result<(), ServerError> {
        self.start().await?;
        self.wait().await
    }

    /// Address the listener is bound to, once started
    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    /// Broadcasts `content` to all clients as the next event
    pub fn event(&self, content: impl Into<Content>) -> Result<(), BusError> {
        self.bus.event(content)
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn room(&self) -> Arc<Room> {
        self.room.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            bus: self.bus.clone(),
            signal: self.shutdown.clone(),
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            State::Constructed => "constructed",
            State::Serving(_) => "serving",
            State::Stopped => "stopped",
        };
        f.debug_struct("Server")
            .field("room", &self.room)
            .field("bind", &self.bind)
            .field("addr", &self.addr)
            .field("state", &state)
            .finish()
    }
}

/// Stops a running [`Server`] from anywhere
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    bus: EventBus,
    signal: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Closes the bus, ending every open event stream, then stops the listener
    pub fn shutdown(&self) {
        self.bus.close();
        self.signal.send_replace(true);
    }
}

/// Parses a bind address; an empty host means every IPv4 interface
fn parse_bind_addr(addr: &str) -> Result<SocketAddr, ServerError> {
    let invalid = |reason| ServerError::InvalidAddr {
        addr: addr.to_string(),
        reason,
    };

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| invalid("missing port in address"))?;
    let port = port
        .parse::<u16>()
        .map_err(|_| invalid("invalid address port"))?;

    let host = host.trim_start_matches('[').trim_end_matches(']');
    let ip = if host.is_empty() {
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    } else {
        host.parse::<IpAddr>()
            .map_err(|_| invalid("invalid address host"))?
    };

    Ok(SocketAddr::new(ip, port))
}
