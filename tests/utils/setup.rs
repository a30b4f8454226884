use std::net::SocketAddr;
use std::sync::Arc;

use rex::{Client, EventBus, MessageHandler, Room, Server, ServerConfig};

use super::mocks::{RecordingMessageHandler, RelayMessageHandler};

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub struct TestServer {
    pub server: Server,
    pub addr: SocketAddr,
    pub messages: Arc<RecordingMessageHandler>,
}

impl TestServer {
    /// A client pointed at this server with no session yet
    pub fn client(&self) -> Client {
        Client::new(self.addr.ip().to_string(), self.addr.port())
    }

    pub fn event(&self, text: &str) {
        self.server.event(text).expect("bus closed");
    }

    pub async fn shutdown(mut self) {
        self.server.shutdown_handle().shutdown();
        self.server.wait().await.expect("server failed");
    }
}

pub struct TestServerBuilder {
    room: Room,
    relay: bool,
}

impl TestServerBuilder {
    pub fn new() -> Self {
        Self {
            room: Room::new("Test Room", "_rex-test._tcp"),
            relay: false,
        }
    }

    pub fn with_room(mut self, name: &str, service: &str) -> Self {
        self.room = Room::new(name, service);
        self
    }

    /// Re-broadcast every client message as an event
    pub fn with_relay(mut self) -> Self {
        self.relay = true;
        self
    }

    pub async fn build(self) -> TestServer {
        let messages = Arc::new(RecordingMessageHandler::new());
        let bus = EventBus::with_handlers(vec![messages.clone() as Arc<dyn MessageHandler>]);
        if self.relay {
            bus.add_handler(Arc::new(RelayMessageHandler::new(bus.broadcaster())))
                .await;
        }

        let config = ServerConfig::new(self.room, bus).with_addr("127.0.0.1:0");
        let mut server = Server::new(config).expect("invalid server config");
        let addr = server.start().await.expect("failed to start server");

        TestServer {
            server,
            addr,
            messages,
        }
    }
}

impl Default for TestServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
