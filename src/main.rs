use async_trait::async_trait;
use rex::{
    Broadcaster, DiscoveryServer, EventBus, HandlerError, MessageHandler, Msg, RexConfig, Server,
    ServerConfig, ZoneConfig,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Logs every client message and re-broadcasts its text to all clients
struct RelayHandler {
    broadcaster: Broadcaster,
}

#[async_trait]
impl MessageHandler for RelayHandler {
    async fn handle_message(&self, msg: &Msg) -> Result<(), HandlerError> {
        info!(session = %msg.session(), time = %msg.time(), text = %msg.text(), "Message received");
        self.broadcaster
            .event(msg.content().clone())
            .map_err(|e| HandlerError::failed(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "RelayHandler"
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rex=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "Server exited with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = RexConfig::from_env()?;
    info!(room = %config.room.name, service = %config.room.service, "Starting REx server");

    let bus = EventBus::new();
    bus.add_handler(Arc::new(RelayHandler {
        broadcaster: bus.broadcaster(),
    }))
    .await;

    let mut server =
        Server::new(ServerConfig::new(config.room.clone(), bus).with_addr(config.addr.clone()))?;
    let addr = server.start().await?;
    info!("Server running on http://{}", addr);

    // Advertising is best effort; clients can still connect by address.
    let discovery = if config.discovery {
        match ZoneConfig::from_server(&server).and_then(|zone| DiscoveryServer::start(&zone)) {
            Ok(discovery) => Some(discovery),
            Err(e) => {
                warn!(error = %e, "Room will not be discoverable");
                None
            }
        }
    } else {
        None
    };

    let stopped = tokio::select! {
        result = server.wait() => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    let result = match stopped {
        Some(result) => result,
        None => {
            info!("Shutting down");
            server.shutdown_handle().shutdown();
            server.wait().await
        }
    };

    if let Some(discovery) = discovery {
        discovery.close()?;
    }
    Ok(result?)
}
