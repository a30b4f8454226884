use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{watch, RwLock};

use rex::{Broadcaster, Client, Event, EventHandler, HandlerError, MessageHandler, Msg};

// ============================================================================
// Mock Infrastructure
// ============================================================================

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Message handler that records every message it is given
pub struct RecordingMessageHandler {
    messages: RwLock<Vec<Msg>>,
    count: watch::Sender<usize>,
}

impl RecordingMessageHandler {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            messages: RwLock::new(Vec::new()),
            count,
        }
    }

    pub async fn messages(&self) -> Vec<Msg> {
        self.messages.read().await.clone()
    }

    /// Waits until at least `n` messages arrived and returns all of them
    pub async fn wait_for(&self, n: usize) -> Vec<Msg> {
        let mut count = self.count.subscribe();
        tokio::time::timeout(WAIT_TIMEOUT, count.wait_for(|c| *c >= n))
            .await
            .expect("timed out waiting for messages")
            .expect("handler dropped");
        self.messages().await
    }
}

#[async_trait]
impl MessageHandler for RecordingMessageHandler {
    async fn handle_message(&self, msg: &Msg) -> Result<(), HandlerError> {
        let mut messages = self.messages.write().await;
        messages.push(msg.clone());
        self.count.send_replace(messages.len());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "RecordingMessageHandler"
    }
}

/// Message handler that turns every message into an event
pub struct RelayMessageHandler {
    broadcaster: Broadcaster,
}

impl RelayMessageHandler {
    pub fn new(broadcaster: Broadcaster) -> Self {
        Self { broadcaster }
    }
}

#[async_trait]
impl MessageHandler for RelayMessageHandler {
    async fn handle_message(&self, msg: &Msg) -> Result<(), HandlerError> {
        self.broadcaster
            .event(format!("{}: {}", msg.session(), msg.text()))
            .map_err(|e| HandlerError::failed(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "RelayMessageHandler"
    }
}

/// Client event handler that records events and can request a stop
pub struct RecordingEventHandler {
    events: RwLock<Vec<Event>>,
    stop_after: Option<usize>,
    shutdown: watch::Sender<bool>,
}

impl RecordingEventHandler {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            events: RwLock::new(Vec::new()),
            stop_after: None,
            shutdown,
        }
    }

    /// Signals shutdown once `n` events have been handled
    pub fn stop_after(n: usize) -> Self {
        Self {
            stop_after: Some(n),
            ..Self::new()
        }
    }

    /// Shutdown signal to pass to `Client::run`
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    pub async fn events(&self) -> Vec<Event> {
        self.events.read().await.clone()
    }

    pub async fn texts(&self) -> Vec<String> {
        self.events
            .read()
            .await
            .iter()
            .map(|e| e.text().into_owned())
            .collect()
    }

    pub async fn indices(&self) -> Vec<u64> {
        self.events.read().await.iter().map(|e| e.index()).collect()
    }
}

#[async_trait]
impl EventHandler for RecordingEventHandler {
    async fn handle_event(&self, _client: &Client, event: &Event) {
        let mut events = self.events.write().await;
        events.push(event.clone());
        if Some(events.len()) == self.stop_after {
            self.shutdown.send_replace(true);
        }
    }
}

impl Default for RecordingMessageHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for RecordingEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

