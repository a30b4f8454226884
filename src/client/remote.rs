use futures::StreamExt;
use reqwest::StatusCode;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{decoder::LineDecoder, handler::EventHandler};
use crate::discovery::ServerDisco;
use crate::event::{Clock, Content, Event};
use crate::transport::{EventLine, MessageBody, EVENTS_PATH, MESSAGES_PATH};

/// Pause before polling again after a stream that delivered nothing
const IDLE_POLL_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no session id")]
    NoSession,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{method} {url}: server responded {status}: {body}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
        body: String,
    },

    #[error("Malformed event from server: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Event stream skipped from index {expected} to {found}")]
    Gap { expected: u64, found: u64 },
}

/// Terminal error of [`Client::run`], with the index to resume from
#[derive(Debug, Error)]
#[error("event loop stopped at index {next}: {source}")]
pub struct RunError {
    pub next: u64,
    #[source]
    pub source: ClientError,
}

/// How one long-poll round finished
enum PollEnd {
    Cancelled,
    Ended { delivered: usize },
}

/// Client of a remote room server
///
/// `run` follows the server's event log and hands each event to the
/// configured [`EventHandler`]; `send` posts messages under the session set
/// up by `create_session`.
pub struct Client {
    host: String,
    port: u16,
    session: Option<String>,
    http: reqwest::Client,
    handler: Option<Arc<dyn EventHandler>>,
    clock: Arc<Clock>,
}

impl Client {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            session: None,
            http: reqwest::Client::new(),
            handler: None,
            clock: Clock::shared(),
        }
    }

    /// Like `new`, but resumes an existing session instead of creating one
    pub fn restore(host: impl Into<String>, port: u16, session: impl Into<String>) -> Self {
        let mut client = Self::new(host, port);
        client.session = Some(session.into());
        client
    }

    /// Points a new client at a server found through discovery
    pub fn from_disco(server: &ServerDisco) -> Self {
        Self::new(server.addr.ip().to_string(), server.addr.port())
    }

    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Use a preconfigured HTTP client (timeouts, proxies, ...)
    pub fn with_http(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    fn url(&self, path_and_query: &str) -> String {
        let path_and_query = path_and_query.trim_start_matches('/');
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("http://[{}]:{}/{}", self.host, self.port, path_and_query)
        } else {
            format!("http://{}:{}/{}", self.host, self.port, path_and_query)
        }
    }

    /// Registers a fresh session with the server
    ///
    /// The first message of the session carries `name` so the server learns
    /// who the client is. Does nothing if a session is already set.
    #[instrument(skip(self), fields(host = %self.host, port = self.port))]
    pub async fn create_session(&mut self, name: &str) -> Result<(), ClientError> {
        if self.session.is_some() {
            return Ok(());
        }

        let session = Uuid::new_v4().to_string();
        self.send_as(&session, Content::from(name)).await?;

        info!(session = %session, "Session created");
        self.session = Some(session);
        Ok(())
    }

    /// Sends a message to the server under this client's session
    pub async fn send(&self, content: impl Into<Content>) -> Result<(), ClientError> {
        let session = self.session.as_deref().ok_or(ClientError::NoSession)?;
        self.send_as(session, content.into()).await
    }

    async fn send_as(&self, session: &str, content: Content) -> Result<(), ClientError> {
        let body = MessageBody {
            session: session.to_string(),
            time: self.clock.now(),
            data: content.text().into_owned(),
        };
        let url = self.url(MESSAGES_PATH);

        let response = self.http.post(&url).json(&body).send().await?;
        if response.status() != StatusCode::OK {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                method: "POST",
                url,
                status,
                body,
            });
        }

        debug!(session = %session, time = %body.time, "Message sent");
        Ok(())
    }

    /// Processes events from the server starting at index `start`
    ///
    /// Long-polls the event stream and calls the handler for every event in
    /// index order, polling again whenever the server ends a stream. Stops
    /// when `shutdown` turns true (checked before every poll and after every
    /// event) and returns the index of the first unhandled event. A failed
    /// poll, or a stream that skips an index, is returned as an error;
    /// retrying is left to the caller.
    #[instrument(skip(self, shutdown), fields(host = %self.host, port = self.port))]
    pub async fn run(
        &self,
        start: u64,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<u64, RunError> {
        let mut next = start;

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.poll(&mut next, &mut shutdown).await {
                Ok(PollEnd::Cancelled) => break,
                Ok(PollEnd::Ended { delivered }) => {
                    info!(delivered, next, "Event stream ended");
                    if delivered == 0 {
                        tokio::select! {
                            _ = cancelled(&mut shutdown) => break,
                            _ = tokio::time::sleep(IDLE_POLL_DELAY) => {}
                        }
                    }
                }
                Err(source) => {
                    warn!(next, error = %source, "Event loop failed");
                    return Err(RunError { next, source });
                }
            }
        }

        info!(next, "Event loop stopped");
        Ok(next)
    }

    /// One long-poll round: request the stream at `next` and drain it
    async fn poll(
        &self,
        next: &mut u64,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<PollEnd, ClientError> {
        let url = self.url(&format!("{}?start={}", EVENTS_PATH, next));
        debug!(start = *next, "Polling for events");

        let response = tokio::select! {
            _ = cancelled(shutdown) => return Ok(PollEnd::Cancelled),
            response = self.http.get(&url).send() => response?,
        };
        if response.status() != StatusCode::OK {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                method: "GET",
                url,
                status,
                body,
            });
        }

        let mut body = response.bytes_stream();
        let mut decoder = LineDecoder::new();
        let mut delivered = 0;

        loop {
            let chunk = tokio::select! {
                _ = cancelled(shutdown) => return Ok(PollEnd::Cancelled),
                chunk = body.next() => chunk,
            };
            match chunk {
                Some(Ok(bytes)) => decoder.push(&bytes),
                Some(Err(e)) => {
                    // A connection dropped mid-stream is resumed by the next poll.
                    debug!(error = %e, "Event stream interrupted");
                    break;
                }
                None => break,
            }

            while let Some(line) = decoder.next_line() {
                let line = line?;
                if line.index < *next {
                    debug!(index = line.index, "Skipping event already handled");
                    continue;
                }
                if line.index > *next {
                    return Err(ClientError::Gap {
                        expected: *next,
                        found: line.index,
                    });
                }

                let event = into_event(line);
                if let Some(handler) = &self.handler {
                    handler.handle_event(self, &event).await;
                }
                *next = event.index() + 1;
                delivered += 1;

                if *shutdown.borrow() {
                    return Ok(PollEnd::Cancelled);
                }
            }
        }

        if decoder.pending() > 0 {
            debug!(
                bytes = decoder.pending(),
                "Discarding partial event at end of stream"
            );
        }
        Ok(PollEnd::Ended { delivered })
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("session", &self.session)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

fn into_event(line: EventLine) -> Event {
    Event::new(line.index, line.time, Content::from_text(line.data))
}

/// Resolves once `shutdown` is true; never resolves if the sender is gone
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
