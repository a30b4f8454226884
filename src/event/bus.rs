use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, error, info, trace, warn};

use super::{
    clock::{Clock, Time},
    content::Content,
    events::{Event, Msg},
    handler::MessageHandler,
    subscription::Subscription,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("event bus is closed")]
    Closed,
}

/// Length of the log and whether the bus has been closed
///
/// Published through a watch channel so subscriptions can wait for the log
/// to grow past their cursor.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct LogState {
    pub len: u64,
    pub closed: bool,
}

/// State shared between the bus handles and its background tasks
pub(crate) struct Shared {
    /// Append-only history; written only by the append loop
    pub log: RwLock<Vec<Event>>,
    pub state: watch::Sender<LogState>,
    handlers: RwLock<Vec<Arc<dyn MessageHandler>>>,
    clock: Arc<Clock>,
}

impl Shared {
    fn close(&self) {
        let changed = self.state.send_if_modified(|s| {
            let was_open = !s.closed;
            s.closed = true;
            was_open
        });
        if changed {
            info!(events = self.state.borrow().len, "Event bus closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }
}

struct PendingEvent {
    time: Time,
    content: Content,
}

struct BusInner {
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<PendingEvent>,
    messages: mpsc::UnboundedSender<Msg>,
}

impl Drop for BusInner {
    fn drop(&mut self) {
        self.shared.close();
    }
}

/// The authoritative event log of a room and its message intake
///
/// Events appended with [`EventBus::event`] receive consecutive indices
/// starting at 0 and are fanned out to every [`Subscription`]. Messages
/// enqueued with [`EventBus::message`] are handed to the registered
/// [`MessageHandler`]s one at a time, in arrival order.
///
/// Handles are cheap to clone. The bus closes when [`EventBus::close`] is
/// called or the last handle is dropped. Constructing a bus spawns its
/// background tasks, so it must happen inside a Tokio runtime.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Creates a bus with no message handlers
    pub fn new() -> Self {
        Self::with_handlers(Vec::new())
    }

    /// Creates a bus that dispatches messages to `handlers`
    pub fn with_handlers(handlers: Vec<Arc<dyn MessageHandler>>) -> Self {
        let (state, _) = watch::channel(LogState::default());
        let shared = Arc::new(Shared {
            log: RwLock::new(Vec::new()),
            state,
            handlers: RwLock::new(handlers),
            clock: Clock::shared(),
        });

        let (events, pending_events) = mpsc::unbounded_channel();
        let (messages, pending_messages) = mpsc::unbounded_channel();

        tokio::spawn(append_loop(shared.clone(), pending_events));
        tokio::spawn(dispatch_loop(shared.clone(), pending_messages));

        Self {
            inner: Arc::new(BusInner {
                shared,
                events,
                messages,
            }),
        }
    }

    /// Appends an event to the log
    ///
    /// Returns as soon as the event is queued for appending; slow readers
    /// never hold up the caller. `Ok` means queued, not logged: events still
    /// queued when the bus closes are discarded and never reach a reader.
    pub fn event(&self, content: impl Into<Content>) -> Result<(), BusError> {
        let shared = &self.inner.shared;
        if shared.is_closed() {
            return Err(BusError::Closed);
        }
        let pending = PendingEvent {
            time: shared.clock.now(),
            content: content.into(),
        };
        self.inner
            .events
            .send(pending)
            .map_err(|_| BusError::Closed)
    }

    /// Enqueues a client message for the handlers
    ///
    /// Returns once the message is queued, not once it has been handled.
    pub fn message(
        &self,
        session: impl Into<String>,
        content: impl Into<Content>,
    ) -> Result<(), BusError> {
        let shared = &self.inner.shared;
        if shared.is_closed() {
            return Err(BusError::Closed);
        }
        let msg = Msg::new(session, shared.clock.now(), content.into());
        self.inner
            .messages
            .send(msg)
            .map_err(|_| BusError::Closed)
    }

    /// Opens a cursor at `start`
    ///
    /// `start` may lie beyond the end of the log; the subscription then waits
    /// until the log reaches it.
    pub fn subscribe(&self, start: u64) -> Subscription {
        trace!(start, "Opening subscription");
        Subscription::spawn(self.inner.shared.clone(), start)
    }

    /// Releases a subscription
    pub fn unsubscribe(&self, mut subscription: Subscription) {
        subscription.close();
    }

    /// Adds a message handler; it sees every message dispatched after this returns
    pub async fn add_handler(&self, handler: Arc<dyn MessageHandler>) {
        info!(handler_name = handler.name(), "Registering message handler");
        self.inner.shared.handlers.write().await.push(handler);
    }

    /// A handle that can append events but does not keep the bus open
    pub fn broadcaster(&self) -> Broadcaster {
        Broadcaster {
            shared: self.inner.shared.clone(),
            events: self.inner.events.clone(),
        }
    }

    /// Number of events appended so far
    pub fn len(&self) -> u64 {
        self.inner.shared.state.borrow().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes the bus
    ///
    /// Pending and future `next` calls on every subscription return `None`,
    /// and further calls to `event` or `message` fail with [`BusError::Closed`].
    pub fn close(&self) {
        self.inner.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shared.is_closed()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = *self.inner.shared.state.borrow();
        f.debug_struct("EventBus")
            .field("len", &state.len)
            .field("closed", &state.closed)
            .finish()
    }
}

/// Narrow capability to append events to a bus
///
/// Message handlers hold one of these to re-broadcast state. Unlike an
/// [`EventBus`] handle it does not keep the bus open.
#[derive(Clone)]
pub struct Broadcaster {
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<PendingEvent>,
}

impl Broadcaster {
    pub fn event(&self, content: impl Into<Content>) -> Result<(), BusError> {
        if self.shared.is_closed() {
            return Err(BusError::Closed);
        }
        let pending = PendingEvent {
            time: self.shared.clock.now(),
            content: content.into(),
        };
        self.events.send(pending).map_err(|_| BusError::Closed)
    }
}

impl fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadcaster").finish_non_exhaustive()
    }
}

/// Assigns indices and appends queued events, then wakes waiting subscriptions
async fn append_loop(shared: Arc<Shared>, mut pending: mpsc::UnboundedReceiver<PendingEvent>) {
    let mut state = shared.state.subscribe();

    loop {
        let next = tokio::select! {
            biased;
            _ = state.wait_for(|s| s.closed) => break,
            next = pending.recv() => next,
        };
        let Some(PendingEvent { time, content }) = next else {
            break;
        };

        let mut log = shared.log.write().await;
        let index = log.len() as u64;
        log.push(Event::new(index, time, content));
        shared.state.send_modify(|s| s.len = index + 1);
        drop(log);

        trace!(index, %time, "Event appended");
    }

    pending.close();
    let mut discarded = 0;
    while pending.try_recv().is_ok() {
        discarded += 1;
    }
    if discarded > 0 {
        warn!(discarded, "Discarded events queued after the bus closed");
    }

    debug!("Event append loop stopped");
}

/// Hands each queued message to every handler, one message at a time
async fn dispatch_loop(shared: Arc<Shared>, mut messages: mpsc::UnboundedReceiver<Msg>) {
    let mut state = shared.state.subscribe();

    loop {
        let msg = tokio::select! {
            _ = state.wait_for(|s| s.closed) => break,
            msg = messages.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };

        debug!(
            session = %msg.session(),
            time = %msg.time(),
            bytes = msg.content().len(),
            "Dispatching message"
        );

        // Snapshot so handlers may register other handlers without deadlocking.
        let handlers = shared.handlers.read().await.clone();
        for handler in &handlers {
            let outcome = AssertUnwindSafe(handler.handle_message(&msg))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(
                        handler = handler.name(),
                        session = %msg.session(),
                        error = %e,
                        "Message handler failed"
                    );
                }
                Err(_) => {
                    error!(
                        handler = handler.name(),
                        session = %msg.session(),
                        "Message handler panicked"
                    );
                }
            }
        }
    }

    debug!("Message dispatch loop stopped");
}
