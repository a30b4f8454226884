use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::trace;

use super::{
    bus::{LogState, Shared},
    events::Event,
};

/// A reader's cursor into the event log of one bus
///
/// Delivery is pull based: a background task waits until the log holds the
/// event at the cursor, then waits until [`Subscription::next`] asks for it,
/// and only then hands it over. A slow reader therefore never causes events
/// to pile up in memory on its behalf.
///
/// A subscription is owned by a single reader. Dropping it (or calling
/// [`Subscription::close`]) stops the background task.
pub struct Subscription {
    requests: Option<mpsc::Sender<oneshot::Sender<Event>>>,
    cancel: Option<oneshot::Sender<()>>,
    /// Reply slot of a request whose caller stopped waiting
    pending: Option<oneshot::Receiver<Event>>,
    position: u64,
    last: Option<Event>,
}

impl Subscription {
    pub(crate) fn spawn(shared: Arc<Shared>, start: u64) -> Self {
        let (requests, request_rx) = mpsc::channel(1);
        let (cancel, cancel_rx) = oneshot::channel();
        let state = shared.state.subscribe();

        tokio::spawn(fulfill(shared, state, request_rx, cancel_rx, start));

        Self {
            requests: Some(requests),
            cancel: Some(cancel),
            pending: None,
            position: start,
            last: None,
        }
    }

    /// Waits for the event at the cursor and advances past it
    ///
    /// Returns `None` once the subscription or its bus has been closed; it
    /// never returns an error and never blocks forever after a close.
    ///
    /// Cancel safe: if the returned future is dropped, the event it was
    /// waiting for is returned by the next call.
    pub async fn next(&mut self) -> Option<Event> {
        let requests = self.requests.as_ref()?;

        if self.pending.is_none() {
            let (reply, event) = oneshot::channel();
            if requests.send(reply).await.is_err() {
                self.close();
                return None;
            }
            self.pending = Some(event);
        }

        let event = self.pending.as_mut()?;
        let delivered = event.await;
        self.pending = None;

        match delivered {
            Ok(event) => {
                self.position = event.index() + 1;
                self.last = Some(event.clone());
                Some(event)
            }
            Err(_) => {
                self.close();
                None
            }
        }
    }

    /// The most recently delivered event
    pub fn event(&self) -> Option<&Event> {
        self.last.as_ref()
    }

    /// Index of the next event this subscription will deliver
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn is_closed(&self) -> bool {
        self.requests.is_none()
    }

    /// Releases the subscription; later calls to `next` return `None`
    pub fn close(&mut self) {
        if self.requests.take().is_some() {
            trace!(position = self.position, "Subscription closed");
        }
        self.pending = None;
        drop(self.cancel.take());
    }
}

/// Per-subscription task feeding events to the reader one request at a time
async fn fulfill(
    shared: Arc<Shared>,
    mut state: watch::Receiver<LogState>,
    mut requests: mpsc::Receiver<oneshot::Sender<Event>>,
    mut cancel: oneshot::Receiver<()>,
    start: u64,
) {
    let mut cursor = start;

    loop {
        // Phase one: wait until the log has grown past the cursor.
        let closed = tokio::select! {
            _ = &mut cancel => return,
            ready = state.wait_for(|s| s.closed || s.len > cursor) => match ready {
                Ok(s) => s.closed,
                Err(_) => true,
            },
        };
        if closed {
            trace!(cursor, "Subscription ended by bus close");
            return;
        }

        let event = match shared.log.read().await.get(cursor as usize) {
            Some(event) => event.clone(),
            None => continue,
        };

        // Phase two: wait until the reader asks for the next event.
        let reply = tokio::select! {
            _ = &mut cancel => return,
            _ = state.wait_for(|s| s.closed) => return,
            request = requests.recv() => match request {
                Some(reply) => reply,
                None => return,
            },
        };

        // A reply slot dropped by a closed reader leaves the cursor in place.
        if reply.send(event).is_ok() {
            cursor += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::event::{Content, EventBus};
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_subscription_tracks_position_and_last_event() {
        let bus = EventBus::new();
        bus.event("first").unwrap();
        bus.event("second").unwrap();

        let mut sub = bus.subscribe(0);
        assert_eq!(sub.position(), 0);
        assert!(sub.event().is_none());

        let event = sub.next().await.unwrap();
        assert_eq!(event.index(), 0);
        assert_eq!(sub.position(), 1);
        assert_eq!(sub.event().map(|e| e.index()), Some(0));

        let event = sub.next().await.unwrap();
        assert_eq!(event.text(), "second");
        assert_eq!(sub.position(), 2);
    }

    #[tokio::test]
    async fn test_subscription_beyond_log_waits_for_growth() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(2);

        let pending = timeout(Duration::from_millis(50), sub.next()).await;
        assert!(pending.is_err(), "no event at index 2 yet");

        for text in ["a", "b", "c"] {
            bus.event(Content::from(text)).unwrap();
        }

        let event = timeout(Duration::from_secs(1), sub.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.index(), 2);
        assert_eq!(event.text(), "c");
    }

    #[tokio::test]
    async fn test_closed_subscription_returns_none() {
        let bus = EventBus::new();
        bus.event("a").unwrap();

        let mut sub = bus.subscribe(0);
        sub.close();

        assert!(sub.is_closed());
        assert!(sub.next().await.is_none());
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_next_after_handover_keeps_event() {
        let bus = EventBus::new();
        bus.event("a").unwrap();
        bus.event("b").unwrap();

        let mut sub = bus.subscribe(0);
        {
            let mut next = Box::pin(sub.next());
            assert!(futures::poll!(next.as_mut()).is_pending());
            // Let the background task hand event 0 over, then give up on it.
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let first = timeout(Duration::from_secs(1), sub.next())
            .await
            .unwrap()
            .unwrap();
        let second = timeout(Duration::from_secs(1), sub.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!((first.index(), second.index()), (0, 1));
        assert_eq!(sub.position(), 2);
    }

    #[tokio::test]
    async fn test_abandoned_request_does_not_skip_events() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(0);

        // Nothing logged yet, so this request is abandoned while waiting.
        let abandoned = timeout(Duration::from_millis(20), sub.next()).await;
        assert!(abandoned.is_err());

        bus.event("a").unwrap();
        bus.event("b").unwrap();

        let first = timeout(Duration::from_secs(1), sub.next())
            .await
            .unwrap()
            .unwrap();
        let second = timeout(Duration::from_secs(1), sub.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!((first.index(), second.index()), (0, 1));
    }
}
