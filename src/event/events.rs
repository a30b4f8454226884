use std::borrow::Cow;

use super::{clock::Time, content::Content};

/// A broadcast item from the room server to every client
///
/// Events have no session because they are meant for all clients. The index
/// is assigned by the bus that logged the event and is the only canonical
/// ordering: a reader that has handled event `i` resumes at `i + 1`.
#[derive(Debug, Clone)]
pub struct Event {
    index: u64,
    time: Time,
    content: Content,
}

impl Event {
    pub(crate) fn new(index: u64, time: Time, content: Content) -> Self {
        Self {
            index,
            time,
            content,
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn time(&self) -> Time {
        self.time
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn data(&self) -> &[u8] {
        self.content.data()
    }

    pub fn text(&self) -> Cow<'_, str> {
        self.content.text()
    }
}

/// A piece of data originating from a client application
///
/// The session identifies the client that sent it. Messages are handed to
/// the bus's handlers exactly once, in the order they were enqueued.
#[derive(Debug, Clone)]
pub struct Msg {
    session: String,
    time: Time,
    content: Content,
}

impl Msg {
    pub fn new(session: impl Into<String>, time: Time, content: Content) -> Self {
        Self {
            session: session.into(),
            time,
            content,
        }
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn time(&self) -> Time {
        self.time
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn data(&self) -> &[u8] {
        self.content.data()
    }

    pub fn text(&self) -> Cow<'_, str> {
        self.content.text()
    }
}
