use serde::{Deserialize, Serialize};

use crate::event::{Event, Time};

/// One line of the `/events` stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLine {
    pub index: u64,
    pub time: Time,
    pub data: String,
}

impl From<&Event> for EventLine {
    fn from(event: &Event) -> Self {
        Self {
            index: event.index(),
            time: event.time(),
            data: event.text().into_owned(),
        }
    }
}

/// Body of a `POST /messages` request as sent by clients
///
/// The server only trusts `session` and `data`; `time` is informational.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageBody {
    pub session: String,
    pub time: Time,
    pub data: String,
}
