use async_trait::async_trait;

use super::remote::Client;
use crate::event::Event;

/// Application callback for events received by [`Client::run`]
///
/// Called once per event, in index order, never concurrently for the same
/// client. The client is passed along so handlers can reply with
/// [`Client::send`].
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, client: &Client, event: &Event);
}
