// Event bus components
//
// The in-process log of events broadcast by a room server, the intake queue
// for messages sent by clients, and the cursor type readers use to follow
// the log.

// Public API - what other modules can use
pub use bus::{Broadcaster, BusError, EventBus};
pub use clock::{Clock, ParseTimeError, Time};
pub use content::Content;
pub use events::{Event, Msg};
pub use handler::{HandlerError, MessageHandler};
pub use subscription::Subscription;

// Internal modules
mod bus;
mod clock;
mod content;
mod events;
mod handler;
mod subscription;
