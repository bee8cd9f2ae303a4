//! Supervisor lifecycle: the state machine and the events that drive it.

mod coordinator;
mod errors;
mod events;
mod state;

pub use coordinator::{Coordinator, Termination};
pub use errors::SupervisorError;
pub use events::{Event, EventReceiver, EventSender, channel};
pub use state::SupervisorState;

pub(crate) const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");
