//! External triggers feeding the coordinator: termination signals and the
//! configuration file poller.

mod errors;
mod poller;
mod shutdown;

pub use errors::{ShutdownError, TriggerError, WatchError};
pub use poller::{ConfigPoller, PollerHandle, spawn_config_poller};
pub use shutdown::{ShutdownSignal, SystemShutdownSignal, spawn_shutdown_listener};

pub(crate) const TRIGGERS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::triggers");
