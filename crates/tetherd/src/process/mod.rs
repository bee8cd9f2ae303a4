//! Child process control: launching, liveness checks and graceful stops.
//!
//! [`ProcessController`] owns the single supervised child. Each start arms an
//! exit watcher thread that reaps the child and routes its [`ExitOutcome`] to
//! exactly one listener: the stop in progress, if one was armed before the
//! child was signalled, or the [`ExitListener`] otherwise.

mod command;
mod controller;
mod errors;
mod handle;
mod outcome;
mod watcher;

pub use command::ChildCommand;
pub use controller::{ProcessController, StopPath, StopReport};
pub use errors::ControllerError;
pub use handle::{ChildInfo, Generation};
pub use outcome::ExitOutcome;
pub use watcher::ExitListener;

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
