//! Single-child supervisor that restarts its child when a watched file
//! changes.
//!
//! `tetherd` launches one child process, passes its output through, and
//! keeps it running until one of three things happens:
//!
//! - the watched configuration file gets a newer modification time, in which
//!   case the child is stopped (SIGTERM, then SIGKILL after the grace period)
//!   and a fresh one is started;
//! - the supervisor receives SIGTERM or SIGINT, in which case the child is
//!   stopped the same way and the supervisor exits 0;
//! - the child exits on its own, in which case the supervisor exits with the
//!   child's status (1 when the child was killed by a signal).
//!
//! The [`process`] module owns the child and guarantees that an exit caused
//! by a stop is never reported as a crash. The [`lifecycle`] module holds the
//! state machine that reacts to the events produced by [`triggers`] and by
//! the child's exit watcher. Each child lifetime carries a [`Generation`], so
//! the exit of a replaced child can never end the supervisor.

pub mod health;
mod launch;
pub mod lifecycle;
pub mod process;
mod telemetry;
pub mod triggers;

pub use health::{HealthFile, HealthReporter, StructuredHealthReporter};
pub use launch::{
    ConfigLoader, LaunchError, StaticConfigLoader, SupervisorPlan, SystemConfigLoader,
    run_supervisor, run_supervisor_with, run_with_loader,
};
pub use lifecycle::{Coordinator, SupervisorError, SupervisorState, Termination};
pub use process::{ChildInfo, ExitOutcome, Generation, ProcessController};
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};

#[cfg(test)]
mod tests;
