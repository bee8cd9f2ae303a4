use thiserror::Error;

use crate::process::ControllerError;
use crate::triggers::WatchError;

/// Failures that end the supervisor with status 1.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The first child could not be started.
    #[error("failed to start child: {source}")]
    Start {
        /// Underlying controller error.
        #[source]
        source: ControllerError,
    },
    /// The replacement child could not be started after a restart.
    #[error("failed to restart child: {source}")]
    Restart {
        /// Underlying controller error.
        #[source]
        source: ControllerError,
    },
    /// The running child could not be stopped.
    #[error("failed to stop child: {source}")]
    Stop {
        /// Underlying controller error.
        #[source]
        source: ControllerError,
    },
    /// The watched file could no longer be inspected.
    #[error("configuration watch failed: {source}")]
    Watch {
        /// Underlying watch error.
        #[source]
        source: WatchError,
    },
    /// Every event producer went away.
    #[error("event channel closed unexpectedly")]
    EventsClosed,
}
