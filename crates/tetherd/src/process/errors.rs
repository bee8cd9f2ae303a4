use std::ffi::OsString;
use std::io;

use thiserror::Error;

use super::handle::ChildInfo;

/// Errors surfaced by [`ProcessController`](super::ProcessController).
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The child could not be launched.
    #[error("failed to launch '{}': {source}", .program.to_string_lossy())]
    Spawn {
        /// Program that failed to start.
        program: OsString,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A live child already exists.
    #[error("child pid {} (generation {}) is still running", .child.pid(), .child.generation())]
    AlreadyRunning {
        /// The child that is still live.
        child: ChildInfo,
    },
    /// There is no child to stop.
    #[error("no child process is running")]
    NotRunning,
    /// The exit watcher thread could not be started; the child was killed.
    #[error("failed to start exit watcher for pid {pid}: {source}")]
    WatcherSpawn {
        /// Pid of the child that was killed.
        pid: u32,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}
