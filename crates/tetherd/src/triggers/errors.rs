use std::io;

use camino::Utf8PathBuf;
use thiserror::Error;

/// The watched file could not be inspected.
#[derive(Debug, Error)]
pub enum WatchError {
    /// `stat` failed, for example because the file was removed.
    #[error("failed to inspect watched file '{path}': {source}")]
    Stat {
        /// Watched file.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The platform does not report modification times.
    #[error("modification time unavailable for '{path}': {source}")]
    Modified {
        /// Watched file.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Failures managing trigger threads.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// The thread could not be spawned.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        /// Thread name.
        name: &'static str,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The thread panicked before it could be joined.
    #[error("{name} thread panicked")]
    ThreadPanic {
        /// Thread name.
        name: &'static str,
    },
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}
