use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, error, info};

use crate::lifecycle::EventSender;

use super::TRIGGERS_TARGET;
use super::errors::{TriggerError, WatchError};

const THREAD_NAME: &str = "tether-poller";

/// Stat-based change detector for the watched file.
#[derive(Debug)]
pub struct ConfigPoller {
    path: Utf8PathBuf,
    last_modified: SystemTime,
}

impl ConfigPoller {
    /// Records the file's current modification time as the baseline.
    ///
    /// # Errors
    ///
    /// Returns a [`WatchError`] when the file cannot be inspected.
    pub fn new(path: impl Into<Utf8PathBuf>) -> Result<Self, WatchError> {
        let path = path.into();
        let last_modified = modified(&path)?;
        Ok(Self {
            path,
            last_modified,
        })
    }

    /// Watched file.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Newest modification time observed so far.
    pub fn last_modified(&self) -> SystemTime {
        self.last_modified
    }

    /// Stats the file once; returns the new timestamp when it moved forward.
    ///
    /// # Errors
    ///
    /// Returns a [`WatchError`] when the file cannot be inspected.
    pub fn poll(&mut self) -> Result<Option<SystemTime>, WatchError> {
        let current = modified(&self.path)?;
        if current > self.last_modified {
            self.last_modified = current;
            Ok(Some(current))
        } else {
            Ok(None)
        }
    }
}

fn modified(path: &Utf8Path) -> Result<SystemTime, WatchError> {
    let metadata = fs::metadata(path).map_err(|source| WatchError::Stat {
        path: path.to_path_buf(),
        source,
    })?;
    metadata.modified().map_err(|source| WatchError::Modified {
        path: path.to_path_buf(),
        source,
    })
}

/// Handle to the background poller thread.
pub struct PollerHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Asks the poller to stop and wakes it if it is sleeping.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = &self.handle {
            handle.thread().unpark();
        }
    }

    /// Stops the poller and waits for its thread.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::ThreadPanic`] when the thread panicked.
    pub fn join(mut self) -> Result<(), TriggerError> {
        self.shutdown();
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| TriggerError::ThreadPanic { name: THREAD_NAME }),
            None => Ok(()),
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Polls `poller` every `interval` on a background thread.
///
/// A newer timestamp is sent as a configuration change. A failed stat is
/// sent as a watch failure and ends the thread, as does a closed channel.
pub fn spawn_config_poller(
    poller: ConfigPoller,
    interval: Duration,
    events: EventSender,
) -> Result<PollerHandle, TriggerError> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    let handle = thread::Builder::new()
        .name(THREAD_NAME.to_string())
        .spawn(move || run_poll_loop(poller, interval, &flag, &events))
        .map_err(|source| TriggerError::Spawn {
            name: THREAD_NAME,
            source,
        })?;
    Ok(PollerHandle {
        shutdown,
        handle: Some(handle),
    })
}

fn run_poll_loop(
    mut poller: ConfigPoller,
    interval: Duration,
    shutdown: &AtomicBool,
    events: &EventSender,
) {
    info!(
        target: TRIGGERS_TARGET,
        path = %poller.path(),
        interval_ms = interval.as_millis(),
        "watching configuration file"
    );
    while sleep_unless_shutdown(interval, shutdown) {
        match poller.poll() {
            Ok(Some(modified)) => {
                info!(
                    target: TRIGGERS_TARGET,
                    path = %poller.path(),
                    "configuration file changed"
                );
                if !events.config_changed(modified) {
                    break;
                }
            }
            Ok(None) => {}
            Err(watch_error) => {
                error!(
                    target: TRIGGERS_TARGET,
                    error = %watch_error,
                    "configuration file can no longer be inspected"
                );
                let _ = events.watch_failed(watch_error);
                break;
            }
        }
    }
    debug!(target: TRIGGERS_TARGET, "poller stopped");
}

/// Sleeps for `interval`; returns `false` as soon as shutdown is requested.
fn sleep_unless_shutdown(interval: Duration, shutdown: &AtomicBool) -> bool {
    let deadline = Instant::now() + interval;
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::park_timeout(deadline - now);
    }
}
