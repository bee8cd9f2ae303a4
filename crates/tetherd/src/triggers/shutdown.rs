use std::thread::{self, JoinHandle};

use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::{debug, info};

use crate::lifecycle::EventSender;

use super::TRIGGERS_TARGET;
use super::errors::{ShutdownError, TriggerError};

const THREAD_NAME: &str = "tether-signals";

/// Abstraction over termination notification mechanisms.
pub trait ShutdownSignal: Send {
    /// Blocks until the next termination request and returns its signal
    /// number, or `None` once no further requests can arrive.
    fn wait(&mut self) -> Option<i32>;
}

/// Listener for SIGTERM and SIGINT.
///
/// Handlers are registered by [`install`](Self::install), so signals that
/// arrive before the listener thread starts waiting are queued, not lost.
pub struct SystemShutdownSignal {
    signals: Signals,
}

impl SystemShutdownSignal {
    /// Registers the signal handlers.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError::Install`] when registration fails.
    pub fn install() -> Result<Self, ShutdownError> {
        let signals =
            Signals::new([SIGTERM, SIGINT]).map_err(|source| ShutdownError::Install { source })?;
        Ok(Self { signals })
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&mut self) -> Option<i32> {
        self.signals.forever().next()
    }
}

/// Forwards every termination request to the coordinator on a background
/// thread.
///
/// The thread ends when the signal source closes or the coordinator stops
/// listening; the returned handle may be dropped to detach it.
pub fn spawn_shutdown_listener<S>(
    mut signal: S,
    events: EventSender,
) -> Result<JoinHandle<()>, TriggerError>
where
    S: ShutdownSignal + 'static,
{
    thread::Builder::new()
        .name(THREAD_NAME.to_string())
        .spawn(move || {
            while let Some(number) = signal.wait() {
                info!(
                    target: TRIGGERS_TARGET,
                    signal = number,
                    "termination signal received"
                );
                if !events.shutdown_requested(number) {
                    debug!(
                        target: TRIGGERS_TARGET,
                        "coordinator gone; signal listener exiting"
                    );
                    break;
                }
            }
        })
        .map_err(|source| TriggerError::Spawn {
            name: THREAD_NAME,
            source,
        })
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use rstest::rstest;

    use super::*;
    use crate::lifecycle::{Event, channel};

    struct ScriptedSignals(VecDeque<i32>);

    impl ShutdownSignal for ScriptedSignals {
        fn wait(&mut self) -> Option<i32> {
            self.0.pop_front()
        }
    }

    #[rstest]
    fn forwards_each_signal_until_the_source_closes() {
        let (sender, mut receiver) = channel();
        let handle = spawn_shutdown_listener(ScriptedSignals(VecDeque::from([15, 2])), sender)
            .expect("listener should spawn");
        handle.join().expect("listener should finish");

        let signals: Vec<i32> = receiver
            .drain()
            .into_iter()
            .filter_map(|event| match event {
                Event::ShutdownRequested { signal } => Some(signal),
                _ => None,
            })
            .collect();
        assert_eq!(signals, [15, 2]);
    }

    #[rstest]
    fn stops_once_the_coordinator_is_gone() {
        let (sender, receiver) = channel();
        drop(receiver);
        let handle = spawn_shutdown_listener(ScriptedSignals(VecDeque::from([15, 15, 15])), sender)
            .expect("listener should spawn");
        handle.join().expect("listener should finish");
    }
}
