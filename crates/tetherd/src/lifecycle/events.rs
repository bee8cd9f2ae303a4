//! The single event channel the coordinator blocks on.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::time::SystemTime;

use tracing::warn;

use crate::process::{ChildInfo, ExitListener, ExitOutcome};
use crate::triggers::WatchError;

use super::LIFECYCLE_TARGET;

/// Something the coordinator must react to.
#[derive(Debug)]
pub enum Event {
    /// The watched file has a newer modification time.
    ConfigChanged {
        /// Modification time observed by the poller.
        modified: SystemTime,
    },
    /// The supervisor was asked to terminate.
    ShutdownRequested {
        /// Signal number that requested termination.
        signal: i32,
    },
    /// A child exited without being asked to.
    ChildExited {
        /// The child that exited.
        child: ChildInfo,
        /// How it exited.
        outcome: ExitOutcome,
    },
    /// The watched file could no longer be inspected.
    WatchFailed {
        /// What went wrong.
        error: WatchError,
    },
}

/// Cloneable producer side of the event channel.
///
/// Each method returns `false` once the coordinator has gone away, which
/// tells long-lived producers to stop.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: Sender<Event>,
}

impl EventSender {
    /// Reports a configuration change.
    pub fn config_changed(&self, modified: SystemTime) -> bool {
        self.send(Event::ConfigChanged { modified })
    }

    /// Requests shutdown on behalf of `signal`.
    pub fn shutdown_requested(&self, signal: i32) -> bool {
        self.send(Event::ShutdownRequested { signal })
    }

    /// Reports that the watched file can no longer be inspected.
    pub fn watch_failed(&self, error: WatchError) -> bool {
        self.send(Event::WatchFailed { error })
    }

    fn send(&self, event: Event) -> bool {
        self.sender.send(event).is_ok()
    }
}

impl ExitListener for EventSender {
    fn unsolicited_exit(&self, child: ChildInfo, outcome: ExitOutcome) {
        if !self.send(Event::ChildExited { child, outcome }) {
            warn!(
                target: LIFECYCLE_TARGET,
                pid = child.pid(),
                generation = %child.generation(),
                "child exit reported after the coordinator stopped"
            );
        }
    }
}

/// Consumer side of the event channel, owned by the coordinator.
#[derive(Debug)]
pub struct EventReceiver {
    receiver: Receiver<Event>,
    deferred: Option<Event>,
}

impl EventReceiver {
    /// Blocks for the next event; `None` once every sender is gone.
    pub fn next(&mut self) -> Option<Event> {
        self.deferred
            .take()
            .or_else(|| self.receiver.recv().ok())
    }

    /// Folds configuration changes that are already queued into `latest`.
    ///
    /// Draining stops at the first event of another kind, which is kept and
    /// returned by the following [`next`](Self::next) so event order is
    /// preserved. Changes that arrive after the drain wait in the channel.
    pub fn coalesce_changes(&mut self, latest: SystemTime) -> SystemTime {
        let mut latest = latest;
        if self.deferred.is_some() {
            return latest;
        }
        loop {
            match self.receiver.try_recv() {
                Ok(Event::ConfigChanged { modified }) => latest = latest.max(modified),
                Ok(other) => {
                    self.deferred = Some(other);
                    break;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        latest
    }

    /// Takes every event still queued without blocking.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut drained: Vec<Event> = self.deferred.take().into_iter().collect();
        drained.extend(self.receiver.try_iter());
        drained
    }
}

/// Creates a connected sender and receiver.
pub fn channel() -> (EventSender, EventReceiver) {
    let (sender, receiver) = mpsc::channel();
    (
        EventSender { sender },
        EventReceiver {
            receiver,
            deferred: None,
        },
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;

    use super::*;

    fn at(seconds: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(seconds)
    }

    #[rstest]
    fn coalesces_queued_changes_to_the_newest() {
        let (sender, mut receiver) = channel();
        assert!(sender.config_changed(at(20)));
        assert!(sender.config_changed(at(30)));
        assert!(sender.config_changed(at(25)));

        assert_eq!(receiver.coalesce_changes(at(10)), at(30));
        assert!(receiver.drain().is_empty());
    }

    #[rstest]
    fn stops_coalescing_at_other_events() {
        let (sender, mut receiver) = channel();
        assert!(sender.config_changed(at(20)));
        assert!(sender.shutdown_requested(15));
        assert!(sender.config_changed(at(30)));

        assert_eq!(receiver.coalesce_changes(at(10)), at(20));
        assert!(matches!(
            receiver.next(),
            Some(Event::ShutdownRequested { signal: 15 })
        ));
        assert!(matches!(
            receiver.next(),
            Some(Event::ConfigChanged { modified }) if modified == at(30)
        ));
    }

    #[rstest]
    fn pending_deferred_event_blocks_further_coalescing() {
        let (sender, mut receiver) = channel();
        assert!(sender.shutdown_requested(2));
        assert!(sender.config_changed(at(40)));
        assert_eq!(receiver.coalesce_changes(at(10)), at(10));
        assert_eq!(receiver.coalesce_changes(at(10)), at(10));
        assert_eq!(receiver.drain().len(), 2);
    }

    #[rstest]
    fn unsolicited_exits_arrive_as_events() {
        let (sender, mut receiver) = channel();
        let child = ChildInfo::new(42, crate::process::Generation::new(3));
        sender.unsolicited_exit(child, ExitOutcome::Failed { code: 7 });
        let Some(Event::ChildExited { child: reported, outcome }) = receiver.next() else {
            panic!("expected a child exit event");
        };
        assert_eq!(reported, child);
        assert_eq!(outcome, ExitOutcome::Failed { code: 7 });
    }

    #[rstest]
    fn senders_report_a_closed_channel() {
        let (sender, receiver) = channel();
        drop(receiver);
        assert!(!sender.shutdown_requested(15));
        assert!(!sender.config_changed(at(1)));
    }
}
