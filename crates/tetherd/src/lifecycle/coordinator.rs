//! The lifecycle state machine.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use crate::health::{HealthFile, HealthReporter};
use crate::process::{
    ChildCommand, ChildInfo, ControllerError, ExitOutcome, ProcessController, StopPath,
    StopReport,
};
use crate::triggers::WatchError;

use super::LIFECYCLE_TARGET;
use super::errors::SupervisorError;
use super::events::{self, Event, EventReceiver, EventSender};
use super::state::SupervisorState;

/// How the supervisor finished when no error occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// A termination signal asked the supervisor to stop.
    ShutdownRequested {
        /// Signal that was received.
        signal: i32,
    },
    /// The active child exited on its own.
    ChildExited {
        /// The child that exited.
        child: ChildInfo,
        /// How it exited.
        outcome: ExitOutcome,
    },
}

impl Termination {
    /// Process exit status the supervisor should return.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::ShutdownRequested { .. } => 0,
            Self::ChildExited { outcome, .. } => outcome.supervisor_exit_code(),
        }
    }
}

/// Drives start, restart and shutdown of the supervised child.
///
/// The coordinator owns the [`ProcessController`] and the only copy of the
/// [`SupervisorState`]. It blocks on one event channel fed by the config
/// poller, the signal listener and the controller's exit watchers, and
/// handles one event at a time, so a restart always completes before the
/// next event is looked at.
pub struct Coordinator {
    controller: ProcessController,
    command: ChildCommand,
    grace_period: Duration,
    events: EventReceiver,
    reporter: Arc<dyn HealthReporter>,
    health_file: Option<HealthFile>,
    state: SupervisorState,
    active: Option<ChildInfo>,
    applied: Option<SystemTime>,
}

impl Coordinator {
    /// Builds a coordinator and the sender its triggers publish to.
    pub fn new(
        command: ChildCommand,
        grace_period: Duration,
        reporter: Arc<dyn HealthReporter>,
    ) -> (Self, EventSender) {
        let (sender, events) = events::channel();
        let controller = ProcessController::new(Arc::new(sender.clone()));
        let coordinator = Self {
            controller,
            command,
            grace_period,
            events,
            reporter,
            health_file: None,
            state: SupervisorState::Starting,
            active: None,
            applied: None,
        };
        (coordinator, sender)
    }

    /// Treats changes up to `modified` as already reflected by the first
    /// child.
    #[must_use]
    pub fn with_applied_change(mut self, modified: SystemTime) -> Self {
        self.applied = Some(modified);
        self
    }

    /// Mirrors every state transition into `file`.
    #[must_use]
    pub fn with_health_file(mut self, file: HealthFile) -> Self {
        self.health_file = Some(file);
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Starts the child and processes events until the supervisor ends.
    ///
    /// # Errors
    ///
    /// Returns a [`SupervisorError`] when the child cannot be started or
    /// restarted, or when the watched file can no longer be inspected. The
    /// child is stopped before a watch failure is returned.
    pub fn run(mut self) -> Result<Termination, SupervisorError> {
        self.write_health();
        self.start_child()
            .map_err(|source| SupervisorError::Start { source })?;
        self.transition(SupervisorState::Running);

        let result = self.process_events();
        self.discard_pending();
        result
    }

    fn process_events(&mut self) -> Result<Termination, SupervisorError> {
        loop {
            let Some(event) = self.events.next() else {
                self.stop_active()?;
                self.transition(SupervisorState::Terminated);
                return Err(SupervisorError::EventsClosed);
            };
            match event {
                Event::ConfigChanged { modified } => {
                    if let Some(termination) = self.restart(modified)? {
                        return Ok(termination);
                    }
                }
                Event::ShutdownRequested { signal } => return self.shut_down(signal),
                Event::ChildExited { child, outcome } => {
                    if self.active == Some(child) {
                        return Ok(self.child_exited(child, outcome));
                    }
                    debug!(
                        target: LIFECYCLE_TARGET,
                        pid = child.pid(),
                        generation = %child.generation(),
                        exit = %outcome,
                        "ignoring exit of a retired child"
                    );
                }
                Event::WatchFailed { error } => return Err(self.watch_failed(error)),
            }
        }
    }

    /// Replaces the child. Returns a termination when the child turns out to
    /// have exited on its own before it could be stopped; such a child is
    /// not respawned.
    fn restart(&mut self, modified: SystemTime) -> Result<Option<Termination>, SupervisorError> {
        let latest = self.events.coalesce_changes(modified);
        if self.applied.is_some_and(|applied| latest <= applied) {
            debug!(
                target: LIFECYCLE_TARGET,
                "configuration change already applied"
            );
            return Ok(None);
        }
        info!(
            target: LIFECYCLE_TARGET,
            "configuration change detected; restarting child"
        );
        self.transition(SupervisorState::Restarting);
        let report = match self.stop_active() {
            Ok(report) => report,
            Err(error) => {
                self.transition(SupervisorState::Terminated);
                return Err(error);
            }
        };
        if report.path() == StopPath::AlreadyExited {
            let outcome = report.outcome().clone();
            return Ok(Some(self.terminate_after_exit(report.child(), outcome)));
        }
        self.applied = Some(latest);
        match self.start_child() {
            Ok(()) => {
                self.transition(SupervisorState::Running);
                Ok(None)
            }
            Err(source) => {
                self.transition(SupervisorState::Terminated);
                Err(SupervisorError::Restart { source })
            }
        }
    }

    fn shut_down(&mut self, signal: i32) -> Result<Termination, SupervisorError> {
        info!(
            target: LIFECYCLE_TARGET,
            signal,
            "shutdown requested; stopping child"
        );
        self.transition(SupervisorState::ShuttingDown);
        let stopped = self.stop_active();
        self.transition(SupervisorState::Terminated);
        stopped.map(|_| Termination::ShutdownRequested { signal })
    }

    fn child_exited(&mut self, child: ChildInfo, outcome: ExitOutcome) -> Termination {
        // Retires the handle and joins the watcher; the outcome is already known.
        if let Err(error) = self.controller.stop_graceful(self.grace_period) {
            debug!(target: LIFECYCLE_TARGET, %error, "no handle to retire");
        }
        self.terminate_after_exit(child, outcome)
    }

    fn terminate_after_exit(&mut self, child: ChildInfo, outcome: ExitOutcome) -> Termination {
        self.reporter.child_exited(child, &outcome);
        self.active = None;
        self.transition(SupervisorState::Terminated);
        Termination::ChildExited { child, outcome }
    }

    fn watch_failed(&mut self, error: WatchError) -> SupervisorError {
        self.reporter.watch_failed(&error);
        self.transition(SupervisorState::ShuttingDown);
        if let Err(stop) = self.stop_active() {
            warn!(target: LIFECYCLE_TARGET, error = %stop, "failed to stop child");
        }
        self.transition(SupervisorState::Terminated);
        SupervisorError::Watch { source: error }
    }

    fn start_child(&mut self) -> Result<(), ControllerError> {
        match self.controller.start(&self.command) {
            Ok(child) => {
                self.active = Some(child);
                Ok(())
            }
            Err(error) => {
                self.reporter.start_failed(&error);
                Err(error)
            }
        }
    }

    fn stop_active(&mut self) -> Result<StopReport, SupervisorError> {
        let report = self
            .controller
            .stop_graceful(self.grace_period)
            .map_err(|source| SupervisorError::Stop { source })?;
        self.active = None;
        if report.path() == StopPath::AlreadyExited {
            info!(
                target: LIFECYCLE_TARGET,
                pid = report.child().pid(),
                exit = %report.outcome(),
                "child had already exited before it was stopped"
            );
        }
        self.reporter.child_stopped(&report);
        Ok(report)
    }

    fn transition(&mut self, next: SupervisorState) {
        let previous = self.state;
        if !previous.can_transition_to(next) {
            warn!(
                target: LIFECYCLE_TARGET,
                from = %previous,
                to = %next,
                "unexpected state transition"
            );
        }
        self.state = next;
        self.reporter.state_changed(previous, next, self.active);
        self.write_health();
    }

    fn write_health(&self) {
        let Some(file) = self.health_file.as_ref() else {
            return;
        };
        if let Err(error) = file.write(self.state, self.active) {
            warn!(
                target: LIFECYCLE_TARGET,
                file = %file.path(),
                %error,
                "failed to write health snapshot"
            );
        }
    }

    fn discard_pending(&mut self) {
        for event in self.events.drain() {
            debug!(
                target: LIFECYCLE_TARGET,
                ?event,
                "ignoring event received after the supervisor stopped"
            );
        }
    }
}
