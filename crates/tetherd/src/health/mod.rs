//! Structured health reporting for supervisor lifecycle events.

mod snapshot;

use std::sync::Arc;

use crate::lifecycle::SupervisorState;
use crate::process::{ChildInfo, ControllerError, ExitOutcome, StopReport};
use crate::triggers::WatchError;

pub use snapshot::{HealthFile, HealthWriteError};

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked after every state transition.
    fn state_changed(&self, from: SupervisorState, to: SupervisorState, child: Option<ChildInfo>);

    /// Invoked after a child was stopped by the supervisor.
    fn child_stopped(&self, report: &StopReport);

    /// Invoked when the active child exited on its own.
    fn child_exited(&self, child: ChildInfo, outcome: &ExitOutcome);

    /// Invoked when a child could not be started.
    fn start_failed(&self, error: &ControllerError);

    /// Invoked when the watched file can no longer be inspected.
    fn watch_failed(&self, error: &WatchError);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn state_changed(&self, from: SupervisorState, to: SupervisorState, child: Option<ChildInfo>) {
        (**self).state_changed(from, to, child);
    }

    fn child_stopped(&self, report: &StopReport) {
        (**self).child_stopped(report);
    }

    fn child_exited(&self, child: ChildInfo, outcome: &ExitOutcome) {
        (**self).child_exited(child, outcome);
    }

    fn start_failed(&self, error: &ControllerError) {
        (**self).start_failed(error);
    }

    fn watch_failed(&self, error: &WatchError) {
        (**self).watch_failed(error);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn state_changed(&self, from: SupervisorState, to: SupervisorState, child: Option<ChildInfo>) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "state_changed",
            from = %from,
            state = %to,
            pid = child.map(ChildInfo::pid),
            generation = child.map(|child| child.generation().get()),
            "supervisor state changed"
        );
    }

    fn child_stopped(&self, report: &StopReport) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "child_stopped",
            pid = report.child().pid(),
            generation = %report.child().generation(),
            exit = %report.outcome(),
            path = ?report.path(),
            "child stopped"
        );
    }

    fn child_exited(&self, child: ChildInfo, outcome: &ExitOutcome) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "child_exited",
            pid = child.pid(),
            generation = %child.generation(),
            exit = %outcome,
            "child exited unexpectedly"
        );
    }

    fn start_failed(&self, error: &ControllerError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "start_failed",
            error = %error,
            "child failed to start"
        );
    }

    fn watch_failed(&self, error: &WatchError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "watch_failed",
            error = %error,
            "configuration watch failed"
        );
    }
}
