//! Ownership of the single supervised child.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::waitpid;
use tracing::{info, warn};

use super::PROCESS_TARGET;
use super::command::ChildCommand;
use super::errors::ControllerError;
use super::handle::{ChildHandle, ChildInfo, Generation};
use super::outcome::ExitOutcome;
use super::watcher::{Delivery, ExitListener, ExitRoute, raw_pid, spawn_watcher};

/// How a graceful stop concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPath {
    /// The child exited within the grace period.
    Graceful,
    /// The grace period elapsed and the child was killed.
    Forced,
    /// The child had already exited when the stop began.
    AlreadyExited,
}

/// Result of [`ProcessController::stop_graceful`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReport {
    child: ChildInfo,
    outcome: ExitOutcome,
    path: StopPath,
}

impl StopReport {
    /// The child that was stopped.
    pub fn child(&self) -> ChildInfo {
        self.child
    }

    /// How the child terminated.
    pub fn outcome(&self) -> &ExitOutcome {
        &self.outcome
    }

    /// Whether the stop needed escalation.
    pub fn path(&self) -> StopPath {
        self.path
    }
}

/// Starts, checks and stops the one supervised child.
///
/// Start and stop take `&mut self`, so a restart and a shutdown can never
/// interleave. At most one handle is live at a time; it is replaced on every
/// start and retired once its exit watcher has finished.
pub struct ProcessController {
    listener: Arc<dyn ExitListener>,
    generation: Generation,
    current: Option<ChildHandle>,
}

impl ProcessController {
    /// Builds a controller that reports unsolicited exits to `listener`.
    pub fn new(listener: Arc<dyn ExitListener>) -> Self {
        Self {
            listener,
            generation: Generation::default(),
            current: None,
        }
    }

    /// Launches the child and arms its exit watcher.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::AlreadyRunning`] while a previous child is
    /// still live, [`ControllerError::Spawn`] when the program cannot be
    /// executed, and [`ControllerError::WatcherSpawn`] when the watcher thread
    /// cannot be created (the child is killed in that case).
    pub fn start(&mut self, command: &ChildCommand) -> Result<ChildInfo, ControllerError> {
        if let Some(handle) = self.current.as_mut() {
            if !handle.route().has_exited() {
                return Err(ControllerError::AlreadyRunning {
                    child: handle.info(),
                });
            }
            handle.join_watcher();
            self.current = None;
        }
        let child = command.spawn()?;
        let info = ChildInfo::new(child.id(), self.generation.next());
        let route = Arc::new(ExitRoute::new());
        let watcher = spawn_watcher(child, info, Arc::clone(&route), Arc::clone(&self.listener))
            .map_err(|source| {
                kill_unwatched(info.pid());
                ControllerError::WatcherSpawn {
                    pid: info.pid(),
                    source,
                }
            })?;
        self.generation = info.generation();
        self.current = Some(ChildHandle::new(info, route, watcher));
        info!(
            target: PROCESS_TARGET,
            pid = info.pid(),
            generation = %info.generation(),
            command = %command,
            "child started"
        );
        Ok(info)
    }

    /// The child currently owned by the controller, if any.
    ///
    /// A child that exited on its own stays current until it is stopped or
    /// replaced.
    pub fn current(&self) -> Option<ChildInfo> {
        self.current.as_ref().map(ChildHandle::info)
    }

    /// Reports whether the current child is still running.
    ///
    /// Never blocks on the child and never fails; a child that is exiting at
    /// the moment of the call may briefly report either answer.
    pub fn is_alive(&self) -> bool {
        let Some(handle) = self.current.as_ref() else {
            return false;
        };
        handle.route().is_running(handle.info().pid())
    }

    /// Sends SIGTERM, waits up to `grace`, then escalates to SIGKILL.
    ///
    /// On return the child has been reaped, its watcher joined and its handle
    /// retired. Signal delivery failures are logged and the stop continues
    /// to wait, since the watcher reports the exit however it happens.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::NotRunning`] when there is no child.
    pub fn stop_graceful(&mut self, grace: Duration) -> Result<StopReport, ControllerError> {
        let mut handle = self.current.take().ok_or(ControllerError::NotRunning)?;
        let child = handle.info();
        let receiver = match handle.route().expect_exit() {
            Ok(receiver) => receiver,
            Err(outcome) => {
                handle.join_watcher();
                return Ok(StopReport {
                    child,
                    outcome,
                    path: StopPath::AlreadyExited,
                });
            }
        };
        info!(
            target: PROCESS_TARGET,
            pid = child.pid(),
            generation = %child.generation(),
            grace_ms = grace.as_millis(),
            "stopping child"
        );
        signal_or_warn(handle.route(), child, Signal::SIGTERM);
        let (outcome, path) = match receiver.recv_timeout(grace) {
            Ok(outcome) => (outcome, StopPath::Graceful),
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    target: PROCESS_TARGET,
                    pid = child.pid(),
                    grace_ms = grace.as_millis(),
                    "child did not exit within the grace period; killing"
                );
                signal_or_warn(handle.route(), child, Signal::SIGKILL);
                (await_outcome(&receiver), StopPath::Forced)
            }
            Err(RecvTimeoutError::Disconnected) => (watcher_lost(), StopPath::Graceful),
        };
        handle.join_watcher();
        info!(
            target: PROCESS_TARGET,
            pid = child.pid(),
            generation = %child.generation(),
            exit = %outcome,
            ?path,
            "child stopped"
        );
        Ok(StopReport {
            child,
            outcome,
            path,
        })
    }
}

impl Drop for ProcessController {
    fn drop(&mut self) {
        let Some(mut handle) = self.current.take() else {
            return;
        };
        if let Ok(receiver) = handle.route().expect_exit() {
            warn!(
                target: PROCESS_TARGET,
                pid = handle.info().pid(),
                "killing child left running by the supervisor"
            );
            signal_or_warn(handle.route(), handle.info(), Signal::SIGKILL);
            let _ = await_outcome(&receiver);
        }
        handle.join_watcher();
    }
}

fn await_outcome(receiver: &Receiver<ExitOutcome>) -> ExitOutcome {
    receiver.recv().unwrap_or_else(|_| watcher_lost())
}

fn watcher_lost() -> ExitOutcome {
    ExitOutcome::WaitFailed {
        message: "exit watcher ended without reporting".to_string(),
    }
}

fn signal_or_warn(route: &ExitRoute, child: ChildInfo, signal: Signal) {
    match route.signal(child.pid(), signal) {
        Ok(Delivery::Sent) => {}
        Ok(Delivery::Reaped) => {
            info!(
                target: PROCESS_TARGET,
                pid = child.pid(),
                signal = %signal,
                "child already reaped; signal not sent"
            );
        }
        Err(errno) => {
            warn!(
                target: PROCESS_TARGET,
                pid = child.pid(),
                signal = %signal,
                error = %errno,
                "failed to signal child"
            );
        }
    }
}

/// Kills and reaps a child whose exit watcher never started.
///
/// Nothing else waits on the pid, so it stays reserved until the reap here.
pub(super) fn kill_unwatched(pid: u32) {
    let Some(target) = raw_pid(pid) else {
        return;
    };
    if let Err(errno) = kill(target, Signal::SIGKILL) {
        warn!(
            target: PROCESS_TARGET,
            pid,
            error = %errno,
            "failed to kill unwatched child"
        );
    }
    loop {
        match waitpid(target, None) {
            Err(Errno::EINTR) => {}
            Ok(_) => return,
            Err(errno) => {
                warn!(
                    target: PROCESS_TARGET,
                    pid,
                    error = %errno,
                    "failed to reap unwatched child"
                );
                return;
            }
        }
    }
}
