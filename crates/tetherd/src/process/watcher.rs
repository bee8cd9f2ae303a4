//! Exit watcher threads and the route their outcome takes.

use std::io;
use std::mem;
use std::process::Child;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::{debug, warn};

use super::PROCESS_TARGET;
use super::handle::ChildInfo;
use super::outcome::ExitOutcome;

/// Receives exits that no stop was waiting for.
pub trait ExitListener: Send + Sync {
    /// Invoked at most once per child, from its exit watcher thread.
    fn unsolicited_exit(&self, child: ChildInfo, outcome: ExitOutcome);
}

impl<T> ExitListener for Arc<T>
where
    T: ExitListener + ?Sized,
{
    fn unsolicited_exit(&self, child: ChildInfo, outcome: ExitOutcome) {
        (**self).unsolicited_exit(child, outcome);
    }
}

enum Route {
    /// Nobody asked the child to stop; its exit is a crash or a self-exit.
    Unsolicited,
    /// A stop is in progress and waits on the paired receiver.
    Expected(SyncSender<ExitOutcome>),
    /// The child has been reaped and its pid may belong to another process.
    Exited(ExitOutcome),
}

/// Whether a signal reached the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Delivery {
    Sent,
    /// The child was already reaped; nothing was sent.
    Reaped,
}

/// Decides, under one lock, which listener receives a child's outcome.
///
/// A stop arms the route before it signals the child, and the watcher reads
/// the route only after the child has exited, so an exit caused by the stop
/// can never be reported as unsolicited. The child is reaped under the same
/// lock that guards every signal, so its pid is never signalled after the
/// kernel has released it.
pub(super) struct ExitRoute {
    route: Mutex<Route>,
}

impl ExitRoute {
    pub(super) fn new() -> Self {
        Self {
            route: Mutex::new(Route::Unsolicited),
        }
    }

    /// Marks the next exit as expected.
    ///
    /// Returns the receiver the watcher will deliver to, or the outcome that
    /// was already recorded when the child exited before the stop began.
    pub(super) fn expect_exit(&self) -> Result<Receiver<ExitOutcome>, ExitOutcome> {
        let mut route = self.lock();
        if let Route::Exited(outcome) = &*route {
            return Err(outcome.clone());
        }
        let (sender, receiver) = mpsc::sync_channel(1);
        *route = Route::Expected(sender);
        Ok(receiver)
    }

    pub(super) fn has_exited(&self) -> bool {
        matches!(*self.lock(), Route::Exited(_))
    }

    /// Sends `signal` to `pid` unless the child has been reaped.
    pub(super) fn signal(&self, pid: u32, signal: Signal) -> Result<Delivery, Errno> {
        let route = self.lock();
        if matches!(*route, Route::Exited(_)) {
            return Ok(Delivery::Reaped);
        }
        let target = raw_pid(pid).ok_or(Errno::ESRCH)?;
        kill(target, signal).map(|()| Delivery::Sent)
    }

    /// Zero-signal liveness check; a child that cannot be signalled for lack
    /// of permission still counts as alive.
    pub(super) fn is_running(&self, pid: u32) -> bool {
        let route = self.lock();
        if matches!(*route, Route::Exited(_)) {
            return false;
        }
        raw_pid(pid).is_some_and(|target| matches!(kill(target, None), Ok(()) | Err(Errno::EPERM)))
    }

    /// Reaps the child with `reap` and records the outcome, all under the
    /// route lock. Returns the outcome when no stop was armed.
    fn settle_with(&self, reap: impl FnOnce() -> ExitOutcome) -> Option<ExitOutcome> {
        let mut route = self.lock();
        let outcome = reap();
        match mem::replace(&mut *route, Route::Exited(outcome.clone())) {
            Route::Unsolicited => Some(outcome),
            Route::Expected(sender) => {
                // Capacity one and a single send: never blocks while locked.
                if sender.send(outcome).is_err() {
                    warn!(
                        target: PROCESS_TARGET,
                        "stop abandoned before the child exited"
                    );
                }
                None
            }
            Route::Exited(_) => None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Route> {
        self.route.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(super) fn raw_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid)
        .ok()
        .filter(|raw| *raw > 0)
        .map(Pid::from_raw)
}

/// Blocks until `pid` has exited, leaving it unreaped.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub(super) fn observe_exit(pid: u32) -> Result<(), Errno> {
    use nix::sys::wait::{Id, WaitPidFlag, waitid};

    let target = raw_pid(pid).ok_or(Errno::ESRCH)?;
    loop {
        match waitid(Id::Pid(target), WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT) {
            Ok(_) => return Ok(()),
            Err(Errno::EINTR) => {}
            Err(errno) => return Err(errno),
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub(super) fn observe_exit(_pid: u32) -> Result<(), Errno> {
    Err(Errno::ENOSYS)
}

pub(super) fn spawn_watcher(
    child: Child,
    info: ChildInfo,
    route: Arc<ExitRoute>,
    listener: Arc<dyn ExitListener>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("tether-exit-{}", info.generation()))
        .spawn(move || watch(child, info, &route, listener.as_ref()))
}

fn watch(mut child: Child, info: ChildInfo, route: &ExitRoute, listener: &dyn ExitListener) {
    let unsolicited = match observe_exit(info.pid()) {
        // The child is a zombie here, so reaping it under the lock is immediate.
        Ok(()) => route.settle_with(|| reap(&mut child, info)),
        Err(errno) => {
            debug!(
                target: PROCESS_TARGET,
                pid = info.pid(),
                error = %errno,
                "exit cannot be observed without reaping"
            );
            let outcome = reap(&mut child, info);
            route.settle_with(|| outcome)
        }
    };
    if let Some(outcome) = unsolicited {
        listener.unsolicited_exit(info, outcome);
    }
}

fn reap(child: &mut Child, info: ChildInfo) -> ExitOutcome {
    let outcome = ExitOutcome::from_wait(child.wait());
    debug!(
        target: PROCESS_TARGET,
        pid = info.pid(),
        generation = %info.generation(),
        exit = %outcome,
        "child reaped"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use std::process::Command;

    use super::*;

    fn settle(route: &ExitRoute, outcome: ExitOutcome) -> Option<ExitOutcome> {
        route.settle_with(|| outcome)
    }

    fn sleeper() -> Child {
        Command::new("/bin/sh")
            .arg("-c")
            .arg("exec sleep 30")
            .spawn()
            .expect("spawn sleeper")
    }

    #[test]
    fn unsolicited_exit_is_returned_to_the_watcher() {
        let route = ExitRoute::new();
        assert_eq!(
            settle(&route, ExitOutcome::Failed { code: 3 }),
            Some(ExitOutcome::Failed { code: 3 })
        );
        assert!(route.has_exited());
    }

    #[test]
    fn armed_route_hands_outcome_to_the_stop() {
        let route = ExitRoute::new();
        let receiver = route.expect_exit().expect("route should arm");
        assert_eq!(settle(&route, ExitOutcome::Success), None);
        assert_eq!(receiver.recv().ok(), Some(ExitOutcome::Success));
    }

    #[test]
    fn arming_after_exit_returns_recorded_outcome() {
        let route = ExitRoute::new();
        let _ = settle(&route, ExitOutcome::Signalled { signal: 9 });
        let Err(outcome) = route.expect_exit() else {
            panic!("arming an exited route should fail");
        };
        assert_eq!(outcome, ExitOutcome::Signalled { signal: 9 });
    }

    #[test]
    fn settles_once() {
        let route = ExitRoute::new();
        assert!(settle(&route, ExitOutcome::Success).is_some());
        assert!(settle(&route, ExitOutcome::Success).is_none());
    }

    #[test]
    fn settled_route_sends_no_signals() {
        let mut bystander = sleeper();
        let route = ExitRoute::new();
        let _ = settle(&route, ExitOutcome::Success);

        assert_eq!(
            route.signal(bystander.id(), Signal::SIGKILL),
            Ok(Delivery::Reaped)
        );
        assert!(!route.is_running(bystander.id()));
        assert!(bystander.try_wait().expect("poll bystander").is_none());

        bystander.kill().expect("kill bystander");
        bystander.wait().expect("reap bystander");
    }

    #[test]
    fn live_route_signals_the_child() {
        let mut child = sleeper();
        let route = ExitRoute::new();
        assert!(route.is_running(child.id()));
        assert_eq!(route.signal(child.id(), Signal::SIGKILL), Ok(Delivery::Sent));
        let outcome = ExitOutcome::from_wait(child.wait());
        assert_eq!(outcome, ExitOutcome::Signalled { signal: 9 });
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn observing_an_exit_leaves_the_pid_reserved() {
        let mut child = Command::new("/bin/sh")
            .arg("-c")
            .arg("exit 3")
            .spawn()
            .expect("spawn child");
        let pid = raw_pid(child.id()).expect("valid pid");

        observe_exit(child.id()).expect("exit observed");
        // Still a zombie: the pid cannot have been handed to another process.
        assert_eq!(kill(pid, None), Ok(()));

        let outcome = ExitOutcome::from_wait(child.wait());
        assert_eq!(outcome, ExitOutcome::Failed { code: 3 });
        assert_eq!(kill(pid, None), Err(Errno::ESRCH));
    }

    #[test]
    fn watcher_reports_unsolicited_exit_after_reaping() {
        struct Sink(Mutex<Vec<(ChildInfo, ExitOutcome)>>);

        impl ExitListener for Sink {
            fn unsolicited_exit(&self, child: ChildInfo, outcome: ExitOutcome) {
                self.0
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push((child, outcome));
            }
        }

        let child = Command::new("/bin/sh")
            .arg("-c")
            .arg("exit 4")
            .spawn()
            .expect("spawn child");
        let info = ChildInfo::new(child.id(), crate::process::Generation::new(1));
        let route = Arc::new(ExitRoute::new());
        let sink = Arc::new(Sink(Mutex::new(Vec::new())));
        let listener: Arc<dyn ExitListener> = Arc::clone(&sink) as Arc<dyn ExitListener>;
        spawn_watcher(child, info, Arc::clone(&route), listener)
            .expect("spawn watcher")
            .join()
            .expect("watcher finished");

        assert!(route.has_exited());
        assert_eq!(
            sink.0.lock().unwrap_or_else(PoisonError::into_inner).as_slice(),
            [(info, ExitOutcome::Failed { code: 4 })]
        );
        let pid = raw_pid(info.pid()).expect("valid pid");
        assert_eq!(kill(pid, None), Err(Errno::ESRCH));
    }
}
