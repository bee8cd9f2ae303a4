use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;

use serde::Serialize;
use tracing::warn;

use super::PROCESS_TARGET;
use super::watcher::ExitRoute;

/// Identifies one lifetime of the supervised child.
///
/// Every successful start receives a strictly larger generation than the one
/// before it, so an exit report can be matched against the child that is
/// currently supervised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Generation(u64);

impl Generation {
    /// Wraps a raw generation number.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw generation number.
    pub const fn get(self) -> u64 {
        self.0
    }

    pub(super) const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Pid and generation of a started child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChildInfo {
    pid: u32,
    generation: Generation,
}

impl ChildInfo {
    /// Describes a child with the given pid and generation.
    pub const fn new(pid: u32, generation: Generation) -> Self {
        Self { pid, generation }
    }

    /// Operating system process id.
    pub const fn pid(self) -> u32 {
        self.pid
    }

    /// Generation assigned when the child was started.
    pub const fn generation(self) -> Generation {
        self.generation
    }
}

/// The controller's private record of the live child.
pub(super) struct ChildHandle {
    info: ChildInfo,
    route: Arc<ExitRoute>,
    watcher: Option<JoinHandle<()>>,
}

impl ChildHandle {
    pub(super) fn new(info: ChildInfo, route: Arc<ExitRoute>, watcher: JoinHandle<()>) -> Self {
        Self {
            info,
            route,
            watcher: Some(watcher),
        }
    }

    pub(super) fn info(&self) -> ChildInfo {
        self.info
    }

    pub(super) fn route(&self) -> &ExitRoute {
        &self.route
    }

    /// Waits for the exit watcher thread. Only called once the outcome has
    /// been observed, so the join does not block on the child.
    pub(super) fn join_watcher(&mut self) {
        let Some(watcher) = self.watcher.take() else {
            return;
        };
        if watcher.join().is_err() {
            warn!(
                target: PROCESS_TARGET,
                pid = self.info.pid,
                generation = %self.info.generation,
                "exit watcher panicked"
            );
        }
    }
}
