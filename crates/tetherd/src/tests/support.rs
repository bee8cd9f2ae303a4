//! Shared doubles and helpers for supervisor tests.

use std::fs;
use std::os::unix::fs::symlink;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use tempfile::TempDir;

use crate::health::HealthReporter;
use crate::lifecycle::SupervisorState;
use crate::process::{ChildCommand, ChildInfo, ControllerError, ExitOutcome, StopPath, StopReport};
use crate::triggers::WatchError;

pub(crate) const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_STEP: Duration = Duration::from_millis(20);

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HealthEvent {
    StateChanged {
        from: SupervisorState,
        to: SupervisorState,
    },
    ChildStopped {
        path: StopPath,
        outcome: ExitOutcome,
    },
    ChildExited {
        child: ChildInfo,
        outcome: ExitOutcome,
    },
    StartFailed(String),
    WatchFailed(String),
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub(crate) struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    pub(crate) fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    /// States visited, beginning with the initial one.
    pub(crate) fn states(&self) -> Vec<SupervisorState> {
        let mut states = vec![SupervisorState::Starting];
        states.extend(self.events().into_iter().filter_map(|event| match event {
            HealthEvent::StateChanged { to, .. } => Some(to),
            _ => None,
        }));
        states
    }

    pub(crate) fn stop_paths(&self) -> Vec<StopPath> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HealthEvent::ChildStopped { path, .. } => Some(path),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn state_changed(&self, from: SupervisorState, to: SupervisorState, _child: Option<ChildInfo>) {
        self.record(HealthEvent::StateChanged { from, to });
    }

    fn child_stopped(&self, report: &StopReport) {
        self.record(HealthEvent::ChildStopped {
            path: report.path(),
            outcome: report.outcome().clone(),
        });
    }

    fn child_exited(&self, child: ChildInfo, outcome: &ExitOutcome) {
        self.record(HealthEvent::ChildExited {
            child,
            outcome: outcome.clone(),
        });
    }

    fn start_failed(&self, error: &ControllerError) {
        self.record(HealthEvent::StartFailed(error.to_string()));
    }

    fn watch_failed(&self, error: &WatchError) {
        self.record(HealthEvent::WatchFailed(error.to_string()));
    }
}

/// Temporary directory holding child scripts and the files they write.
///
/// Children run through a symlink to `/bin/sh`, so scripts are only ever
/// read, never executed directly, and removing the symlink makes the next
/// launch fail.
pub(crate) struct ScriptDir {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl ScriptDir {
    pub(crate) fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
        symlink("/bin/sh", root.join("sh")).expect("link shell");
        Self { _dir: dir, root }
    }

    pub(crate) fn path(&self, name: &str) -> Utf8PathBuf {
        self.root.join(name)
    }

    /// Writes `body` to `child.sh` and returns the command running it.
    pub(crate) fn child(&self, body: &str) -> ChildCommand {
        let script = self.path("child.sh");
        fs::write(&script, body).expect("write child script");
        ChildCommand::new(self.shell().as_std_path()).arg(script.as_std_path())
    }

    pub(crate) fn shell(&self) -> Utf8PathBuf {
        self.path("sh")
    }

    pub(crate) fn remove_shell(&self) {
        fs::remove_file(self.shell()).expect("remove shell link");
    }

    /// Non-empty lines of `name`, or nothing when it does not exist yet.
    pub(crate) fn lines(&self, name: &str) -> Vec<String> {
        fs::read_to_string(self.path(name))
            .map(|content| {
                content
                    .lines()
                    .filter(|line| !line.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Script body that records its pid, then exits 0 on SIGTERM after logging
/// `term`. The trap is installed before the pid is written.
pub(crate) fn cooperative_child(dir: &ScriptDir) -> String {
    format!(
        "trap 'echo term >> \"{log}\"; exit 0' TERM\n\
         echo $$ >> \"{pids}\"\n\
         while :; do sleep 1 & wait $!; done\n",
        log = dir.path("signals.log"),
        pids = dir.path("pids"),
    )
}

/// Script body that records its pid and ignores SIGTERM.
pub(crate) fn stubborn_child(dir: &ScriptDir) -> String {
    format!(
        "trap '' TERM\n\
         echo $$ >> \"{pids}\"\n\
         exec sleep 30\n",
        pids = dir.path("pids"),
    )
}

/// Polls `condition` until it holds or [`WAIT_TIMEOUT`] elapses.
pub(crate) fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(POLL_STEP);
    }
    condition()
}
