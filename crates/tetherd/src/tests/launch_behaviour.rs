//! End-to-end runs of the supervisor with a real poller and scripted signals.

use std::fs::{self, File};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, SystemTime};

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use serde_json::Value;

use tether_config::{CommandLine, Config, Interval};

use crate::health::StructuredHealthReporter;
use crate::launch::{LaunchError, SupervisorPlan, run_supervisor_with};
use crate::lifecycle::Termination;
use crate::tests::support::{ScriptDir, cooperative_child, wait_until};
use crate::triggers::{ShutdownSignal, WatchError};

struct ChannelShutdown {
    receiver: Receiver<i32>,
}

impl ShutdownSignal for ChannelShutdown {
    fn wait(&mut self) -> Option<i32> {
        self.receiver.recv().ok()
    }
}

struct Setup {
    scripts: ScriptDir,
    watched: Utf8PathBuf,
    health: Utf8PathBuf,
    config: Config,
}

impl Setup {
    fn touch(&self, modified: SystemTime) {
        File::options()
            .write(true)
            .open(&self.watched)
            .and_then(|file| file.set_modified(modified))
            .expect("set modification time");
    }

    fn health(&self) -> Option<Value> {
        let content = fs::read_to_string(&self.health).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn health_is(&self, status: &str, generation: u64) -> bool {
        self.health().is_some_and(|snapshot| {
            snapshot["status"] == status && snapshot["generation"] == generation
        })
    }

    fn plan(&self) -> (SupervisorPlan<ChannelShutdown>, Sender<i32>) {
        let (sender, receiver) = mpsc::channel();
        let plan = SupervisorPlan {
            config: self.config.clone(),
            shutdown: ChannelShutdown { receiver },
            reporter: Arc::new(StructuredHealthReporter::new()),
        };
        (plan, sender)
    }
}

#[fixture]
fn setup() -> Setup {
    let scripts = ScriptDir::new();
    let watched = scripts.path("watcher");
    fs::write(&watched, b"v1").expect("write watched file");
    let health = scripts.path("tether.health");
    let script = scripts.path("child.sh");
    fs::write(&script, cooperative_child(&scripts)).expect("write child script");
    let config = Config {
        command: CommandLine::new(scripts.shell().as_str()).arg(script.as_str()),
        watch_path: watched.clone(),
        poll_interval: Interval::from_millis(20),
        grace_period: Interval::from_millis(5_000),
        health_path: Some(health.clone()),
        ..Config::default()
    };
    let setup = Setup {
        scripts,
        watched,
        health,
        config,
    };
    setup.touch(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000));
    setup
}

#[rstest]
fn file_change_restarts_child_and_signal_stops_it(setup: Setup) {
    let (plan, signals) = setup.plan();
    let handle = thread::spawn(move || run_supervisor_with(plan));

    assert!(
        wait_until(|| setup.health_is("running", 1) && setup.scripts.lines("pids").len() == 1),
        "first child never reported running"
    );
    setup.touch(SystemTime::UNIX_EPOCH + Duration::from_secs(2_000));
    assert!(
        wait_until(|| setup.health_is("running", 2) && setup.scripts.lines("pids").len() == 2),
        "replacement child never reported running"
    );

    signals.send(15).expect("listener alive");
    let termination = handle
        .join()
        .expect("supervisor thread panicked")
        .expect("supervisor succeeds");

    assert_eq!(termination, Termination::ShutdownRequested { signal: 15 });
    assert_eq!(termination.exit_code(), 0);
    assert_eq!(setup.scripts.lines("signals.log"), ["term", "term"]);
    assert!(!setup.health.exists(), "health file removed on exit");
}

#[rstest]
fn missing_watch_file_fails_before_the_child_starts(setup: Setup) {
    fs::remove_file(&setup.watched).expect("remove watched file");
    let (plan, _signals) = setup.plan();

    let result = run_supervisor_with(plan);

    assert!(matches!(
        result,
        Err(LaunchError::Watch {
            source: WatchError::Stat { .. }
        })
    ));
    assert!(setup.scripts.lines("pids").is_empty());
}
