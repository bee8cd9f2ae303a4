//! Wires configuration, telemetry, triggers and the coordinator together.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;
use tracing::{info, warn};

use tether_config::Config;

use crate::health::{HealthFile, HealthReporter, StructuredHealthReporter};
use crate::lifecycle::{Coordinator, SupervisorError, Termination};
use crate::process::ChildCommand;
use crate::telemetry::{self, TelemetryError};
use crate::triggers::{
    ConfigPoller, ShutdownError, ShutdownSignal, SystemShutdownSignal, TriggerError, WatchError,
    spawn_config_poller, spawn_shutdown_listener,
};

const LAUNCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::launch");

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the supervisor configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader that always yields the same configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already resolved configuration.
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors that stop the supervisor before or while it runs.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Config {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// Signal handlers could not be installed.
    #[error("failed to listen for termination signals: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[source]
        source: ShutdownError,
    },
    /// The watched file could not be inspected at startup.
    #[error("failed to watch configuration file: {source}")]
    Watch {
        /// Underlying watch error.
        #[source]
        source: WatchError,
    },
    /// A trigger thread could not be started.
    #[error("failed to start trigger: {source}")]
    Trigger {
        /// Underlying trigger error.
        #[source]
        source: TriggerError,
    },
    /// The supervisor ended with an error.
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

impl From<Arc<OrthoError>> for LaunchError {
    fn from(source: Arc<OrthoError>) -> Self {
        Self::Config { source }
    }
}

impl From<TelemetryError> for LaunchError {
    fn from(source: TelemetryError) -> Self {
        Self::Telemetry { source }
    }
}

impl From<ShutdownError> for LaunchError {
    fn from(source: ShutdownError) -> Self {
        Self::Shutdown { source }
    }
}

impl From<WatchError> for LaunchError {
    fn from(source: WatchError) -> Self {
        Self::Watch { source }
    }
}

impl From<TriggerError> for LaunchError {
    fn from(source: TriggerError) -> Self {
        Self::Trigger { source }
    }
}

/// Collaborators required to run the supervisor.
pub struct SupervisorPlan<S> {
    /// Resolved configuration.
    pub config: Config,
    /// Source of termination requests.
    pub shutdown: S,
    /// Receiver of lifecycle events.
    pub reporter: Arc<dyn HealthReporter>,
}

/// Runs the supervisor using the production collaborators.
///
/// Loads configuration, installs telemetry, then hands over to
/// [`run_supervisor_with`]. Signal handlers are registered before the child
/// starts so an early SIGTERM is queued rather than killing the supervisor.
pub fn run_supervisor() -> Result<Termination, LaunchError> {
    run_with_loader(&SystemConfigLoader)
}

/// [`run_supervisor`] with an injected configuration loader.
pub fn run_with_loader<L>(loader: &L) -> Result<Termination, LaunchError>
where
    L: ConfigLoader,
{
    let config = loader.load()?;
    telemetry::initialise(&config)?;
    let shutdown = SystemShutdownSignal::install()?;
    run_supervisor_with(SupervisorPlan {
        config,
        shutdown,
        reporter: Arc::new(StructuredHealthReporter::new()),
    })
}

/// Runs the supervisor with injected collaborators.
///
/// The watched file is inspected once before the child starts; the first
/// child is assumed to reflect that version of the file.
pub fn run_supervisor_with<S>(plan: SupervisorPlan<S>) -> Result<Termination, LaunchError>
where
    S: ShutdownSignal + 'static,
{
    let SupervisorPlan {
        config,
        shutdown,
        reporter,
    } = plan;

    info!(
        target: LAUNCH_TARGET,
        command = %config.command(),
        watch_path = %config.watch_path(),
        poll_interval = %config.poll_interval(),
        grace_period = %config.grace_period(),
        "starting supervisor"
    );
    let poller = ConfigPoller::new(config.watch_path())?;
    let (mut coordinator, events) = Coordinator::new(
        ChildCommand::from_config(&config),
        config.grace_period().as_duration(),
        reporter,
    );
    coordinator = coordinator.with_applied_change(poller.last_modified());
    if let Some(path) = config.health_path() {
        coordinator = coordinator.with_health_file(HealthFile::new(path));
    }

    // The listener thread blocks on signals for the life of the process.
    let _listener = spawn_shutdown_listener(shutdown, events.clone())?;
    let poller = spawn_config_poller(poller, config.poll_interval().as_duration(), events)?;

    let result = coordinator.run();
    if let Err(error) = poller.join() {
        warn!(target: LAUNCH_TARGET, %error, "config poller did not stop cleanly");
    }
    let termination = result?;
    info!(
        target: LAUNCH_TARGET,
        exit_code = termination.exit_code(),
        "supervisor finished"
    );
    Ok(termination)
}
