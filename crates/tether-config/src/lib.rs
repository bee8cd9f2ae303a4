//! Shared configuration for the tether supervisor.
//!
//! Settings are layered by [`ortho_config`]: built-in defaults are overridden
//! by a TOML file (selected with `--config-path` or `TETHER_CONFIG_PATH`),
//! then by `TETHER_*` environment variables, and finally by command-line
//! flags. The resulting [`Config`] is immutable for the lifetime of the
//! supervisor.

mod command;
mod defaults;
mod interval;
mod logging;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use command::{CommandLine, CommandLineParseError};
pub use defaults::{
    DEFAULT_COMMAND, DEFAULT_GRACE_PERIOD, DEFAULT_LOG_FILTER, DEFAULT_POLL_INTERVAL,
    DEFAULT_WATCH_PATH, default_command, default_grace_period, default_log_filter,
    default_log_filter_string, default_log_format, default_poll_interval, default_watch_path,
};
pub use interval::{Interval, IntervalParseError};
pub use logging::{LogFormat, LogFormatParseError};

/// Supervisor configuration resolved from defaults, file, environment and CLI.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "TETHER")]
pub struct Config {
    /// Command line used to launch the supervised child.
    #[ortho_config(default = default_command())]
    pub command: CommandLine,
    /// Working directory for the child; inherits the supervisor's when unset.
    pub working_dir: Option<Utf8PathBuf>,
    /// File whose modification time triggers a restart.
    #[ortho_config(default = default_watch_path())]
    pub watch_path: Utf8PathBuf,
    /// Delay between modification-time checks.
    #[ortho_config(default = default_poll_interval())]
    pub poll_interval: Interval,
    /// Time a child is given to exit after SIGTERM before it is killed.
    #[ortho_config(default = default_grace_period())]
    pub grace_period: Interval,
    /// Optional JSON health snapshot rewritten on every state transition.
    pub health_path: Option<Utf8PathBuf>,
    /// `tracing` filter expression.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format for log lines.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            command: default_command(),
            working_dir: None,
            watch_path: default_watch_path(),
            poll_interval: default_poll_interval(),
            grace_period: default_grace_period(),
            health_path: None,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Command line used to launch the child.
    #[must_use]
    pub fn command(&self) -> &CommandLine {
        &self.command
    }

    /// Working directory for the child, if one was configured.
    #[must_use]
    pub fn working_dir(&self) -> Option<&Utf8Path> {
        self.working_dir.as_deref()
    }

    /// Path of the watched configuration file.
    #[must_use]
    pub fn watch_path(&self) -> &Utf8Path {
        self.watch_path.as_path()
    }

    /// Poll interval for the watched file.
    #[must_use]
    pub fn poll_interval(&self) -> Interval {
        self.poll_interval
    }

    /// Grace period between SIGTERM and SIGKILL.
    #[must_use]
    pub fn grace_period(&self) -> Interval {
        self.grace_period
    }

    /// Location of the health snapshot, if enabled.
    #[must_use]
    pub fn health_path(&self) -> Option<&Utf8Path> {
        self.health_path.as_deref()
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
