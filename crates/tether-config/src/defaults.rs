use std::time::Duration;

use camino::Utf8PathBuf;

use crate::command::CommandLine;
use crate::interval::Interval;
use crate::logging::LogFormat;

/// Command launched when none is configured.
pub const DEFAULT_COMMAND: &str = "/run.sh";

/// File watched for changes when none is configured.
pub const DEFAULT_WATCH_PATH: &str = "/var/lib/grafana/plugins/watcher";

/// Default delay between modification-time checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Default window between SIGTERM and SIGKILL.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default child command line.
pub fn default_command() -> CommandLine {
    CommandLine::new(DEFAULT_COMMAND)
}

/// Default watched file.
pub fn default_watch_path() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_WATCH_PATH)
}

/// Default poll interval.
pub fn default_poll_interval() -> Interval {
    Interval::from_duration(DEFAULT_POLL_INTERVAL)
}

/// Default grace period.
pub fn default_grace_period() -> Interval {
    Interval::from_duration(DEFAULT_GRACE_PERIOD)
}

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

/// Default logging format for the binaries.
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}
