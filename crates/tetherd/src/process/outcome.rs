use std::fmt;
use std::io;
use std::process::ExitStatus;

#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;

/// How a child process terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Exited with status 0.
    Success,
    /// Exited with a non-zero status.
    Failed {
        /// Exit status reported by the child.
        code: i32,
    },
    /// Terminated by a signal.
    Signalled {
        /// Signal number that terminated the child.
        signal: i32,
    },
    /// The exit status could not be retrieved.
    WaitFailed {
        /// Description of the failure.
        message: String,
    },
}

impl ExitOutcome {
    /// Classifies an exit status reported by the operating system.
    pub fn from_status(status: ExitStatus) -> Self {
        match status.code() {
            Some(0) => Self::Success,
            Some(code) => Self::Failed { code },
            None => Self::from_signal(status),
        }
    }

    pub(super) fn from_wait(result: io::Result<ExitStatus>) -> Self {
        match result {
            Ok(status) => Self::from_status(status),
            Err(error) => Self::WaitFailed {
                message: error.to_string(),
            },
        }
    }

    #[cfg(unix)]
    fn from_signal(status: ExitStatus) -> Self {
        match status.signal() {
            Some(signal) => Self::Signalled { signal },
            None => Self::WaitFailed {
                message: format!("unrecognised exit status: {status}"),
            },
        }
    }

    #[cfg(not(unix))]
    fn from_signal(status: ExitStatus) -> Self {
        Self::WaitFailed {
            message: format!("unrecognised exit status: {status}"),
        }
    }

    /// Exit status reported by the child, if it exited normally.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Success => Some(0),
            Self::Failed { code } => Some(*code),
            Self::Signalled { .. } | Self::WaitFailed { .. } => None,
        }
    }

    /// Exit code the supervisor propagates when this outcome ends it.
    ///
    /// The child's own status is passed through; signal deaths and wait
    /// failures have no usable code and map to 1.
    pub fn supervisor_exit_code(&self) -> u8 {
        self.code()
            .and_then(|code| u8::try_from(code).ok())
            .unwrap_or(1)
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => formatter.write_str("exited cleanly"),
            Self::Failed { code } => write!(formatter, "exited with status {code}"),
            Self::Signalled { signal } => write!(formatter, "killed by signal {signal}"),
            Self::WaitFailed { message } => write!(formatter, "wait failed: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::clean(ExitOutcome::Success, 0)]
    #[case::status(ExitOutcome::Failed { code: 7 }, 7)]
    #[case::out_of_range(ExitOutcome::Failed { code: 300 }, 1)]
    #[case::signal(ExitOutcome::Signalled { signal: 9 }, 1)]
    #[case::wait(ExitOutcome::WaitFailed { message: "ECHILD".to_string() }, 1)]
    fn maps_outcomes_to_supervisor_exit_codes(#[case] outcome: ExitOutcome, #[case] expected: u8) {
        assert_eq!(outcome.supervisor_exit_code(), expected);
    }

    #[cfg(unix)]
    #[rstest]
    #[case::clean(0, ExitOutcome::Success)]
    #[case::status(7 << 8, ExitOutcome::Failed { code: 7 })]
    #[case::sigterm(15, ExitOutcome::Signalled { signal: 15 })]
    fn classifies_raw_wait_statuses(#[case] raw: i32, #[case] expected: ExitOutcome) {
        assert_eq!(ExitOutcome::from_status(ExitStatus::from_raw(raw)), expected);
    }

    #[test]
    fn wait_errors_become_wait_failed() {
        let outcome = ExitOutcome::from_wait(Err(io::Error::other("no child")));
        assert_eq!(
            outcome,
            ExitOutcome::WaitFailed {
                message: "no child".to_string()
            }
        );
        assert_eq!(outcome.to_string(), "wait failed: no child");
    }
}
