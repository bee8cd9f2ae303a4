use std::fmt;

use serde::Serialize;

/// Phase of the supervisor's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    /// The first child has not started yet.
    Starting,
    /// A child is running and events are being processed.
    Running,
    /// The child is being replaced after a configuration change.
    Restarting,
    /// The child is being stopped before the supervisor exits.
    ShuttingDown,
    /// The supervisor has finished.
    Terminated,
}

impl SupervisorState {
    /// Stable lowercase label used in logs and health snapshots.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Restarting => "restarting",
            Self::ShuttingDown => "shutting_down",
            Self::Terminated => "terminated",
        }
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Starting, Self::Running)
                | (Self::Running, Self::Restarting)
                | (Self::Running, Self::ShuttingDown)
                | (Self::Running, Self::Terminated)
                | (Self::Restarting, Self::Running)
                | (Self::Restarting, Self::Terminated)
                | (Self::ShuttingDown, Self::Terminated)
        )
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}
