//! Test suites for the supervisor.

mod launch_behaviour;
pub(crate) mod support;
