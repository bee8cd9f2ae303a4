use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use tether_config::Config;

use super::errors::ControllerError;

/// Program, arguments and working directory used to launch the child.
///
/// Standard output and error are inherited from the supervisor so the
/// child's logs reach the same sink; standard input is closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildCommand {
    program: OsString,
    args: Vec<OsString>,
    working_dir: Option<PathBuf>,
}

impl ChildCommand {
    /// Builds a command for `program` with no arguments.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    /// Builds the child command described by the supervisor configuration.
    pub fn from_config(config: &Config) -> Self {
        let command_line = config.command();
        let mut command = command_line
            .args()
            .iter()
            .fold(Self::new(command_line.program()), |command, arg| {
                command.arg(arg)
            });
        if let Some(dir) = config.working_dir() {
            command = command.current_dir(dir.as_std_path());
        }
        command
    }

    /// Appends an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Sets the child's working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Program that will be executed.
    pub fn program(&self) -> &OsStr {
        self.program.as_os_str()
    }

    /// Arguments passed to the program.
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Working directory, when one was configured.
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    pub(super) fn spawn(&self) -> Result<Child, ControllerError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command.spawn().map_err(|source| ControllerError::Spawn {
            program: self.program.clone(),
            source,
        })
    }
}

impl fmt::Display for ChildCommand {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(formatter, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}
