use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Program and arguments for the supervised child.
///
/// Parsed by splitting on whitespace; quoting is not interpreted. Wrap the
/// child in a script when it needs arguments containing spaces.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    /// Builds a command line for `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Program to execute.
    #[must_use]
    pub fn program(&self) -> &str {
        self.program.as_str()
    }

    /// Arguments passed to the program.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.program)?;
        for arg in &self.args {
            write!(formatter, " {arg}")?;
        }
        Ok(())
    }
}

impl FromStr for CommandLine {
    type Err = CommandLineParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut words = input.split_whitespace();
        let program = words.next().ok_or(CommandLineParseError::Empty)?;
        Ok(Self {
            program: program.to_string(),
            args: words.map(str::to_string).collect(),
        })
    }
}

impl TryFrom<String> for CommandLine {
    type Error = CommandLineParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CommandLine> for String {
    fn from(command: CommandLine) -> Self {
        command.to_string()
    }
}

/// Errors encountered while parsing a [`CommandLine`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandLineParseError {
    /// The command line contained no program.
    #[error("command must name a program to run")]
    Empty,
}
