//! Toolchain process execution boundary.
//!
//! Everything that shells out to `dotnet` or `nuget` goes through a
//! [`ProcessRunner`], so the fixers and managers can be driven by a scripted
//! fake in tests.

use std::fmt;
use std::path::Path;
use std::process::Command;
use thiserror::Error;
use tracing::debug;

/// Captured result of a finished toolchain invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Transport failure: the process could not be run at all.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Runs an executable to completion and captures its output.
///
/// A spawn failure is an `Err`; a non-zero exit is an `Ok` carrying the
/// exit code. Callers treat the two separately.
pub trait ProcessRunner: Send + Sync {
    fn run(
        &self,
        working_dir: &Path,
        executable: &str,
        args: &[String],
    ) -> Result<CommandOutput, ProcessError>;
}

/// Printable command line, used in logs and error messages.
pub struct CommandLine<'a> {
    pub executable: &'a str,
    pub args: &'a [String],
}

impl fmt::Display for CommandLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.executable)?;
        for arg in self.args {
            if arg.contains(' ') {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// [`ProcessRunner`] backed by [`std::process::Command`]. Blocks until exit.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(
        &self,
        working_dir: &Path,
        executable: &str,
        args: &[String],
    ) -> Result<CommandOutput, ProcessError> {
        let command_line = CommandLine { executable, args }.to_string();
        debug!(command = %command_line, cwd = %working_dir.display(), "Running toolchain");

        let output = Command::new(executable)
            .args(args)
            .current_dir(working_dir)
            .output()
            .map_err(|source| ProcessError::Spawn {
                command: command_line.clone(),
                source,
            })?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        };
        debug!(command = %command_line, exit_code = ?result.exit_code, "Toolchain finished");
        Ok(result)
    }
}
