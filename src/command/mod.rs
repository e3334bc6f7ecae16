//! Host tool execution.
//!
//! Compose, `iptables`, `tc` and the proxy reload all run through the
//! [`CommandRunner`] capability so the modules that build their argument
//! lists can be exercised against a recording fake.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use tracing::debug;

use crate::error::CommandError;

/// Boxed future type returned by [`CommandRunner::run`].
pub type CommandFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CommandOutput, CommandError>> + Send + 'a>>;

/// Behaviour required to run a host program and capture its output.
///
/// Implementations return `Ok` for any program that started, whatever its
/// exit status; only a failure to spawn is an `Err`.
pub trait CommandRunner: Send + Sync {
    /// Run `spec` to completion.
    fn run(&self, spec: CommandSpec) -> CommandFuture<'_>;
}

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
}

impl CommandSpec {
    /// Start a spec for `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Build a spec from a configured command line such as `docker compose`.
    ///
    /// Returns `None` when `argv` is empty.
    #[must_use]
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Return the program name.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Return the argument list.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Exit status and captured streams of a finished program.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// An output with exit code zero and the given stdout.
    #[must_use]
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// An output with the given non-zero code and stderr.
    #[must_use]
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the program exited with status zero.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Stdout followed by stderr, trimmed.
    #[must_use]
    pub fn combined(&self) -> String {
        let joined = format!("{}{}", self.stdout, self.stderr);
        joined.trim().to_owned()
    }

    /// Convert a non-zero exit into `CommandError::NonZeroExit`.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::NonZeroExit` carrying the combined output when
    /// the program did not succeed.
    pub fn into_checked(self, program: &str) -> Result<Self, CommandError> {
        if self.succeeded() {
            return Ok(self);
        }
        Err(CommandError::NonZeroExit {
            program: program.to_owned(),
            code: self.code.unwrap_or(-1),
            stderr: self.combined(),
        })
    }
}

/// Runs programs on the host with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, spec: CommandSpec) -> CommandFuture<'_> {
        Box::pin(async move {
            debug!(command = %spec, "running host command");
            let output = tokio::process::Command::new(spec.program())
                .args(spec.arguments())
                .stdin(Stdio::null())
                .output()
                .await
                .map_err(|e| CommandError::SpawnFailed {
                    program: spec.program().to_owned(),
                    message: e.to_string(),
                })?;

            let result = CommandOutput {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            };
            debug!(command = %spec, code = ?result.code, "host command finished");
            Ok(result)
        })
    }
}

#[cfg(test)]
pub(crate) mod fake;
