//! Compose project invocation for tenant deployments.
//!
//! Each tenant directory is a compose project named after the tenant. The
//! configured compose command (for example `docker compose`) is extended with
//! explicit project, directory, file and env-file flags so the invocation does
//! not depend on the working directory.

use std::fmt;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::command::{CommandRunner, CommandSpec};
use crate::error::{ConfigError, ContainerError, HostError};

/// File name of the compose definition inside a tenant directory.
pub const COMPOSE_FILE_NAME: &str = "docker-compose.yml";

/// File name of the generated environment file inside a tenant directory.
pub const ENV_FILE_NAME: &str = ".env";

/// A compose subcommand applied to a tenant project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeAction {
    /// Build images declared by the project.
    Build,
    /// Create and start services in the background.
    Up,
    /// Create containers without starting them.
    Create {
        /// Recreate containers even if their configuration is unchanged.
        force_recreate: bool,
    },
    /// Start existing containers.
    Start,
    /// Stop and remove containers, networks and volumes.
    Down,
}

impl ComposeAction {
    fn args(self) -> &'static [&'static str] {
        match self {
            Self::Build => &["build"],
            Self::Up => &["up", "-d"],
            Self::Create {
                force_recreate: true,
            } => &["create", "--force-recreate"],
            Self::Create {
                force_recreate: false,
            } => &["create"],
            Self::Start => &["start"],
            Self::Down => &["down", "-v"],
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Up => "up",
            Self::Create { .. } => "create",
            Self::Start => "start",
            Self::Down => "down",
        }
    }
}

impl fmt::Display for ComposeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A tenant's compose project: its name and directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeProject {
    name: String,
    directory: Utf8PathBuf,
}

impl ComposeProject {
    /// Describe the project `name` rooted at `directory`.
    #[must_use]
    pub fn new(name: impl Into<String>, directory: impl Into<Utf8PathBuf>) -> Self {
        Self {
            name: name.into(),
            directory: directory.into(),
        }
    }

    /// The project name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The project directory.
    #[must_use]
    pub fn directory(&self) -> &Utf8Path {
        &self.directory
    }

    /// The network compose creates for this project.
    #[must_use]
    pub fn network_name(&self, suffix: &str) -> String {
        format!("{}_{suffix}", self.name)
    }
}

/// Runs compose subcommands through a [`CommandRunner`].
#[derive(Clone)]
pub struct ComposeCli {
    runner: Arc<dyn CommandRunner>,
    command: Vec<String>,
}

impl fmt::Debug for ComposeCli {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposeCli")
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}

impl ComposeCli {
    /// Build a compose driver from a configured command line.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when `command` is empty.
    pub fn new(runner: Arc<dyn CommandRunner>, command: Vec<String>) -> Result<Self, HostError> {
        if command.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: String::from("tools.compose_command"),
                reason: String::from("cannot be empty"),
            }
            .into());
        }
        Ok(Self { runner, command })
    }

    /// The full command line for `action` on `project`.
    #[must_use]
    pub fn command_for(&self, project: &ComposeProject, action: ComposeAction) -> CommandSpec {
        let base = CommandSpec::from_argv(&self.command).unwrap_or_else(|| CommandSpec::new(""));
        let directory = project.directory();
        base.args(["-p", project.name()])
            .args(["--project-directory", directory.as_str()])
            .args(["-f", directory.join(COMPOSE_FILE_NAME).as_str()])
            .args(["--env-file", directory.join(ENV_FILE_NAME).as_str()])
            .args(action.args().iter().copied())
    }

    /// Run `action` on `project`.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::ComposeFailed` when compose cannot be spawned
    /// or exits unsuccessfully.
    pub async fn run(&self, project: &ComposeProject, action: ComposeAction) -> Result<(), HostError> {
        let spec = self.command_for(project, action);
        let program = String::from(spec.program());
        debug!(project = project.name(), %action, "running compose");
        let failed = |message: String| ContainerError::ComposeFailed {
            project: String::from(project.name()),
            action: action.to_string(),
            message,
        };
        let output = self
            .runner
            .run(spec)
            .await
            .map_err(|error| failed(error.to_string()))?;
        output
            .into_checked(&program)
            .map_err(|error| failed(error.to_string()))?;
        Ok(())
    }
}
