//! Command execution inside tenant containers with captured output.
//!
//! This module wraps Bollard exec APIs behind a small trait seam so command
//! execution behaviour can be unit-tested without a live daemon. Output from
//! both streams is collected in arrival order and returned with the exit code.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, CreateExecResults, StartExecOptions, StartExecResults};
use bollard::{Docker, errors::Error as BollardError};
use futures_util::StreamExt;
use serde::Serialize;
use tokio::time::sleep;
use tracing::debug;

use super::EngineConnector;
use crate::error::{ContainerError, HostError, ValidationError};

const EXEC_INSPECT_POLL_INTERVAL_MS: u64 = 100;

/// Boxed future type returned by [`ContainerExecClient::create_exec`].
pub type CreateExecFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CreateExecResults, BollardError>> + Send + 'a>>;

/// Boxed future type returned by [`ContainerExecClient::start_exec`].
pub type StartExecFuture<'a> =
    Pin<Box<dyn Future<Output = Result<StartExecResults, BollardError>> + Send + 'a>>;

/// Boxed future type returned by [`ContainerExecClient::inspect_exec`].
pub type InspectExecFuture<'a> = Pin<
    Box<
        dyn Future<Output = Result<bollard::models::ExecInspectResponse, BollardError>> + Send + 'a,
    >,
>;

/// Behaviour required to run and inspect exec sessions.
pub trait ContainerExecClient {
    /// Create an exec session in a running container.
    fn create_exec(
        &self,
        container_id: &str,
        options: CreateExecOptions<String>,
    ) -> CreateExecFuture<'_>;

    /// Start a previously created exec session.
    fn start_exec(&self, exec_id: &str, options: Option<StartExecOptions>) -> StartExecFuture<'_>;

    /// Inspect an exec session for running status and exit code.
    fn inspect_exec(&self, exec_id: &str) -> InspectExecFuture<'_>;
}

impl ContainerExecClient for Docker {
    fn create_exec(
        &self,
        container_id: &str,
        options: CreateExecOptions<String>,
    ) -> CreateExecFuture<'_> {
        let container_id_owned = String::from(container_id);
        Box::pin(async move { Self::create_exec(self, &container_id_owned, options).await })
    }

    fn start_exec(&self, exec_id: &str, options: Option<StartExecOptions>) -> StartExecFuture<'_> {
        let exec_id_owned = String::from(exec_id);
        Box::pin(async move { Self::start_exec(self, &exec_id_owned, options).await })
    }

    fn inspect_exec(&self, exec_id: &str) -> InspectExecFuture<'_> {
        let exec_id_owned = String::from(exec_id);
        Box::pin(async move { Self::inspect_exec(self, &exec_id_owned).await })
    }
}

/// Parameters required to run a command in a running container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    container_id: String,
    command: Vec<String>,
}

impl ExecRequest {
    /// Create a request running `command` as argv in `container_id`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MissingField` when `container_id` or
    /// `command` is empty or the executable is blank.
    pub fn new(container_id: impl Into<String>, command: Vec<String>) -> Result<Self, HostError> {
        let container_id_value = container_id.into();
        let id = validate_required_field("container", &container_id_value)?;
        let executable_present = command
            .first()
            .is_some_and(|executable| !executable.trim().is_empty());
        if !executable_present {
            return Err(missing("command"));
        }

        Ok(Self {
            container_id: String::from(id),
            command,
        })
    }

    /// Wrap a shell snippet as `bash -c <snippet>`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MissingField` when the container or the
    /// snippet is blank.
    pub fn shell(container_id: impl Into<String>, snippet: &str) -> Result<Self, HostError> {
        if snippet.trim().is_empty() {
            return Err(missing("command"));
        }
        Self::new(
            container_id,
            vec![
                String::from("bash"),
                String::from("-c"),
                String::from(snippet),
            ],
        )
    }

    /// Return target container identifier.
    #[must_use]
    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Return command argv entries.
    #[must_use]
    pub fn command(&self) -> &[String] {
        &self.command
    }
}

/// Exit code and captured output of an exec session.
///
/// A non-zero exit code is a normal result, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecOutput {
    /// Command exit code captured from exec inspect.
    pub exit_code: i64,
    /// Stdout and stderr interleaved in arrival order.
    pub output: String,
}

impl EngineConnector {
    /// Execute a command and capture its output (async version).
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::ExecFailed` when the daemon rejects any step of
    /// the exec lifecycle.
    pub async fn exec_captured_async<C: ContainerExecClient + ?Sized>(
        client: &C,
        request: &ExecRequest,
    ) -> Result<ExecOutput, HostError> {
        let container_id = request.container_id();
        let create_result = client
            .create_exec(container_id, build_create_exec_options(request))
            .await
            .map_err(|error| exec_failed(container_id, format!("create exec failed: {error}")))?;

        let exec_id = create_result.id;
        debug!(container = container_id, exec_id = %exec_id, "exec session created");
        let start_result = client
            .start_exec(&exec_id, Some(build_start_exec_options()))
            .await
            .map_err(|error| exec_failed(container_id, format!("start exec failed: {error}")))?;

        let StartExecResults::Attached { mut output, .. } = start_result else {
            return Err(exec_failed(
                container_id,
                "daemon returned detached start result for captured exec",
            ));
        };

        let mut captured = Vec::new();
        while let Some(chunk) = output.next().await {
            let log = chunk
                .map_err(|error| exec_failed(container_id, format!("exec stream failed: {error}")))?;
            append_chunk(&mut captured, log);
        }

        let exit_code = wait_for_exit_code_async(client, container_id, &exec_id).await?;
        Ok(ExecOutput {
            exit_code,
            output: String::from_utf8_lossy(&captured).into_owned(),
        })
    }
}

fn append_chunk(captured: &mut Vec<u8>, log: LogOutput) {
    match log {
        LogOutput::StdOut { message }
        | LogOutput::StdErr { message }
        | LogOutput::Console { message } => captured.extend_from_slice(&message),
        LogOutput::StdIn { .. } => {}
    }
}

async fn wait_for_exit_code_async<C: ContainerExecClient + ?Sized>(
    client: &C,
    container_id: &str,
    exec_id: &str,
) -> Result<i64, HostError> {
    loop {
        let inspect = client
            .inspect_exec(exec_id)
            .await
            .map_err(|error| exec_failed(container_id, format!("inspect exec failed: {error}")))?;

        if inspect.running.unwrap_or(false) {
            sleep(Duration::from_millis(EXEC_INSPECT_POLL_INTERVAL_MS)).await;
            continue;
        }

        return inspect.exit_code.ok_or_else(|| {
            exec_failed(
                container_id,
                format!("exec session '{exec_id}' completed without an exit code"),
            )
        });
    }
}

fn build_create_exec_options(request: &ExecRequest) -> CreateExecOptions<String> {
    CreateExecOptions::<String> {
        attach_stdin: Some(false),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        tty: Some(false),
        cmd: Some(request.command().to_vec()),
        ..CreateExecOptions::default()
    }
}

const fn build_start_exec_options() -> StartExecOptions {
    StartExecOptions {
        detach: false,
        tty: false,
        output_capacity: None,
    }
}

fn validate_required_field<'a>(field: &str, value: &'a str) -> Result<&'a str, HostError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(missing(field));
    }
    Ok(trimmed)
}

fn missing(field: &str) -> HostError {
    HostError::from(ValidationError::MissingField {
        field: String::from(field),
    })
}

fn exec_failed(container_id: &str, message: impl Into<String>) -> HostError {
    HostError::from(ContainerError::ExecFailed {
        container_id: String::from(container_id),
        message: message.into(),
    })
}
