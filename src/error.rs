//! Semantic error types for the podhost control plane.
//!
//! This module defines the error hierarchy for podhost, following the
//! principle of using semantic error enums (via `thiserror`) for conditions the
//! caller might inspect, retry, or map to an HTTP status, while reserving
//! opaque errors (`eyre::Report`) for the application boundary.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found at the expected path.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// The path where the configuration file was expected.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration file: {message}")]
    ParseError {
        /// A description of the parse error.
        message: String,
    },

    /// A required configuration value is missing.
    #[error("missing required configuration: {field}")]
    MissingRequired {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// The reason the value is invalid.
        reason: String,
    },

    /// The `OrthoConfig` library returned an error during configuration loading.
    #[error("configuration loading failed: {0}")]
    OrthoConfig(Arc<ortho_config::OrthoError>),
}

/// Errors raised when request input is rejected before any side effect.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The tenant name does not satisfy the naming rules.
    #[error("invalid tenant name '{name}': {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why the name was rejected.
        reason: String,
    },

    /// The external port is not an integer in `1..=65535`.
    #[error("invalid port '{value}': {reason}")]
    InvalidPort {
        /// The rejected raw value.
        value: String,
        /// Why the port was rejected.
        reason: String,
    },

    /// The requested lifecycle action is not one of the supported kinds.
    #[error("unknown action '{action}': expected start, stop, restart or recreate")]
    UnknownAction {
        /// The rejected action name.
        action: String,
    },

    /// A required request parameter is missing or blank.
    #[error("missing required parameter: {field}")]
    MissingField {
        /// The name of the missing parameter.
        field: String,
    },

    /// The credential is not a bcrypt hash the proxy can load.
    #[error("invalid credential hash: {reason}")]
    InvalidCredential {
        /// Why the hash was rejected.
        reason: String,
    },

    /// The container image reference contains characters no registry
    /// reference may carry.
    #[error("invalid image reference '{image}': {reason}")]
    InvalidImage {
        /// The rejected reference, with control characters escaped.
        image: String,
        /// Why the reference was rejected.
        reason: String,
    },
}

/// Errors that can occur during container engine operations.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Failed to connect to the container engine socket.
    #[error("failed to connect to container engine: {message}")]
    ConnectionFailed {
        /// A description of the connection failure.
        message: String,
    },

    /// The container engine socket was not found.
    #[error("container engine socket not found: {path}")]
    SocketNotFound {
        /// The path where the socket was expected.
        path: PathBuf,
    },

    /// Permission denied when accessing the container engine socket.
    #[error("permission denied accessing container socket: {path}")]
    PermissionDenied {
        /// The path to the socket.
        path: PathBuf,
    },

    /// Health check failed - engine did not respond correctly.
    #[error("container engine health check failed: {message}")]
    HealthCheckFailed {
        /// A description of the health check failure.
        message: String,
    },

    /// Health check timed out.
    #[error("container engine health check timed out after {seconds} seconds")]
    HealthCheckTimeout {
        /// The timeout duration in seconds.
        seconds: u64,
    },

    /// Failed to create a Tokio runtime for synchronous operations.
    #[error("failed to create async runtime: {message}")]
    RuntimeCreationFailed {
        /// A description of the runtime creation failure.
        message: String,
    },

    /// The tenant deployment does not exist in the runtime.
    #[error("deployment '{name}' not found")]
    NotFound {
        /// The tenant name.
        name: String,
    },

    /// A deployment with this name already exists.
    #[error("deployment '{name}' already exists")]
    AlreadyExists {
        /// The tenant name.
        name: String,
    },

    /// The engine rejected a runtime operation.
    #[error("{operation} failed for '{target}': {message}")]
    OperationFailed {
        /// The operation that failed (for example `stop`).
        operation: String,
        /// The container or network the operation targeted.
        target: String,
        /// The engine's message.
        message: String,
    },

    /// Failed to execute a command in a container.
    #[error("failed to execute command in container '{container_id}': {message}")]
    ExecFailed {
        /// The ID of the container.
        container_id: String,
        /// A description of the execution failure.
        message: String,
    },

    /// A compose subcommand failed for a tenant project.
    #[error("compose {action} failed for '{project}': {message}")]
    ComposeFailed {
        /// The compose project (tenant) name.
        project: String,
        /// The compose subcommand (for example `up`).
        action: String,
        /// Captured output or spawn error.
        message: String,
    },
}

/// Errors raised while running privileged host tools.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The program could not be started at all.
    #[error("failed to spawn '{program}': {message}")]
    SpawnFailed {
        /// The program that failed to start.
        program: String,
        /// The operating system's message.
        message: String,
    },

    /// The program ran but exited unsuccessfully.
    #[error("'{program}' exited with status {code}: {stderr}")]
    NonZeroExit {
        /// The program that failed.
        program: String,
        /// Exit code, or `-1` when terminated by a signal.
        code: i32,
        /// Captured standard error.
        stderr: String,
    },
}

/// Errors raised by subnet allocation and network rules.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Every prefix in the reserved range is leased.
    #[error("no free subnet prefix in {base}.{first}-{last}")]
    ResourceExhausted {
        /// The first two octets shared by every candidate.
        base: String,
        /// First candidate third octet.
        first: u8,
        /// Last candidate third octet.
        last: u8,
    },

    /// The runtime's network list could not be read.
    #[error("failed to list runtime networks: {message}")]
    ListFailed {
        /// The engine's message.
        message: String,
    },

    /// A subnet prefix string could not be parsed.
    #[error("invalid subnet prefix '{value}'")]
    InvalidPrefix {
        /// The rejected value.
        value: String,
    },
}

/// Errors raised while reading or writing reverse-proxy fragments.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The fragment file could not be read.
    #[error("failed to read proxy fragment '{path}': {message}")]
    ReadFailed {
        /// The fragment path.
        path: PathBuf,
        /// A description of the I/O failure.
        message: String,
    },

    /// The fragment file could not be written or removed.
    #[error("failed to write proxy fragment '{path}': {message}")]
    WriteFailed {
        /// The fragment path.
        path: PathBuf,
        /// A description of the I/O failure.
        message: String,
    },

    /// The fragment exists but its structure is not recognised.
    #[error("malformed proxy fragment '{path}': {source}")]
    Malformed {
        /// The fragment path.
        path: PathBuf,
        /// What the parser could not find.
        source: FragmentParseError,
    },
}

/// Structural problems found while parsing a proxy fragment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FragmentParseError {
    /// The marker line names a revision this build does not know.
    #[error("unsupported revision '{value}'")]
    UnsupportedRevision {
        /// The revision text after the marker.
        value: String,
    },

    /// The first directive line is not a `<site> {` opener.
    #[error("expected a site block, found '{line}'")]
    InvalidSite {
        /// The offending line.
        line: String,
    },

    /// No site block was found.
    #[error("no site block")]
    MissingSite,

    /// No `reverse_proxy` directive was found.
    #[error("no reverse_proxy directive")]
    MissingUpstream,

    /// No `basicauth` block was found.
    #[error("no basicauth block")]
    MissingAuth,

    /// The `basicauth` block has no credential line.
    #[error("auth block has no credential")]
    EmptyAuth,

    /// The credential line is not `<user> <hash>`.
    #[error("expected '<user> <hash>', found '{line}'")]
    InvalidCredentialLine {
        /// The offending line.
        line: String,
    },

    /// The credential line carries something other than a bcrypt hash.
    #[error("credential of '{user}' is not a bcrypt hash")]
    InvalidHash {
        /// The basic-auth user on that line.
        user: String,
    },
}

/// Errors that can occur during filesystem operations.
#[derive(Debug, Error)]
pub enum FilesystemError {
    /// A file or directory was not found.
    #[error("path not found: {path}")]
    NotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// A directory that must be fresh already exists.
    #[error("path already exists: {path}")]
    AlreadyExists {
        /// The conflicting path.
        path: PathBuf,
    },

    /// An I/O error occurred.
    #[error("I/O error at '{path}': {message}")]
    IoError {
        /// The path where the error occurred.
        path: PathBuf,
        /// A description of the I/O error.
        message: String,
    },
}

/// Errors raised by the task execution engine itself.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The queue has been shut down and accepts no new work.
    #[error("task queue is closed")]
    QueueClosed,

    /// The worker could not be joined during shutdown.
    #[error("task worker terminated abnormally: {message}")]
    WorkerLost {
        /// The join error message.
        message: String,
    },
}

/// Errors for multi-step lifecycle operations that committed partial work.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Creation failed; compensating cleanup ran before this was reported.
    #[error("failed to create '{tenant}': {cause} (cleanup: {cleanup})")]
    CreateFailed {
        /// The tenant being created.
        tenant: String,
        /// The step failure that aborted creation.
        cause: Box<HostError>,
        /// Summary of the compensating cleanup.
        cleanup: String,
    },

    /// One or more teardown steps failed.
    #[error("removal of '{tenant}' incomplete: {}", failures.join("; "))]
    RemovalFailed {
        /// The tenant being removed.
        tenant: String,
        /// One entry per failed step, `step: message`.
        failures: Vec<String>,
    },
}

/// Top-level error type for the podhost control plane.
///
/// This enum aggregates all domain-specific errors into a single type that can
/// be used throughout the library. At the application boundary (main.rs),
/// these errors are converted to `eyre::Report` for human-readable reporting.
#[derive(Debug, Error)]
pub enum HostError {
    /// An error occurred during configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Request input was rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// An error occurred during container operations.
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// A host tool failed.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Subnet allocation or network rules failed.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Reverse-proxy fragment handling failed.
    #[error(transparent)]
    Proxy(#[from] ProxyError),

    /// An error occurred during filesystem operations.
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),

    /// The task engine rejected or lost work.
    #[error(transparent)]
    Task(#[from] TaskError),

    /// A multi-step lifecycle operation failed.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl HostError {
    /// Returns whether the error was raised before any side effect.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// A specialised `Result` type for podhost operations.
pub type Result<T> = std::result::Result<T, HostError>;
