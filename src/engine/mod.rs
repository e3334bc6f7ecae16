//! Container engine connection, runtime calls and compose invocation.
//!
//! The engine socket is resolved through a priority-based fallback chain:
//!
//! 1. CLI argument (`--engine-socket`)
//! 2. Config file (`engine_socket` in TOML)
//! 3. `PODHOST_ENGINE_SOCKET` environment variable
//! 4. `DOCKER_HOST` environment variable
//! 5. `CONTAINER_HOST` environment variable
//! 6. `PODMAN_HOST` environment variable
//! 7. Platform default (`/var/run/docker.sock` on Unix)

mod compose;
mod connection;
#[cfg(test)]
pub(crate) mod mock;
mod runtime;

pub use compose::{COMPOSE_FILE_NAME, ComposeAction, ComposeCli, ComposeProject, ENV_FILE_NAME};
pub(crate) use connection::classify_runtime_error;
pub use connection::exec::{
    ContainerExecClient, CreateExecFuture, ExecOutput, ExecRequest, InspectExecFuture,
    StartExecFuture,
};
pub use connection::{EngineConnector, SocketResolver};
pub use runtime::{ContainerRuntime, ContainerSummary, RuntimeFuture};
