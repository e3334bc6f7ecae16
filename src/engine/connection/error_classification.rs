//! Error classification helpers for container engine failures.
//!
//! Converts low-level `Bollard` errors into semantic `ContainerError`
//! variants: connection failures are attributed to the socket file where
//! possible, and runtime call failures keep the engine's message and status.

use std::path::Path;

use crate::error::ContainerError;

/// HTTP status the engine returns for a missing container or network.
const STATUS_NOT_FOUND: u16 = 404;

/// HTTP status the engine returns when a name is already taken.
const STATUS_CONFLICT: u16 = 409;

/// Strips the `unix://` or `npipe://` scheme to get the raw socket path.
fn extract_socket_path(socket_uri: &str) -> Option<&Path> {
    socket_uri
        .strip_prefix("unix://")
        .or_else(|| socket_uri.strip_prefix("npipe://"))
        .map(Path::new)
}

fn classify_io_error_kind(
    kind: std::io::ErrorKind,
    socket_path: Option<&Path>,
    error_msg: &str,
) -> ContainerError {
    match (kind, socket_path) {
        (std::io::ErrorKind::PermissionDenied, Some(path)) => ContainerError::PermissionDenied {
            path: path.to_path_buf(),
        },
        (std::io::ErrorKind::NotFound, Some(path)) => ContainerError::SocketNotFound {
            path: path.to_path_buf(),
        },
        _ => ContainerError::ConnectionFailed {
            message: error_msg.to_owned(),
        },
    }
}

/// Classify a `Bollard` connection error into a semantic `ContainerError`.
pub(super) fn classify_connection_error(
    bollard_error: &bollard::errors::Error,
    socket_uri: &str,
) -> ContainerError {
    let socket_path = extract_socket_path(socket_uri);
    let error_msg = bollard_error.to_string();

    if let (bollard::errors::Error::SocketNotFoundError(_), Some(path)) =
        (bollard_error, socket_path)
    {
        return ContainerError::SocketNotFound {
            path: path.to_path_buf(),
        };
    }

    let kind = match bollard_error {
        bollard::errors::Error::IOError { err } => {
            Some(io_error_kind_in_chain(err).unwrap_or_else(|| err.kind()))
        }
        other => io_error_kind_in_chain(other),
    };

    kind.map_or_else(
        || ContainerError::ConnectionFailed {
            message: error_msg.clone(),
        },
        |found| classify_io_error_kind(found, socket_path, &error_msg),
    )
}

/// Classify a failed runtime call (`stop`, `inspect`, `remove network`, ...).
///
/// A 404 from the engine becomes `NotFound`, a 409 becomes `AlreadyExists`,
/// and anything else keeps the engine's message verbatim.
pub(crate) fn classify_runtime_error(
    operation: &str,
    target: &str,
    bollard_error: &bollard::errors::Error,
) -> ContainerError {
    match bollard_error {
        bollard::errors::Error::DockerResponseServerError {
            status_code: STATUS_NOT_FOUND,
            ..
        } => ContainerError::NotFound {
            name: target.to_owned(),
        },
        bollard::errors::Error::DockerResponseServerError {
            status_code: STATUS_CONFLICT,
            ..
        } if operation == "create" => ContainerError::AlreadyExists {
            name: target.to_owned(),
        },
        bollard::errors::Error::DockerResponseServerError { message, .. } => {
            ContainerError::OperationFailed {
                operation: operation.to_owned(),
                target: target.to_owned(),
                message: message.clone(),
            }
        }
        other => ContainerError::OperationFailed {
            operation: operation.to_owned(),
            target: target.to_owned(),
            message: other.to_string(),
        },
    }
}

/// Walk the error source chain looking for an `io::Error` kind.
fn io_error_kind_in_chain(error: &dyn std::error::Error) -> Option<std::io::ErrorKind> {
    let mut current: Option<&(dyn std::error::Error + 'static)> = error.source();
    while let Some(err) = current {
        if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
            return Some(io_err.kind());
        }
        current = err.source();
    }
    None
}
