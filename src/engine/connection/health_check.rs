//! Engine health check run once before the control plane starts serving.

use std::time::Duration;

use bollard::Docker;
use tracing::info;

use super::{EngineConnector, HEALTH_CHECK_TIMEOUT_SECS, SocketResolver};
use crate::error::{ContainerError, HostError};

impl EngineConnector {
    /// Verify the container engine answers a ping within the health check
    /// timeout.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::HealthCheckTimeout` if the ping does not
    /// complete in time, and `ContainerError::HealthCheckFailed` if the engine
    /// answers with an error.
    pub async fn health_check_async(docker: &Docker) -> Result<(), HostError> {
        let timeout = Duration::from_secs(HEALTH_CHECK_TIMEOUT_SECS);

        tokio::time::timeout(timeout, docker.ping())
            .await
            .map_err(|_| ContainerError::HealthCheckTimeout {
                seconds: HEALTH_CHECK_TIMEOUT_SECS,
            })?
            .map_err(|e| ContainerError::HealthCheckFailed {
                message: e.to_string(),
            })?;
        Ok(())
    }

    /// Resolve, connect and ping in one step.
    ///
    /// # Errors
    ///
    /// Returns connection errors from [`Self::connect`] and health check
    /// errors from [`Self::health_check_async`].
    pub async fn connect_with_fallback_and_verify_async<E: mockable::Env>(
        config_socket: Option<&str>,
        resolver: &SocketResolver<'_, E>,
    ) -> Result<Docker, HostError> {
        let docker = Self::connect_with_fallback(config_socket, resolver)?;
        Self::health_check_async(&docker).await?;
        info!("container engine is responsive");
        Ok(docker)
    }
}
