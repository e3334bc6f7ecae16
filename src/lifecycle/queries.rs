//! Read-only deployment queries that bypass the task queue.

use std::sync::Arc;

use bollard::models::{ContainerInspectResponse, ContainerStatsResponse};
use serde::Serialize;

use crate::engine::{ContainerRuntime, ContainerSummary, classify_runtime_error};
use crate::error::{ContainerError, HostError};
use crate::tenant::TenantName;

/// Coarse runtime state of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// The container is running.
    Running,
    /// The container exists but is not running.
    Stopped,
    /// The runtime has no such container.
    NotFound,
}

/// A stats sample with the inspect document, or an explicit "not running".
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeploymentStats {
    /// The container is running.
    Running {
        /// One-shot stats sample.
        stats: Box<ContainerStatsResponse>,
        /// Inspect document taken just before the sample.
        inspect: Box<ContainerInspectResponse>,
    },
    /// The container exists but is stopped.
    NotRunning,
}

/// Answers read-only questions directly against the runtime.
#[derive(Clone)]
pub struct DeploymentQueries {
    runtime: Arc<dyn ContainerRuntime>,
}

impl DeploymentQueries {
    /// Queries against `runtime`.
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Every container with its state, stopped ones included.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::OperationFailed` if the runtime cannot list
    /// containers.
    pub async fn list(&self) -> Result<Vec<ContainerSummary>, HostError> {
        self.runtime
            .list_containers()
            .await
            .map_err(|error| classify_runtime_error("list", "containers", &error).into())
    }

    /// Number of running containers.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::OperationFailed` if the runtime cannot list
    /// containers.
    pub async fn count_running(&self) -> Result<usize, HostError> {
        Ok(self
            .list()
            .await?
            .iter()
            .filter(|container| container.is_running())
            .count())
    }

    /// The container's full log.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::NotFound` for an unknown deployment.
    pub async fn logs(&self, name: &TenantName) -> Result<String, HostError> {
        self.runtime
            .container_logs(name.as_str())
            .await
            .map_err(|error| classify_runtime_error("logs", name.as_str(), &error).into())
    }

    /// A stats sample and inspect document when running.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::NotFound` for an unknown deployment.
    pub async fn stats(&self, name: &TenantName) -> Result<DeploymentStats, HostError> {
        let inspect = self.inspect(name).await?;
        if !is_running(&inspect) {
            return Ok(DeploymentStats::NotRunning);
        }
        let stats = self
            .runtime
            .container_stats(name.as_str())
            .await
            .map_err(|error| classify_runtime_error("stats", name.as_str(), &error))?;
        Ok(DeploymentStats::Running {
            stats: Box::new(stats),
            inspect: Box::new(inspect),
        })
    }

    /// Whether the deployment is running, stopped or absent.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::OperationFailed` when the runtime fails for
    /// any reason other than a missing container.
    pub async fn status(&self, name: &TenantName) -> Result<DeploymentStatus, HostError> {
        match self.inspect(name).await {
            Ok(inspect) if is_running(&inspect) => Ok(DeploymentStatus::Running),
            Ok(_) => Ok(DeploymentStatus::Stopped),
            Err(HostError::Container(ContainerError::NotFound { .. })) => {
                Ok(DeploymentStatus::NotFound)
            }
            Err(error) => Err(error),
        }
    }

    async fn inspect(&self, name: &TenantName) -> Result<ContainerInspectResponse, HostError> {
        self.runtime
            .inspect_container(name.as_str())
            .await
            .map_err(|error| classify_runtime_error("inspect", name.as_str(), &error).into())
    }
}

fn is_running(inspect: &ContainerInspectResponse) -> bool {
    inspect
        .state
        .as_ref()
        .and_then(|state| state.running)
        .unwrap_or(false)
}
