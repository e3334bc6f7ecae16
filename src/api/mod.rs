//! Submission surface for podhost.
//!
//! [`HostService`] validates caller input synchronously, turns it into a
//! typed task for the single lifecycle worker, and answers read-only
//! questions directly against the container runtime. It does not print or
//! exit; the CLI adapter owns presentation.

use std::str::FromStr;
use std::sync::Arc;

use crate::command::{CommandRunner, SystemCommandRunner};
use crate::config::AppConfig;
use crate::engine::{ContainerRuntime, ContainerSummary, EngineConnector, SocketResolver};
use crate::error::{HostError, ValidationError};
use crate::lifecycle::{
    ActionKind, CreateRequest, DeploymentQueries, DeploymentStats, DeploymentStatus,
    LifecycleManager,
};
use crate::tasks::{TaskEngine, TaskId, TaskPayload, TaskRecord};
use crate::tenant::{CredentialHash, ExternalPort, ImageRef, TenantName};

/// Parameters for provisioning a tenant.
///
/// Groups the arguments of [`HostService::submit_create`] into a single
/// struct to satisfy the "no more than four parameters" convention.
#[derive(Debug, Clone, Copy)]
pub struct CreateParams<'a> {
    /// Tenant name.
    pub name: &'a str,
    /// External port, as supplied by the caller.
    pub port: &'a str,
    /// Container image; the configured default applies when absent.
    pub image: Option<&'a str>,
    /// Basic-auth password hash; the configured default applies when absent.
    pub credential_hash: Option<&'a str>,
}

/// Validates requests, queues lifecycle work and serves runtime queries.
pub struct HostService {
    tasks: TaskEngine,
    queries: DeploymentQueries,
    default_image: ImageRef,
    default_credential_hash: CredentialHash,
}

impl HostService {
    /// Assemble a service over an existing runtime and command runner.
    ///
    /// # Errors
    ///
    /// Returns configuration errors raised while building the lifecycle
    /// manager, and `ValidationError` when the configured default image or
    /// credential hash is malformed.
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        runner: Arc<dyn CommandRunner>,
        config: &AppConfig,
    ) -> Result<Self, HostError> {
        let default_image = ImageRef::new(config.tenants.default_image.as_str())?;
        let default_credential_hash =
            CredentialHash::new(config.tenants.default_credential_hash.as_str())?;
        let manager = LifecycleManager::new(Arc::clone(&runtime), runner, config)?;
        Ok(Self {
            tasks: TaskEngine::new(manager),
            queries: DeploymentQueries::new(runtime),
            default_image,
            default_credential_hash,
        })
    }

    /// Connect to the configured engine and run host tools directly.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError` connection variants when the engine cannot
    /// be reached, plus any error from [`Self::new`].
    pub async fn connect<E: mockable::Env>(
        config: &AppConfig,
        env: &E,
    ) -> Result<Self, HostError> {
        let resolver = SocketResolver::new(env);
        let docker = EngineConnector::connect_with_fallback_and_verify_async(
            config.engine_socket.as_deref(),
            &resolver,
        )
        .await?;
        Self::new(Arc::new(docker), Arc::new(SystemCommandRunner), config)
    }

    /// Queue provisioning of a new tenant.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for a bad name, port, image or credential
    /// hash before anything is queued.
    pub async fn submit_create(&self, params: CreateParams<'_>) -> Result<TaskId, HostError> {
        let request = CreateRequest {
            name: TenantName::new(params.name)?,
            port: params.port.parse::<ExternalPort>()?,
            image: or_default(params.image, &self.default_image)?,
            credential_hash: or_default(params.credential_hash, &self.default_credential_hash)?,
        };
        self.tasks.submit(TaskPayload::Create(request)).await
    }

    /// Queue a start, stop, restart or recreate of a deployment.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::UnknownAction` or `InvalidName` before
    /// anything is queued.
    pub async fn submit_action(&self, action: &str, name: &str) -> Result<TaskId, HostError> {
        let kind: ActionKind = action.parse()?;
        let tenant = TenantName::new(name)?;
        self.tasks
            .submit(TaskPayload::Action {
                action: kind,
                name: tenant,
            })
            .await
    }

    /// Queue a shell command inside a deployment.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for a bad name or blank command.
    pub async fn submit_exec(&self, name: &str, command: &str) -> Result<TaskId, HostError> {
        let tenant = TenantName::new(name)?;
        let snippet = required("command", command)?;
        self.tasks
            .submit(TaskPayload::Exec {
                name: tenant,
                command: snippet,
            })
            .await
    }

    /// Queue removal of a tenant.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidName` before anything is queued.
    pub async fn submit_remove(&self, name: &str) -> Result<TaskId, HostError> {
        let tenant = TenantName::new(name)?;
        self.tasks.submit(TaskPayload::Remove { name: tenant }).await
    }

    /// Queue replacement of a tenant's proxy credential.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for a bad name, or for a hash that is blank
    /// or not a bcrypt hash.
    pub async fn submit_rotate_credential(
        &self,
        name: &str,
        credential_hash: &str,
    ) -> Result<TaskId, HostError> {
        let tenant = TenantName::new(name)?;
        let hash: CredentialHash = credential_hash.parse()?;
        self.tasks
            .submit(TaskPayload::UpdateCredential {
                name: tenant,
                credential_hash: hash,
            })
            .await
    }

    /// Queue a rebuild of every tenant's proxy fragment.
    ///
    /// # Errors
    ///
    /// Returns `TaskError::QueueClosed` after shutdown.
    pub async fn resync_vhosts(&self) -> Result<TaskId, HostError> {
        self.tasks.submit(TaskPayload::Resync).await
    }

    /// The current record of a task, or `None` if the id is unknown.
    pub async fn get_task(&self, task_id: TaskId) -> Option<TaskRecord> {
        self.tasks.status(task_id).await
    }

    /// Every deployment container with its state.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::OperationFailed` if listing fails.
    pub async fn list_deployments(&self) -> Result<Vec<ContainerSummary>, HostError> {
        self.queries.list().await
    }

    /// Number of running deployment containers.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::OperationFailed` if listing fails.
    pub async fn count_running(&self) -> Result<usize, HostError> {
        self.queries.count_running().await
    }

    /// Accumulated log output of a deployment.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidName` or `ContainerError::NotFound`.
    pub async fn get_logs(&self, name: &str) -> Result<String, HostError> {
        self.queries.logs(&TenantName::new(name)?).await
    }

    /// A one-shot stats sample, or an explicit not-running result.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidName` or `ContainerError::NotFound`.
    pub async fn get_stats(&self, name: &str) -> Result<DeploymentStats, HostError> {
        self.queries.stats(&TenantName::new(name)?).await
    }

    /// Whether a deployment is running, stopped or absent.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidName`, or the runtime's message for
    /// failures other than a missing container.
    pub async fn get_status(&self, name: &str) -> Result<DeploymentStatus, HostError> {
        self.queries.status(&TenantName::new(name)?).await
    }

    /// Stop accepting work and wait for queued tasks to finish.
    ///
    /// # Errors
    ///
    /// Returns `TaskError::WorkerLost` if the worker could not be joined.
    pub async fn shutdown(&self) -> Result<(), HostError> {
        self.tasks.shutdown().await
    }
}

fn or_default<T>(value: Option<&str>, default: &T) -> Result<T, ValidationError>
where
    T: Clone + FromStr<Err = ValidationError>,
{
    value
        .map(str::trim)
        .filter(|candidate| !candidate.is_empty())
        .map_or_else(|| Ok(default.clone()), str::parse::<T>)
}

fn required(field: &str, value: &str) -> Result<String, ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField {
            field: field.to_owned(),
        });
    }
    Ok(value.to_owned())
}
