//! Mutating lifecycle operations.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::{ActionKind, CreateRequest};
use crate::command::CommandRunner;
use crate::config::{AppConfig, LimitsConfig};
use crate::engine::{
    ComposeAction, ComposeCli, ContainerRuntime, EngineConnector, ExecOutput, ExecRequest,
    classify_runtime_error,
};
use crate::error::{ContainerError, FilesystemError, HostError, LifecycleError};
use crate::network::{NetworkAllocator, NetworkLimiter, SubnetPrefix, SubnetRange};
use crate::tenant::{CredentialHash, TenantEnv, TenantName, TenantStore};
use crate::vhost::{FragmentChange, ReloadStatus, VhostSynchronizer};

/// Result of a credential rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RotationOutcome {
    /// The credential was replaced.
    Rotated {
        /// Whether the proxy picked up the change.
        reload: ReloadStatus,
    },
    /// The tenant has no proxy fragment.
    TenantNotFound,
}

/// Per-tenant results of a fragment rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResyncReport {
    /// Tenants whose fragment was written or upgraded.
    pub published: Vec<String>,
    /// Tenants whose fragment was already current.
    pub unchanged: Vec<String>,
    /// Tenants without a recorded subnet prefix.
    pub skipped: Vec<String>,
    /// `tenant: error` for each tenant that could not be published.
    pub failed: Vec<String>,
}

/// Owns every component a mutating operation touches.
///
/// The subnet allocator requires `&mut self` for [`Self::create`], so a
/// single owner (the task worker) serializes all leases.
pub struct LifecycleManager {
    pub(super) runtime: Arc<dyn ContainerRuntime>,
    pub(super) allocator: NetworkAllocator,
    pub(super) limiter: NetworkLimiter,
    pub(super) vhosts: VhostSynchronizer,
    pub(super) compose: ComposeCli,
    pub(super) store: TenantStore,
    pub(super) limits: LimitsConfig,
    pub(super) host_octet: u8,
    pub(super) network_suffix: String,
    pub(super) default_credential_hash: CredentialHash,
}

impl LifecycleManager {
    /// Assemble a manager from configuration.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::InvalidPrefix` for a malformed subnet base,
    /// `ConfigError::InvalidValue` for an empty compose command and a
    /// `ValidationError` when the default credential is not a bcrypt hash.
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        runner: Arc<dyn CommandRunner>,
        config: &AppConfig,
    ) -> Result<Self, HostError> {
        let network = &config.network;
        let default_credential_hash =
            CredentialHash::new(config.tenants.default_credential_hash.as_str())?;
        let range = SubnetRange::new(
            &network.subnet_base,
            network.first_prefix,
            network.last_prefix,
        )?;
        Ok(Self {
            allocator: NetworkAllocator::new(Arc::clone(&runtime), range),
            limiter: NetworkLimiter::new(Arc::clone(&runner), &config.tools, network),
            vhosts: VhostSynchronizer::new(Arc::clone(&runner), &config.server_name, &config.proxy),
            compose: ComposeCli::new(runner, config.tools.compose_command.clone())?,
            store: TenantStore::new(
                config.tenants.volumes_dir.clone(),
                config.tenants.compose_template.clone(),
            ),
            limits: config.limits.clone(),
            host_octet: network.container_host_octet,
            network_suffix: network.network_suffix.clone(),
            default_credential_hash,
            runtime,
        })
    }

    /// The tenant directory store.
    #[must_use]
    pub const fn store(&self) -> &TenantStore {
        &self.store
    }

    /// Provision a tenant: lease a subnet, write its directory, bring the
    /// compose project up, apply limits and publish its site.
    ///
    /// The site is always written with the request's credential, replacing
    /// any fragment a previous tenant of the same name left behind. Limits
    /// are best effort: a failed shaping command is logged and does not fail
    /// the create.
    ///
    /// Nothing is left behind on failure: once the directory step has
    /// started, every committed resource is released before the error is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::AlreadyExists` or
    /// `NetworkError::ResourceExhausted` without side effects, and
    /// `LifecycleError::CreateFailed` when a later step failed.
    pub async fn create(&mut self, request: &CreateRequest) -> Result<(), HostError> {
        let name = &request.name;
        if self.store.exists(name).await? {
            return Err(ContainerError::AlreadyExists {
                name: name.to_string(),
            }
            .into());
        }

        let prefix = self.allocator.allocate().await?;
        info!(tenant = %name, %prefix, image = %request.image, "creating deployment");

        let env = TenantEnv {
            image: request.image.clone(),
            container_name: name.to_string(),
            external_port: request.port.get(),
            cpu_limit: self.limits.cpu.clone(),
            memory_limit: self.limits.memory.clone(),
            ip_prefix: prefix,
            tmpfs_size: self.limits.tmpfs_size.clone(),
            bridge_name: name.bridge_name(),
        };
        let result = match self.store.materialize(name, &env).await {
            Err(HostError::Filesystem(FilesystemError::AlreadyExists { .. })) => {
                return Err(ContainerError::AlreadyExists {
                    name: name.to_string(),
                }
                .into());
            }
            Err(error) => Err(error),
            Ok(()) => self.bring_up(request, prefix).await,
        };

        match result {
            Ok(()) => {
                info!(tenant = %name, %prefix, "deployment created");
                Ok(())
            }
            Err(cause) => {
                warn!(tenant = %name, error = %cause, "create failed, releasing resources");
                let report = self.teardown(name, Some(prefix), &name.bridge_name()).await;
                Err(LifecycleError::CreateFailed {
                    tenant: name.to_string(),
                    cause: Box::new(cause),
                    cleanup: report.summary(),
                }
                .into())
            }
        }
    }

    async fn bring_up(&self, request: &CreateRequest, prefix: SubnetPrefix) -> Result<(), HostError> {
        let name = &request.name;
        let project = self.store.project(name);
        self.compose.run(&project, ComposeAction::Build).await?;
        self.compose.run(&project, ComposeAction::Up).await?;
        self.limiter.apply(prefix, &name.bridge_name()).await;
        let address = prefix.container_address(self.host_octet);
        self.vhosts
            .install(name, &address, &request.credential_hash)
            .await?;
        Ok(())
    }

    /// Start, stop, restart or recreate a deployment.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::NotFound` for an unknown deployment and the
    /// runtime's message for any other rejection.
    pub async fn control(&self, action: ActionKind, name: &TenantName) -> Result<(), HostError> {
        let target = name.as_str();
        let result = match action {
            ActionKind::Start => self.runtime.start_container(target).await,
            ActionKind::Stop => self.runtime.stop_container(target).await,
            ActionKind::Restart => self.runtime.restart_container(target).await,
            ActionKind::Recreate => return self.recreate(name, false).await,
        };
        result.map_err(|error| classify_runtime_error(action.as_str(), target, &error))?;
        info!(tenant = target, %action, "deployment action completed");
        Ok(())
    }

    /// Recreate containers from the tenant's compose definition and start
    /// them.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::NotFound` without a tenant directory and
    /// `ContainerError::ComposeFailed` when compose fails.
    pub async fn recreate(&self, name: &TenantName, force: bool) -> Result<(), HostError> {
        if !self.store.exists(name).await? {
            return Err(ContainerError::NotFound {
                name: name.to_string(),
            }
            .into());
        }
        let project = self.store.project(name);
        self.compose
            .run(
                &project,
                ComposeAction::Create {
                    force_recreate: force,
                },
            )
            .await?;
        self.compose.run(&project, ComposeAction::Start).await
    }

    /// Run `command` with `bash -c` inside the tenant container.
    ///
    /// A non-zero exit status is returned as part of the output.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MissingField` for a blank command and
    /// `ContainerError::ExecFailed` when the runtime rejects the exec.
    pub async fn exec(&self, name: &TenantName, command: &str) -> Result<ExecOutput, HostError> {
        let request = ExecRequest::shell(name.as_str(), command)?;
        EngineConnector::exec_captured_async(self.runtime.as_ref(), &request).await
    }

    /// Replace the tenant's proxy credential.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError` variants when the fragment cannot be read, parsed
    /// or written.
    pub async fn rotate_credential(
        &self,
        name: &TenantName,
        credential_hash: &CredentialHash,
    ) -> Result<RotationOutcome, HostError> {
        let outcome = self.vhosts.rotate_credential(name, credential_hash).await?;
        Ok(match outcome.change {
            FragmentChange::Absent => RotationOutcome::TenantNotFound,
            _ => RotationOutcome::Rotated {
                reload: outcome.reload,
            },
        })
    }

    /// Republish a fragment for every tenant directory with a recorded
    /// subnet prefix.
    ///
    /// Existing credentials are preserved; tenants without a fragment get
    /// the configured default credential.
    ///
    /// # Errors
    ///
    /// Returns `FilesystemError::IoError` if the volumes directory cannot be
    /// listed. Per-tenant failures are collected in the report.
    pub async fn resync(&self) -> Result<ResyncReport, HostError> {
        let mut report = ResyncReport::default();
        for name in self.store.tenant_names().await? {
            let Some(prefix) = self
                .store
                .read_env(&name)
                .await
                .and_then(|env| env.subnet_prefix())
            else {
                report.skipped.push(name.to_string());
                continue;
            };
            let address = prefix.container_address(self.host_octet);
            match self
                .vhosts
                .publish(&name, &address, &self.default_credential_hash)
                .await
            {
                Ok(outcome) if outcome.change == FragmentChange::Unchanged => {
                    report.unchanged.push(name.to_string());
                }
                Ok(_) => report.published.push(name.to_string()),
                Err(error) => {
                    warn!(tenant = %name, %error, "fragment rebuild failed");
                    report.failed.push(format!("{name}: {error}"));
                }
            }
        }
        info!(
            published = report.published.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "proxy fragments rebuilt"
        );
        Ok(report)
    }
}
