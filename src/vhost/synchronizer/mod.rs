//! Keeps per-tenant proxy fragments in step with tenant deployments.

use std::fmt;
use std::io;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::fragment::{Credential, Fragment, Revision};
use crate::command::{CommandRunner, CommandSpec};
use crate::config::ProxyConfig;
use crate::error::{HostError, ProxyError};
use crate::tenant::{CredentialHash, TenantName};

/// What an operation did to the fragment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentChange {
    /// A new fragment was written.
    Written,
    /// A stale fragment was overwritten.
    Replaced,
    /// An existing fragment was re-rendered at the current revision or with a
    /// new upstream.
    Upgraded,
    /// The fragment already matched; nothing was written.
    Unchanged,
    /// Only the credential was replaced.
    CredentialRotated,
    /// The fragment was deleted.
    Removed,
    /// There was no fragment to act on.
    Absent,
}

impl FragmentChange {
    const fn touched_file(self) -> bool {
        matches!(
            self,
            Self::Written
                | Self::Replaced
                | Self::Upgraded
                | Self::CredentialRotated
                | Self::Removed
        )
    }
}

/// Result of the proxy reload that follows a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reload", content = "message")]
pub enum ReloadStatus {
    /// The proxy accepted the new configuration.
    Reloaded,
    /// Nothing changed, so no reload was attempted.
    Skipped,
    /// The reload command failed; the file change stands.
    Failed(String),
}

/// Outcome of a synchronizer operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VhostOutcome {
    /// Effect on the fragment file.
    pub change: FragmentChange,
    /// Effect on the running proxy.
    pub reload: ReloadStatus,
}

/// Publishes, mutates and retracts tenant fragments.
#[derive(Clone)]
pub struct VhostSynchronizer {
    runner: Arc<dyn CommandRunner>,
    fragment_dir: Utf8PathBuf,
    server_name: String,
    domain: String,
    upstream_port: u16,
    reload_command: Vec<String>,
    bypass_paths: Vec<String>,
}

impl fmt::Debug for VhostSynchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VhostSynchronizer")
            .field("fragment_dir", &self.fragment_dir)
            .field("server_name", &self.server_name)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

impl VhostSynchronizer {
    /// A synchronizer for this host's `server_name` using `proxy` settings.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>, server_name: &str, proxy: &ProxyConfig) -> Self {
        Self {
            runner,
            fragment_dir: proxy.fragment_dir.clone(),
            server_name: server_name.to_owned(),
            domain: proxy.domain.clone(),
            upstream_port: proxy.upstream_port,
            reload_command: proxy.reload_command.clone(),
            bypass_paths: proxy.bypass_paths.clone(),
        }
    }

    /// `<tenant>.<server>.<domain>`.
    #[must_use]
    pub fn site_name(&self, tenant: &TenantName) -> String {
        format!("{tenant}.{}.{}", self.server_name, self.domain)
    }

    /// File name of the tenant's fragment, `<tenant>.<server>.caddy`.
    #[must_use]
    pub fn fragment_file_name(&self, tenant: &TenantName) -> String {
        format!("{tenant}.{}.caddy", self.server_name)
    }

    /// Full path of the tenant's fragment.
    #[must_use]
    pub fn fragment_path(&self, tenant: &TenantName) -> Utf8PathBuf {
        self.fragment_dir.join(self.fragment_file_name(tenant))
    }

    /// The upstream for a container address, `<address>:<port>`.
    #[must_use]
    pub fn upstream_for(&self, container_address: &str) -> String {
        format!("{container_address}:{}", self.upstream_port)
    }

    /// Make sure the tenant's fragment routes to `container_address`.
    ///
    /// `credential_hash` is used only when no fragment exists; an existing
    /// credential is always preserved.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::ReadFailed` or `ProxyError::WriteFailed` on I/O
    /// failure.
    pub async fn publish(
        &self,
        tenant: &TenantName,
        container_address: &str,
        credential_hash: &CredentialHash,
    ) -> Result<VhostOutcome, HostError> {
        let upstream = self.upstream_for(container_address);
        let path = self.fragment_path(tenant);
        let existing = self.read_fragment(tenant).await?;

        let (change, fragment) = match existing.as_deref().map(Fragment::parse) {
            None => (
                FragmentChange::Written,
                self.current_fragment(tenant, upstream, credential_hash, tenant.as_str()),
            ),
            Some(Ok(parsed))
                if parsed.revision == Revision::Current && parsed.upstream == upstream =>
            {
                debug!(path = %path, "proxy fragment already current");
                return Ok(VhostOutcome {
                    change: FragmentChange::Unchanged,
                    reload: ReloadStatus::Skipped,
                });
            }
            Some(Ok(parsed)) => (
                FragmentChange::Upgraded,
                self.current_fragment(
                    tenant,
                    upstream,
                    &parsed.credential.hash,
                    &parsed.credential.user,
                ),
            ),
            Some(Err(error)) => {
                warn!(path = %path, %error, "replacing unreadable proxy fragment");
                (
                    FragmentChange::Written,
                    self.current_fragment(tenant, upstream, credential_hash, tenant.as_str()),
                )
            }
        };

        self.write_fragment(tenant, fragment.render()).await?;
        info!(tenant = tenant.as_str(), ?change, "proxy fragment published");
        Ok(self.finish(change).await)
    }

    /// Write a fresh fragment for a newly created tenant.
    ///
    /// Unlike [`Self::publish`], any fragment left behind by an earlier
    /// tenant of the same name is overwritten together with its credential.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::ReadFailed` or `ProxyError::WriteFailed` on I/O
    /// failure.
    pub async fn install(
        &self,
        tenant: &TenantName,
        container_address: &str,
        credential_hash: &CredentialHash,
    ) -> Result<VhostOutcome, HostError> {
        let upstream = self.upstream_for(container_address);
        let change = if self.read_fragment(tenant).await?.is_some() {
            warn!(
                path = %self.fragment_path(tenant),
                "overwriting stale proxy fragment"
            );
            FragmentChange::Replaced
        } else {
            FragmentChange::Written
        };
        let fragment = self.current_fragment(tenant, upstream, credential_hash, tenant.as_str());
        self.write_fragment(tenant, fragment.render()).await?;
        info!(tenant = tenant.as_str(), ?change, "proxy fragment installed");
        Ok(self.finish(change).await)
    }

    /// Replace only the credential of the tenant's fragment.
    ///
    /// A missing fragment yields [`FragmentChange::Absent`].
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Malformed` if the fragment cannot be parsed, and
    /// `ProxyError::ReadFailed` or `ProxyError::WriteFailed` on I/O failure.
    pub async fn rotate_credential(
        &self,
        tenant: &TenantName,
        new_hash: &CredentialHash,
    ) -> Result<VhostOutcome, HostError> {
        let Some(text) = self.read_fragment(tenant).await? else {
            return Ok(VhostOutcome {
                change: FragmentChange::Absent,
                reload: ReloadStatus::Skipped,
            });
        };
        let mut fragment = Fragment::parse(&text).map_err(|source| ProxyError::Malformed {
            path: self.fragment_path(tenant).into_std_path_buf(),
            source,
        })?;
        new_hash.clone_into(&mut fragment.credential.hash);
        self.write_fragment(tenant, fragment.render()).await?;
        info!(tenant = tenant.as_str(), "credential rotated");
        Ok(self.finish(FragmentChange::CredentialRotated).await)
    }

    /// Delete the tenant's fragment if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::WriteFailed` if the file exists but cannot be
    /// removed.
    pub async fn retract(&self, tenant: &TenantName) -> Result<VhostOutcome, HostError> {
        let dir = self.fragment_dir.clone();
        let file_name = self.fragment_file_name(tenant);
        let path = self.fragment_path(tenant);
        let removed = blocking(&path, move || {
            let Ok(fragments) = Dir::open_ambient_dir(&dir, ambient_authority()) else {
                return Ok(false);
            };
            match fragments.remove_file(&file_name) {
                Ok(()) => Ok(true),
                Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
                Err(error) => Err(write_failed(&dir.join(&file_name), &error)),
            }
        })
        .await?;
        let change = if removed {
            FragmentChange::Removed
        } else {
            FragmentChange::Absent
        };
        Ok(self.finish(change).await)
    }

    fn current_fragment(
        &self,
        tenant: &TenantName,
        upstream: String,
        hash: &CredentialHash,
        user: &str,
    ) -> Fragment {
        Fragment {
            revision: Revision::Current,
            site: self.site_name(tenant),
            upstream,
            bypass_paths: self.bypass_paths.clone(),
            credential: Credential {
                user: user.to_owned(),
                hash: hash.clone(),
            },
        }
    }

    async fn finish(&self, change: FragmentChange) -> VhostOutcome {
        let reload = if change.touched_file() {
            self.reload().await
        } else {
            ReloadStatus::Skipped
        };
        VhostOutcome { change, reload }
    }

    async fn reload(&self) -> ReloadStatus {
        let Some(spec) = CommandSpec::from_argv(&self.reload_command) else {
            return ReloadStatus::Failed(String::from("reload command is empty"));
        };
        let program = String::from(spec.program());
        let result = self
            .runner
            .run(spec)
            .await
            .and_then(|output| output.into_checked(&program));
        match result {
            Ok(_) => ReloadStatus::Reloaded,
            Err(error) => {
                warn!(%error, "proxy reload failed");
                ReloadStatus::Failed(error.to_string())
            }
        }
    }

    async fn read_fragment(&self, tenant: &TenantName) -> Result<Option<String>, HostError> {
        let dir = self.fragment_dir.clone();
        let file_name = self.fragment_file_name(tenant);
        let path = self.fragment_path(tenant);
        blocking(&path, move || {
            let Ok(fragments) = Dir::open_ambient_dir(&dir, ambient_authority()) else {
                return Ok(None);
            };
            match fragments.read_to_string(&file_name) {
                Ok(text) => Ok(Some(text)),
                Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(error) => Err(ProxyError::ReadFailed {
                    path: dir.join(&file_name).into_std_path_buf(),
                    message: error.to_string(),
                }
                .into()),
            }
        })
        .await
    }

    async fn write_fragment(&self, tenant: &TenantName, contents: String) -> Result<(), HostError> {
        let dir = self.fragment_dir.clone();
        let file_name = self.fragment_file_name(tenant);
        let path = self.fragment_path(tenant);
        blocking(&path, move || {
            Dir::create_ambient_dir_all(&dir, ambient_authority())
                .and_then(|()| Dir::open_ambient_dir(&dir, ambient_authority()))
                .and_then(|fragments| fragments.write(&file_name, contents))
                .map_err(|error| write_failed(&dir.join(&file_name), &error))
        })
        .await
    }
}

fn write_failed(path: &Utf8Path, error: &io::Error) -> HostError {
    ProxyError::WriteFailed {
        path: path.as_std_path().to_path_buf(),
        message: error.to_string(),
    }
    .into()
}

async fn blocking<T, F>(path: &Utf8Path, work: F) -> Result<T, HostError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, HostError> + Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|error| {
        HostError::from(ProxyError::WriteFailed {
            path: path.as_std_path().to_path_buf(),
            message: format!("blocking task failed: {error}"),
        })
    })?
}
