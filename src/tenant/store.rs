//! Tenant directories under the configured volumes root.
//!
//! A tenant directory holds the compose file copied from the template, the
//! generated `.env` file and a `data/` directory mounted into the container.
//! All filesystem work goes through `cap_std` on the blocking pool.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use tracing::{debug, warn};

use super::{EnvFile, TenantEnv, TenantName};
use crate::engine::{COMPOSE_FILE_NAME, ComposeProject, ENV_FILE_NAME};
use crate::error::{FilesystemError, HostError};

const DATA_DIR_NAME: &str = "data";

/// Creates, reads and deletes tenant directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantStore {
    root: Utf8PathBuf,
    compose_template: Utf8PathBuf,
}

impl TenantStore {
    /// A store rooted at `root` that seeds new tenants from `compose_template`.
    #[must_use]
    pub const fn new(root: Utf8PathBuf, compose_template: Utf8PathBuf) -> Self {
        Self {
            root,
            compose_template,
        }
    }

    /// The directory for `name`.
    #[must_use]
    pub fn tenant_dir(&self, name: &TenantName) -> Utf8PathBuf {
        self.root.join(name.as_str())
    }

    /// The compose project rooted at the tenant directory.
    #[must_use]
    pub fn project(&self, name: &TenantName) -> ComposeProject {
        ComposeProject::new(name.as_str(), self.tenant_dir(name))
    }

    /// Whether a directory exists for `name`.
    ///
    /// # Errors
    ///
    /// Returns `FilesystemError::IoError` if the blocking task is lost.
    pub async fn exists(&self, name: &TenantName) -> Result<bool, HostError> {
        let root = self.root.clone();
        let tenant = String::from(name.as_str());
        run_blocking(&self.root, move || {
            Ok(Dir::open_ambient_dir(&root, ambient_authority())
                .is_ok_and(|dir| dir.is_dir(&tenant)))
        })
        .await
    }

    /// Create the tenant directory with its compose file, `.env` and `data/`.
    ///
    /// # Errors
    ///
    /// Returns `FilesystemError::AlreadyExists` if the directory is present,
    /// `FilesystemError::NotFound` if the compose template is missing, and
    /// `FilesystemError::IoError` for any other I/O failure.
    pub async fn materialize(&self, name: &TenantName, env: &TenantEnv) -> Result<(), HostError> {
        let root = self.root.clone();
        let template = self.compose_template.clone();
        let tenant = String::from(name.as_str());
        let rendered = env.render();
        run_blocking(&self.root, move || {
            let compose = read_template(&template)?;
            Dir::create_ambient_dir_all(&root, ambient_authority())
                .map_err(|e| io_error(&root, &e))?;
            let root_dir =
                Dir::open_ambient_dir(&root, ambient_authority()).map_err(|e| io_error(&root, &e))?;
            let tenant_path = root.join(&tenant);
            if root_dir.exists(&tenant) {
                return Err(FilesystemError::AlreadyExists {
                    path: tenant_path.into_std_path_buf(),
                }
                .into());
            }
            root_dir
                .create_dir(&tenant)
                .map_err(|e| io_error(&tenant_path, &e))?;
            let tenant_dir = root_dir
                .open_dir(&tenant)
                .map_err(|e| io_error(&tenant_path, &e))?;
            tenant_dir
                .create_dir(DATA_DIR_NAME)
                .map_err(|e| io_error(&tenant_path.join(DATA_DIR_NAME), &e))?;
            tenant_dir
                .write(COMPOSE_FILE_NAME, compose)
                .map_err(|e| io_error(&tenant_path.join(COMPOSE_FILE_NAME), &e))?;
            tenant_dir
                .write(ENV_FILE_NAME, rendered)
                .map_err(|e| io_error(&tenant_path.join(ENV_FILE_NAME), &e))?;
            debug!(path = %tenant_path, "tenant directory materialized");
            Ok(())
        })
        .await
    }

    /// Read the tenant's `.env` file.
    ///
    /// Returns `None` when the directory or file is missing or unreadable;
    /// callers fall back to derived defaults.
    pub async fn read_env(&self, name: &TenantName) -> Option<EnvFile> {
        let root = self.root.clone();
        let tenant = String::from(name.as_str());
        let result = run_blocking(&self.root, move || {
            let text = Dir::open_ambient_dir(&root, ambient_authority())
                .and_then(|dir| dir.open_dir(&tenant))
                .and_then(|dir| dir.read_to_string(ENV_FILE_NAME))
                .map_err(|e| io_error(&root.join(&tenant).join(ENV_FILE_NAME), &e))?;
            Ok(EnvFile::parse(&text))
        })
        .await;
        match result {
            Ok(env) => Some(env),
            Err(error) => {
                debug!(tenant = name.as_str(), %error, "tenant env file unavailable");
                None
            }
        }
    }

    /// Delete the tenant directory and everything in it.
    ///
    /// Returns `false` when there was nothing to delete.
    ///
    /// # Errors
    ///
    /// Returns `FilesystemError::IoError` if the directory exists but cannot
    /// be removed.
    pub async fn remove(&self, name: &TenantName) -> Result<bool, HostError> {
        let root = self.root.clone();
        let tenant = String::from(name.as_str());
        run_blocking(&self.root, move || {
            let Ok(root_dir) = Dir::open_ambient_dir(&root, ambient_authority()) else {
                return Ok(false);
            };
            if !root_dir.exists(&tenant) {
                return Ok(false);
            }
            root_dir
                .remove_dir_all(&tenant)
                .map_err(|e| io_error(&root.join(&tenant), &e))?;
            Ok(true)
        })
        .await
    }

    /// Every subdirectory of the root whose name is a valid tenant name, sorted.
    ///
    /// A missing root yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns `FilesystemError::IoError` if the root exists but cannot be
    /// listed.
    pub async fn tenant_names(&self) -> Result<Vec<TenantName>, HostError> {
        let root = self.root.clone();
        run_blocking(&self.root, move || {
            let Ok(root_dir) = Dir::open_ambient_dir(&root, ambient_authority()) else {
                return Ok(Vec::new());
            };
            let entries = root_dir.entries().map_err(|e| io_error(&root, &e))?;
            let mut names = Vec::new();
            for item in entries {
                let entry = item.map_err(|e| io_error(&root, &e))?;
                let is_dir = entry.file_type().is_ok_and(|kind| kind.is_dir());
                let Ok(file_name) = entry.file_name() else {
                    continue;
                };
                match TenantName::new(file_name) {
                    Ok(name) if is_dir => names.push(name),
                    Ok(_) => {}
                    Err(error) => warn!(%error, "skipping directory with invalid tenant name"),
                }
            }
            names.sort();
            Ok(names)
        })
        .await
    }
}

fn read_template(template: &Utf8Path) -> Result<String, HostError> {
    let parent = template
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = template.file_name().ok_or_else(|| FilesystemError::NotFound {
        path: template.as_std_path().to_path_buf(),
    })?;
    Dir::open_ambient_dir(parent, ambient_authority())
        .and_then(|dir| dir.read_to_string(file_name))
        .map_err(|e| io_error(template, &e))
}

fn io_error(path: &Utf8Path, error: &io::Error) -> HostError {
    let path_buf = path.as_std_path().to_path_buf();
    if error.kind() == io::ErrorKind::NotFound {
        return FilesystemError::NotFound { path: path_buf }.into();
    }
    FilesystemError::IoError {
        path: path_buf,
        message: error.to_string(),
    }
    .into()
}

async fn run_blocking<T, F>(path: &Utf8Path, work: F) -> Result<T, HostError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, HostError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|error| FilesystemError::IoError {
            path: path.as_std_path().to_path_buf(),
            message: format!("blocking task failed: {error}"),
        })?
}
