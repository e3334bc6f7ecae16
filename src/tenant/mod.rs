//! Tenant identity and the on-disk tenant record.
//!
//! - [`TenantName`], [`ExternalPort`], [`ImageRef`] and [`CredentialHash`]
//!   validate request input.
//! - [`TenantEnv`] and [`EnvFile`] write and read the `.env` file.
//! - [`TenantStore`] owns the tenant directories.

mod credential;
mod env_file;
mod image;
mod name;
mod store;

pub use credential::CredentialHash;
pub use env_file::{EnvFile, TenantEnv};
pub use image::ImageRef;
pub use name::{BRIDGE_PREFIX, ExternalPort, MAX_INTERFACE_NAME_LEN, TenantName};
pub use store::TenantStore;
