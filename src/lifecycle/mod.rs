//! Tenant deployment lifecycle.
//!
//! [`LifecycleManager`] performs every mutating operation and is meant to be
//! owned by the single task worker. [`DeploymentQueries`] answers read-only
//! questions directly against the runtime.

mod manager;
mod queries;
mod teardown;

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

pub use manager::{LifecycleManager, ResyncReport, RotationOutcome};
pub use queries::{DeploymentQueries, DeploymentStats, DeploymentStatus};
pub use teardown::{RemovalReport, StepOutcome, StepReport, TeardownStep};

use crate::error::ValidationError;
use crate::tenant::{CredentialHash, ExternalPort, ImageRef, TenantName};

/// A validated request to provision a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateRequest {
    /// Tenant name.
    pub name: TenantName,
    /// Published host port.
    pub port: ExternalPort,
    /// Container image.
    pub image: ImageRef,
    /// Basic-auth password hash.
    pub credential_hash: CredentialHash,
}

/// A runtime control action on an existing deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Start the container.
    Start,
    /// Stop the container.
    Stop,
    /// Restart the container.
    Restart,
    /// Recreate the container from its compose definition.
    Recreate,
}

impl ActionKind {
    /// The action's wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Recreate => "recreate",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "restart" => Ok(Self::Restart),
            "recreate" => Ok(Self::Recreate),
            other => Err(ValidationError::UnknownAction {
                action: other.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests;
