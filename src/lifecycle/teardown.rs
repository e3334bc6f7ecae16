//! Ordered, independently guarded teardown of a tenant.

use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use super::LifecycleManager;
use crate::engine::{ComposeAction, classify_runtime_error};
use crate::error::{ContainerError, HostError, LifecycleError};
use crate::network::SubnetPrefix;
use crate::tenant::{EnvFile, TenantName};
use crate::vhost::FragmentChange;

/// One teardown step, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownStep {
    /// Delete the proxy fragment.
    RetractVhost,
    /// Kill the container.
    KillContainer,
    /// `compose down -v` in the tenant directory.
    ComposeDown,
    /// Remove the tenant network, releasing its subnet.
    RemoveNetwork,
    /// Remove the bandwidth rules.
    ClearLimits,
    /// Delete the tenant directory.
    DeleteDirectory,
}

impl TeardownStep {
    /// Every step in execution order.
    pub const ALL: [Self; 6] = [
        Self::RetractVhost,
        Self::KillContainer,
        Self::ComposeDown,
        Self::RemoveNetwork,
        Self::ClearLimits,
        Self::DeleteDirectory,
    ];

    const fn label(self) -> &'static str {
        match self {
            Self::RetractVhost => "retract_vhost",
            Self::KillContainer => "kill_container",
            Self::ComposeDown => "compose_down",
            Self::RemoveNetwork => "remove_network",
            Self::ClearLimits => "clear_limits",
            Self::DeleteDirectory => "delete_directory",
        }
    }
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What one step found and did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "message")]
pub enum StepOutcome {
    /// The resource existed and was released.
    Done,
    /// The resource did not exist.
    NotFound,
    /// A best-effort step could not run; not counted as a failure.
    Skipped(String),
    /// The resource exists but could not be released.
    Failed(String),
}

/// A step and its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    /// The step.
    pub step: TeardownStep,
    /// Its outcome.
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

/// Per-step record of a teardown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovalReport {
    /// The tenant that was torn down.
    pub tenant: String,
    /// Whether any step found something to release.
    pub resources_found: bool,
    /// Every step in execution order.
    pub steps: Vec<StepReport>,
}

impl RemovalReport {
    fn new(tenant: &TenantName, steps: Vec<StepReport>) -> Self {
        let resources_found = steps
            .iter()
            .any(|report| matches!(report.outcome, StepOutcome::Done));
        Self {
            tenant: tenant.to_string(),
            resources_found,
            steps,
        }
    }

    /// `step: message` for every failed step.
    #[must_use]
    pub fn failures(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter_map(|report| match &report.outcome {
                StepOutcome::Failed(message) => Some(format!("{}: {message}", report.step)),
                StepOutcome::Done | StepOutcome::NotFound | StepOutcome::Skipped(_) => None,
            })
            .collect()
    }

    /// One-line summary, e.g. `retract_vhost=done, kill_container=not_found`.
    #[must_use]
    pub fn summary(&self) -> String {
        self.steps
            .iter()
            .map(|report| {
                let outcome = match &report.outcome {
                    StepOutcome::Done => String::from("done"),
                    StepOutcome::NotFound => String::from("not_found"),
                    StepOutcome::Skipped(reason) => format!("skipped ({reason})"),
                    StepOutcome::Failed(message) => format!("failed ({message})"),
                };
                format!("{}={outcome}", report.step)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl LifecycleManager {
    /// Release everything the tenant holds.
    ///
    /// Every step runs even when an earlier one failed. The `.env` file is
    /// read first for the subnet prefix and bridge name; without it the
    /// bridge name is derived from the tenant name and the firewall rule is
    /// left alone.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::RemovalFailed` listing each failed step.
    pub async fn remove(&self, name: &TenantName) -> Result<RemovalReport, HostError> {
        let env = self.store.read_env(name).await;
        let prefix = env.as_ref().and_then(EnvFile::subnet_prefix);
        let bridge = env
            .as_ref()
            .and_then(EnvFile::bridge_name)
            .map_or_else(|| name.bridge_name(), str::to_owned);

        let report = self.teardown(name, prefix, &bridge).await;
        let failures = report.failures();
        if !failures.is_empty() {
            warn!(tenant = %name, summary = %report.summary(), "removal incomplete");
            return Err(LifecycleError::RemovalFailed {
                tenant: name.to_string(),
                failures,
            }
            .into());
        }
        info!(
            tenant = %name,
            resources_found = report.resources_found,
            "deployment removed"
        );
        Ok(report)
    }

    pub(super) async fn teardown(
        &self,
        name: &TenantName,
        prefix: Option<SubnetPrefix>,
        bridge: &str,
    ) -> RemovalReport {
        let mut steps = Vec::with_capacity(TeardownStep::ALL.len());
        for step in TeardownStep::ALL {
            let outcome = self.run_step(step, name, prefix, bridge).await;
            if let StepOutcome::Failed(message) = &outcome {
                warn!(tenant = %name, %step, %message, "teardown step failed");
            }
            steps.push(StepReport { step, outcome });
        }
        RemovalReport::new(name, steps)
    }

    async fn run_step(
        &self,
        step: TeardownStep,
        name: &TenantName,
        prefix: Option<SubnetPrefix>,
        bridge: &str,
    ) -> StepOutcome {
        match step {
            TeardownStep::RetractVhost => match self.vhosts.retract(name).await {
                Ok(outcome) if outcome.change == FragmentChange::Removed => StepOutcome::Done,
                Ok(_) => StepOutcome::NotFound,
                Err(error) => StepOutcome::Failed(error.to_string()),
            },
            TeardownStep::KillContainer => {
                match self.runtime.kill_container(name.as_str()).await {
                    Ok(()) => StepOutcome::Done,
                    Err(error) => match classify_runtime_error("kill", name.as_str(), &error) {
                        ContainerError::NotFound { .. } => StepOutcome::NotFound,
                        other => StepOutcome::Skipped(other.to_string()),
                    },
                }
            }
            TeardownStep::ComposeDown => match self.store.exists(name).await {
                Ok(false) => StepOutcome::NotFound,
                Ok(true) => match self
                    .compose
                    .run(&self.store.project(name), ComposeAction::Down)
                    .await
                {
                    Ok(()) => StepOutcome::Done,
                    Err(error) => StepOutcome::Failed(error.to_string()),
                },
                Err(error) => StepOutcome::Failed(error.to_string()),
            },
            TeardownStep::RemoveNetwork => {
                let network = self.store.project(name).network_name(&self.network_suffix);
                match self.runtime.remove_network(&network).await {
                    Ok(()) => StepOutcome::Done,
                    Err(error) => match classify_runtime_error("remove network", &network, &error)
                    {
                        ContainerError::NotFound { .. } => StepOutcome::NotFound,
                        other => StepOutcome::Failed(other.to_string()),
                    },
                }
            }
            TeardownStep::ClearLimits => {
                let report = self.limiter.clear(prefix, bridge).await;
                let failures = report.failures();
                if failures.is_empty() {
                    if report.removed_anything() {
                        StepOutcome::Done
                    } else {
                        StepOutcome::NotFound
                    }
                } else {
                    StepOutcome::Failed(failures.join("; "))
                }
            }
            TeardownStep::DeleteDirectory => match self.store.remove(name).await {
                Ok(true) => StepOutcome::Done,
                Ok(false) => StepOutcome::NotFound,
                Err(error) => StepOutcome::Failed(error.to_string()),
            },
        }
    }
}
