//! Per-tenant bandwidth limits built from `iptables` and `tc`.
//!
//! Two rules are installed per tenant: an egress packet-rate limit matching
//! the container address, and a token bucket qdisc on the tenant bridge.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use super::SubnetPrefix;
use crate::command::{CommandOutput, CommandRunner, CommandSpec};
use crate::config::{NetworkConfig, ToolsConfig};

/// `tc` stderr fragments meaning the qdisc or device is already gone.
const ABSENT_QDISC_MARKERS: &[&str] = &[
    "No such file or directory",
    "Cannot find device",
    "handle of zero",
];

/// What happened to one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "message")]
pub enum RuleOutcome {
    /// The rule was installed.
    Applied,
    /// The rule was present and has been removed.
    Removed,
    /// There was nothing to remove.
    Absent,
    /// The tool rejected the change.
    Failed(String),
}

impl RuleOutcome {
    /// The failure message, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        match self {
            Self::Failed(message) => Some(message),
            Self::Applied | Self::Removed | Self::Absent => None,
        }
    }
}

/// Outcome of applying or clearing both rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LimitReport {
    /// The `iptables` rate-limit rule.
    pub firewall: RuleOutcome,
    /// The `tc` token bucket.
    pub shaping: RuleOutcome,
}

impl LimitReport {
    /// `rule: message` for each failed rule.
    #[must_use]
    pub fn failures(&self) -> Vec<String> {
        [("firewall", &self.firewall), ("shaping", &self.shaping)]
            .into_iter()
            .filter_map(|(rule, outcome)| outcome.failure().map(|m| format!("{rule}: {m}")))
            .collect()
    }

    /// Whether either rule had been present before a clear.
    #[must_use]
    pub fn removed_anything(&self) -> bool {
        self.firewall == RuleOutcome::Removed || self.shaping == RuleOutcome::Removed
    }
}

#[derive(Debug, Clone, Copy)]
enum FirewallOp {
    Append,
    Check,
    Delete,
}

impl FirewallOp {
    const fn flag(self) -> &'static str {
        match self {
            Self::Append => "-A",
            Self::Check => "-C",
            Self::Delete => "-D",
        }
    }
}

/// Installs and removes tenant bandwidth rules through a [`CommandRunner`].
#[derive(Clone)]
pub struct NetworkLimiter {
    runner: Arc<dyn CommandRunner>,
    iptables: String,
    tc: String,
    rate: String,
    burst: String,
    latency: String,
    host_octet: u8,
}

impl fmt::Debug for NetworkLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkLimiter")
            .field("iptables", &self.iptables)
            .field("tc", &self.tc)
            .field("rate", &self.rate)
            .finish_non_exhaustive()
    }
}

impl NetworkLimiter {
    /// A limiter using the configured tools and shaping values.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>, tools: &ToolsConfig, network: &NetworkConfig) -> Self {
        Self {
            runner,
            iptables: tools.iptables.clone(),
            tc: tools.tc.clone(),
            rate: network.rate.clone(),
            burst: network.burst.clone(),
            latency: network.latency.clone(),
            host_octet: network.container_host_octet,
        }
    }

    fn firewall(&self, op: FirewallOp, prefix: SubnetPrefix) -> CommandSpec {
        CommandSpec::new(&self.iptables)
            .args([op.flag(), "OUTPUT", "-s"])
            .arg(prefix.container_address(self.host_octet))
            .args(["-m", "limit", "--limit", self.rate.as_str(), "-j", "ACCEPT"])
    }

    fn qdisc_add(&self, bridge: &str) -> CommandSpec {
        CommandSpec::new(&self.tc)
            .args(["qdisc", "add", "dev", bridge, "root", "tbf"])
            .args([
                "rate",
                self.rate.as_str(),
                "burst",
                self.burst.as_str(),
                "latency",
                self.latency.as_str(),
            ])
    }

    fn qdisc_del(&self, bridge: &str) -> CommandSpec {
        CommandSpec::new(&self.tc).args(["qdisc", "del", "dev", bridge, "root"])
    }

    /// Install both rules.
    ///
    /// A firewall rule left behind by an earlier tenant on the same prefix is
    /// reused rather than duplicated. Failures are logged and reported, never
    /// raised: a tenant without limits is still usable.
    pub async fn apply(&self, prefix: SubnetPrefix, bridge: &str) -> LimitReport {
        let firewall = if self.firewall_rule_present(prefix).await {
            debug!(%prefix, "firewall rule already present");
            RuleOutcome::Applied
        } else {
            match self.run(self.firewall(FirewallOp::Append, prefix)).await {
                Ok(_) => RuleOutcome::Applied,
                Err(message) => RuleOutcome::Failed(message),
            }
        };
        let shaping = match self.run(self.qdisc_add(bridge)).await {
            Ok(_) => RuleOutcome::Applied,
            Err(message) => RuleOutcome::Failed(message),
        };
        let report = LimitReport { firewall, shaping };
        for failure in report.failures() {
            warn!(%prefix, bridge, %failure, "bandwidth limit not applied");
        }
        report
    }

    /// Remove both rules; rules that are already gone count as `Absent`.
    ///
    /// Without a known prefix the firewall rule cannot be addressed and is
    /// reported as `Absent`.
    pub async fn clear(&self, prefix: Option<SubnetPrefix>, bridge: &str) -> LimitReport {
        let firewall = match prefix {
            Some(leased) => self.clear_firewall(leased).await,
            None => RuleOutcome::Absent,
        };
        let shaping = self.clear_shaping(bridge).await;
        debug!(bridge, ?firewall, ?shaping, "bandwidth limits cleared");
        LimitReport { firewall, shaping }
    }

    async fn firewall_rule_present(&self, prefix: SubnetPrefix) -> bool {
        self.runner
            .run(self.firewall(FirewallOp::Check, prefix))
            .await
            .is_ok_and(|output| output.succeeded())
    }

    async fn clear_firewall(&self, prefix: SubnetPrefix) -> RuleOutcome {
        match self.runner.run(self.firewall(FirewallOp::Check, prefix)).await {
            Ok(output) if output.succeeded() => {}
            Ok(_) => return RuleOutcome::Absent,
            Err(error) => return RuleOutcome::Failed(error.to_string()),
        }
        match self.run(self.firewall(FirewallOp::Delete, prefix)).await {
            Ok(_) => RuleOutcome::Removed,
            Err(message) => RuleOutcome::Failed(message),
        }
    }

    async fn clear_shaping(&self, bridge: &str) -> RuleOutcome {
        match self.runner.run(self.qdisc_del(bridge)).await {
            Ok(output) if !output.succeeded() && is_absent_qdisc(&output) => RuleOutcome::Absent,
            Ok(output) => match output.into_checked(&self.tc) {
                Ok(_) => RuleOutcome::Removed,
                Err(error) => RuleOutcome::Failed(error.to_string()),
            },
            Err(error) => RuleOutcome::Failed(error.to_string()),
        }
    }

    async fn run(&self, spec: CommandSpec) -> Result<CommandOutput, String> {
        let program = String::from(spec.program());
        self.runner
            .run(spec)
            .await
            .and_then(|output| output.into_checked(&program))
            .map_err(|error| error.to_string())
    }
}

fn is_absent_qdisc(output: &CommandOutput) -> bool {
    let text = output.combined();
    ABSENT_QDISC_MARKERS
        .iter()
        .any(|marker| text.contains(marker))
}
