//! First-fit subnet leasing against the runtime's live network list.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use super::{SubnetPrefix, SubnetRange};
use crate::engine::ContainerRuntime;
use crate::error::{HostError, NetworkError};

/// Leases unused subnet prefixes.
///
/// There is no lease table: a prefix is taken exactly when some runtime
/// network has a subnet inside it, and it is released by removing that
/// network. `allocate` takes `&mut self` so the single owner serializes
/// the check-then-use window.
pub struct NetworkAllocator {
    runtime: Arc<dyn ContainerRuntime>,
    range: SubnetRange,
}

impl NetworkAllocator {
    /// An allocator scanning `range` against `runtime`'s networks.
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>, range: SubnetRange) -> Self {
        Self { runtime, range }
    }

    /// The range candidates are drawn from.
    #[must_use]
    pub const fn range(&self) -> SubnetRange {
        self.range
    }

    /// Lease the lowest free prefix in the range.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::ListFailed` if the runtime cannot list networks
    /// and `NetworkError::ResourceExhausted` if every candidate is taken.
    pub async fn allocate(&mut self) -> Result<SubnetPrefix, HostError> {
        let leased = self.leased().await?;
        let prefix = self
            .range
            .candidates()
            .find(|candidate| !leased.contains(candidate))
            .ok_or_else(|| self.range.exhausted())?;
        debug!(%prefix, in_use = leased.len(), "leased subnet prefix");
        Ok(prefix)
    }

    /// Whether `prefix` is currently bound to a runtime network.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::ListFailed` if the runtime cannot list networks.
    pub async fn is_leased(&self, prefix: SubnetPrefix) -> Result<bool, HostError> {
        Ok(self.leased().await?.contains(&prefix))
    }

    async fn leased(&self) -> Result<BTreeSet<SubnetPrefix>, HostError> {
        let subnets = self
            .runtime
            .network_subnets()
            .await
            .map_err(|error| NetworkError::ListFailed {
                message: error.to_string(),
            })?;
        Ok(subnets
            .iter()
            .filter_map(|cidr| prefix_of(cidr))
            .filter(|prefix| self.range.contains(*prefix))
            .collect())
    }
}

/// The /24 prefix of an IPv4 CIDR such as `192.168.3.0/24`.
fn prefix_of(cidr: &str) -> Option<SubnetPrefix> {
    let address = cidr.split_once('/').map_or(cidr, |(address, _)| address);
    address.parse().ok()
}
