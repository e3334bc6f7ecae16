//! Tenant network isolation: subnet leasing and bandwidth limits.

mod allocator;
mod limiter;
mod subnet;

pub use allocator::NetworkAllocator;
pub use limiter::{LimitReport, NetworkLimiter, RuleOutcome};
pub use subnet::{SubnetPrefix, SubnetRange};
