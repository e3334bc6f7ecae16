//! Reverse-proxy virtual hosts for tenant sites.

mod fragment;
mod synchronizer;

pub use fragment::{Credential, Fragment, Revision};
pub use synchronizer::{FragmentChange, ReloadStatus, VhostOutcome, VhostSynchronizer};
