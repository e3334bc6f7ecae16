//! The per-tenant `.env` file compose reads its variables from.

use std::collections::BTreeMap;

use super::ImageRef;
use crate::network::SubnetPrefix;

/// Values written to a new tenant's `.env` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantEnv {
    /// Container image reference.
    pub image: ImageRef,
    /// Container name; always the tenant name.
    pub container_name: String,
    /// Published host port.
    pub external_port: u16,
    /// CPU quota.
    pub cpu_limit: String,
    /// Memory limit.
    pub memory_limit: String,
    /// Leased subnet prefix.
    pub ip_prefix: SubnetPrefix,
    /// Size of the tmpfs mount.
    pub tmpfs_size: String,
    /// Host bridge interface name.
    pub bridge_name: String,
}

impl TenantEnv {
    /// Render as `KEY=value` lines.
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "IMAGE={}\nCONTAINER_NAME={}\nEXTERNAL_PORT={}\nCPU_LIMIT={}\n\
             MEMORY_LIMIT={}\nIP_PREFIX={}\nTMPFS_SIZE={}\nBRIDGE_NAME={}\n",
            self.image,
            self.container_name,
            self.external_port,
            self.cpu_limit,
            self.memory_limit,
            self.ip_prefix,
            self.tmpfs_size,
            self.bridge_name,
        )
    }
}

/// A parsed `.env` file.
///
/// Parsing never fails: blank lines, comments and lines without `=` are
/// skipped, so a damaged file yields whatever keys are still readable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFile {
    entries: BTreeMap<String, String>,
}

impl EnvFile {
    /// Parse `KEY=value` lines.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.trim().to_owned(), value.trim().to_owned()))
            .filter(|(key, _)| !key.is_empty())
            .collect();
        Self { entries }
    }

    /// The raw value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// The leased prefix, if present and well formed.
    #[must_use]
    pub fn subnet_prefix(&self) -> Option<SubnetPrefix> {
        self.get("IP_PREFIX")?.parse().ok()
    }

    /// The recorded bridge name, if present and non-empty.
    #[must_use]
    pub fn bridge_name(&self) -> Option<&str> {
        self.get("BRIDGE_NAME").filter(|name| !name.is_empty())
    }
}
