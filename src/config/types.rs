//! Configuration data types for podhost.

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoResult, PostMergeContext, PostMergeHook};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

use crate::tenant::{CredentialHash, ImageRef};

/// The bcrypt hash applied when a create request carries no credential.
pub const DEFAULT_CREDENTIAL_HASH: &str =
    "$2b$12$nr213f0pJnQuCAdLnRTMeODqoniH1YH.Aqp6x2a9Wam01FtLdCB7O";

/// Tenant directory and deployment defaults.
#[derive(Debug, Clone, SmartDefault, Deserialize, Serialize)]
#[serde(default)]
pub struct TenantsConfig {
    /// Directory holding one subdirectory per tenant.
    #[default(Utf8PathBuf::from("volumes"))]
    pub volumes_dir: Utf8PathBuf,

    /// Compose file copied into each new tenant directory.
    #[default(Utf8PathBuf::from("docker-compose.yml"))]
    pub compose_template: Utf8PathBuf,

    /// Image used when a create request does not name one.
    #[default(String::from("vsecoder/hikka:latest"))]
    pub default_image: String,

    /// Credential hash used when a create request does not carry one.
    #[default(String::from(DEFAULT_CREDENTIAL_HASH))]
    pub default_credential_hash: String,
}

/// Per-container resource limits written to the tenant `.env` file.
#[derive(Debug, Clone, SmartDefault, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// CPU quota passed to compose as `CPU_LIMIT`.
    #[default(String::from("1.0"))]
    pub cpu: String,

    /// Memory limit passed to compose as `MEMORY_LIMIT`.
    #[default(String::from("512M"))]
    pub memory: String,

    /// Size of the container's tmpfs mount.
    #[default(String::from("3g"))]
    pub tmpfs_size: String,
}

/// Subnet leasing and bandwidth shaping.
#[derive(Debug, Clone, SmartDefault, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// The first two octets shared by every tenant subnet.
    #[default(String::from("192.168"))]
    pub subnet_base: String,

    /// Lowest third octet handed out.
    #[default(1)]
    pub first_prefix: u8,

    /// Highest third octet handed out.
    #[default(255)]
    pub last_prefix: u8,

    /// Host octet of the tenant container inside its subnet.
    #[default(101)]
    pub container_host_octet: u8,

    /// Rate used for both the firewall limit and the token bucket.
    #[default(String::from("50mbit"))]
    pub rate: String,

    /// Token bucket burst size.
    #[default(String::from("32kbit"))]
    pub burst: String,

    /// Token bucket latency.
    #[default(String::from("400ms"))]
    pub latency: String,

    /// Suffix compose appends to the tenant name for its network.
    #[default(String::from("tenant_net"))]
    pub network_suffix: String,
}

/// Reverse proxy fragment settings.
#[derive(Debug, Clone, SmartDefault, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Directory the proxy imports fragments from.
    #[default(Utf8PathBuf::from("/etc/caddy/conf.d"))]
    pub fragment_dir: Utf8PathBuf,

    /// Parent domain for tenant sites.
    #[default(String::from("hikka.host"))]
    pub domain: String,

    /// Port the tenant application listens on inside its container.
    #[default(8080)]
    pub upstream_port: u16,

    /// Command line that reloads the proxy after a fragment changes.
    #[default(vec![String::from("caddy"), String::from("reload")])]
    pub reload_command: Vec<String>,

    /// Paths served without authentication.
    pub bypass_paths: Vec<String>,
}

/// Host tool locations.
#[derive(Debug, Clone, SmartDefault, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Program and leading arguments for compose, e.g. `docker compose`.
    #[default(vec![String::from("docker"), String::from("compose")])]
    pub compose_command: Vec<String>,

    /// The `iptables` binary.
    #[default(String::from("iptables"))]
    pub iptables: String,

    /// The `tc` binary.
    #[default(String::from("tc"))]
    pub tc: String,
}

/// Root application configuration.
///
/// This structure is loaded from configuration files, environment variables,
/// and command-line arguments with layered precedence. The precedence order
/// (lowest to highest) is: defaults, configuration file, environment variables,
/// command-line arguments.
///
/// Configuration files are discovered in this order:
/// 1. Path specified via `PODHOST_CONFIG_PATH` environment variable
/// 2. `.podhost.toml` in the current working directory
/// 3. `.podhost.toml` in the home directory
/// 4. `~/.config/podhost/config.toml` (XDG default)
#[derive(Debug, Clone, SmartDefault, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(
    prefix = "PODHOST",
    post_merge_hook,
    discovery(
        app_name = "podhost",
        env_var = "PODHOST_CONFIG_PATH",
        config_file_name = "config.toml",
        dotfile_name = ".podhost.toml",
        config_cli_long = "config",
        config_cli_visible = true,
    )
)]
pub struct AppConfig {
    /// The container engine socket path or URL.
    pub engine_socket: Option<String>,

    /// Short name of this host, used in site names and fragment file names.
    #[default(String::from("local"))]
    pub server_name: String,

    /// Tenant directory configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub tenants: TenantsConfig,

    /// Container resource limits.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub limits: LimitsConfig,

    /// Subnet and shaping configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub network: NetworkConfig,

    /// Reverse proxy configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub proxy: ProxyConfig,

    /// Host tool configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub tools: ToolsConfig,
}

impl AppConfig {
    /// Checks cross-field constraints the type system cannot express.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending field.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.server_name.trim().is_empty() {
            return invalid("server_name", "cannot be empty");
        }
        if self.network.first_prefix == 0 {
            return invalid("network.first_prefix", "must be at least 1");
        }
        if self.network.first_prefix > self.network.last_prefix {
            return invalid("network.first_prefix", "must not exceed last_prefix");
        }
        if !is_two_octets(&self.network.subnet_base) {
            return invalid("network.subnet_base", "expected two dotted octets");
        }
        if matches!(self.network.container_host_octet, 0 | 255) {
            return invalid(
                "network.container_host_octet",
                "must be a usable host address",
            );
        }
        if self.tools.compose_command.is_empty() {
            return invalid("tools.compose_command", "cannot be empty");
        }
        if self.proxy.reload_command.is_empty() {
            return invalid("proxy.reload_command", "cannot be empty");
        }
        if let Err(error) = ImageRef::new(self.tenants.default_image.as_str()) {
            return invalid("tenants.default_image", &error.to_string());
        }
        if let Err(error) = CredentialHash::new(self.tenants.default_credential_hash.as_str()) {
            return invalid("tenants.default_credential_hash", &error.to_string());
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> crate::error::Result<()> {
    Err(crate::error::ConfigError::InvalidValue {
        field: String::from(field),
        reason: String::from(reason),
    }
    .into())
}

fn is_two_octets(value: &str) -> bool {
    let parts: Vec<&str> = value.split('.').collect();
    parts.len() == 2 && parts.iter().all(|part| part.parse::<u8>().is_ok())
}

impl PostMergeHook for AppConfig {
    fn post_merge(&mut self, _ctx: &PostMergeContext) -> OrthoResult<()> {
        self.server_name = self.server_name.trim().to_owned();
        self.proxy.domain = self.proxy.domain.trim_matches('.').to_owned();
        Ok(())
    }
}
