//! Configuration system for podhost.
//!
//! This module provides the configuration structures and CLI definitions for the
//! podhost application. Configuration loading and precedence merging is handled
//! by the `ortho_config` crate: CLI flags override environment variables, which
//! override configuration files, which override defaults.
//!
//! The configuration file is expected at `~/.config/podhost/config.toml` by default.
//!
//! # Example Configuration
//!
//! ```toml
//! engine_socket = "unix:///var/run/docker.sock"
//! server_name = "node1"
//!
//! [tenants]
//! volumes_dir = "/srv/podhost/volumes"
//! compose_template = "/srv/podhost/docker-compose.yml"
//!
//! [limits]
//! cpu = "1.0"
//! memory = "512M"
//!
//! [network]
//! subnet_base = "192.168"
//! rate = "50mbit"
//!
//! [proxy]
//! fragment_dir = "/etc/caddy/conf.d"
//! domain = "hikka.host"
//! bypass_paths = ["/health"]
//! ```

mod cli;
mod loader;
mod types;

#[cfg(test)]
mod tests;

pub use cli::{
    ActionArgs, Cli, Commands, CreateArgs, ExecArgs, RotateCredentialArgs, TenantArgs,
};
pub use loader::{env_var_names, load_config};
pub use types::{
    AppConfig, DEFAULT_CREDENTIAL_HASH, LimitsConfig, NetworkConfig, ProxyConfig, TenantsConfig,
    ToolsConfig,
};
