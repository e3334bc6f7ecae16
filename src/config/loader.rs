//! Configuration loading with layered precedence.
//!
//! This module loads configuration with the precedence order (lowest to
//! highest): application defaults, configuration file, environment variables,
//! command-line arguments.
//!
//! Layers are composed manually with `MergeComposer` rather than through the
//! derived `load()`, because the `Cli` struct owns subcommand dispatch and the
//! environment layer here fails fast on unparseable typed values instead of
//! ignoring them.
//!
//! # Environment Variable Handling
//!
//! String fields (e.g., `PODHOST_SERVER_NAME`) are always accepted. Numeric
//! fields (`PODHOST_NETWORK_FIRST_PREFIX`, `PODHOST_PROXY_UPSTREAM_PORT`) must
//! parse into their target width. List fields (`PODHOST_TOOLS_COMPOSE_COMMAND`)
//! are split on whitespace.

use camino::Utf8PathBuf;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use ortho_config::discovery::ConfigDiscovery;
use ortho_config::serde_json::{self, Map, Value};
use ortho_config::{MergeComposer, toml};

use crate::config::{AppConfig, Cli};
use crate::error::{ConfigError, Result};

/// The type of value expected from an environment variable.
#[derive(Clone, Copy)]
enum EnvVarType {
    /// String value (always accepted).
    String,
    /// Unsigned 8-bit integer, used for subnet octets.
    U8,
    /// Unsigned 16-bit integer, used for ports.
    U16,
    /// Whitespace-separated list of words.
    List,
}

/// Specification for a single environment variable mapping.
struct EnvVarSpec {
    /// The environment variable name (e.g., `PODHOST_ENGINE_SOCKET`).
    env_var: &'static str,
    /// The JSON path segments (e.g., `["network", "rate"]`).
    path: &'static [&'static str],
    /// The expected value type.
    var_type: EnvVarType,
}

const fn spec(
    env_var: &'static str,
    path: &'static [&'static str],
    var_type: EnvVarType,
) -> EnvVarSpec {
    EnvVarSpec {
        env_var,
        path,
        var_type,
    }
}

/// Table of all environment variables and their JSON paths.
const ENV_VAR_SPECS: &[EnvVarSpec] = &[
    spec("PODHOST_ENGINE_SOCKET", &["engine_socket"], EnvVarType::String),
    spec("PODHOST_SERVER_NAME", &["server_name"], EnvVarType::String),
    // Tenants
    spec(
        "PODHOST_TENANTS_VOLUMES_DIR",
        &["tenants", "volumes_dir"],
        EnvVarType::String,
    ),
    spec(
        "PODHOST_TENANTS_COMPOSE_TEMPLATE",
        &["tenants", "compose_template"],
        EnvVarType::String,
    ),
    spec(
        "PODHOST_TENANTS_DEFAULT_IMAGE",
        &["tenants", "default_image"],
        EnvVarType::String,
    ),
    spec(
        "PODHOST_TENANTS_DEFAULT_CREDENTIAL_HASH",
        &["tenants", "default_credential_hash"],
        EnvVarType::String,
    ),
    // Limits
    spec("PODHOST_LIMITS_CPU", &["limits", "cpu"], EnvVarType::String),
    spec(
        "PODHOST_LIMITS_MEMORY",
        &["limits", "memory"],
        EnvVarType::String,
    ),
    spec(
        "PODHOST_LIMITS_TMPFS_SIZE",
        &["limits", "tmpfs_size"],
        EnvVarType::String,
    ),
    // Network
    spec(
        "PODHOST_NETWORK_SUBNET_BASE",
        &["network", "subnet_base"],
        EnvVarType::String,
    ),
    spec(
        "PODHOST_NETWORK_FIRST_PREFIX",
        &["network", "first_prefix"],
        EnvVarType::U8,
    ),
    spec(
        "PODHOST_NETWORK_LAST_PREFIX",
        &["network", "last_prefix"],
        EnvVarType::U8,
    ),
    spec(
        "PODHOST_NETWORK_CONTAINER_HOST_OCTET",
        &["network", "container_host_octet"],
        EnvVarType::U8,
    ),
    spec("PODHOST_NETWORK_RATE", &["network", "rate"], EnvVarType::String),
    spec(
        "PODHOST_NETWORK_BURST",
        &["network", "burst"],
        EnvVarType::String,
    ),
    spec(
        "PODHOST_NETWORK_LATENCY",
        &["network", "latency"],
        EnvVarType::String,
    ),
    spec(
        "PODHOST_NETWORK_NETWORK_SUFFIX",
        &["network", "network_suffix"],
        EnvVarType::String,
    ),
    // Proxy
    spec(
        "PODHOST_PROXY_FRAGMENT_DIR",
        &["proxy", "fragment_dir"],
        EnvVarType::String,
    ),
    spec("PODHOST_PROXY_DOMAIN", &["proxy", "domain"], EnvVarType::String),
    spec(
        "PODHOST_PROXY_UPSTREAM_PORT",
        &["proxy", "upstream_port"],
        EnvVarType::U16,
    ),
    spec(
        "PODHOST_PROXY_RELOAD_COMMAND",
        &["proxy", "reload_command"],
        EnvVarType::List,
    ),
    spec(
        "PODHOST_PROXY_BYPASS_PATHS",
        &["proxy", "bypass_paths"],
        EnvVarType::List,
    ),
    // Tools
    spec(
        "PODHOST_TOOLS_COMPOSE_COMMAND",
        &["tools", "compose_command"],
        EnvVarType::List,
    ),
    spec(
        "PODHOST_TOOLS_IPTABLES",
        &["tools", "iptables"],
        EnvVarType::String,
    ),
    spec("PODHOST_TOOLS_TC", &["tools", "tc"], EnvVarType::String),
];

/// Returns the list of environment variable names recognised by the config loader.
///
/// Tests use this to clear every `PODHOST_*` variable without keeping a
/// second hard-coded list in sync.
#[must_use]
pub fn env_var_names() -> Vec<&'static str> {
    ENV_VAR_SPECS.iter().map(|entry| entry.env_var).collect()
}

/// Load a configuration file and push it to the composer.
fn load_config_file(path: &Utf8PathBuf, composer: &mut MergeComposer) -> Result<()> {
    let current_dir = Utf8PathBuf::from(".");
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| current_dir.as_ref());
    let file_name = path.file_name().unwrap_or(path.as_str());

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|e| {
        ConfigError::ParseError {
            message: format!("failed to open directory {parent}: {e}"),
        }
    })?;

    let content = dir
        .read_to_string(file_name)
        .map_err(|e| ConfigError::ParseError {
            message: format!("failed to read {path}: {e}"),
        })?;

    let value =
        toml::from_str::<serde_json::Value>(&content).map_err(|e| ConfigError::ParseError {
            message: format!("failed to parse {path}: {e}"),
        })?;

    composer.push_file(value, Some(path.clone()));
    Ok(())
}

/// Load configuration with full layer precedence.
///
/// Sources, later overriding earlier:
/// 1. Application defaults defined in the struct
/// 2. Configuration file (`--config`, `PODHOST_CONFIG_PATH`, `.podhost.toml`,
///    or `~/.config/podhost/config.toml`)
/// 3. Environment variables prefixed with `PODHOST_`
/// 4. Command-line arguments (from the provided `Cli`)
///
/// The merged result is validated before it is returned.
///
/// # Errors
///
/// Returns `ConfigError` if a configuration file is malformed, a typed
/// environment variable cannot be parsed, or the merged values fail
/// [`AppConfig::validate`].
pub fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut composer = MergeComposer::new();

    let defaults =
        serde_json::to_value(AppConfig::default()).map_err(|e| ConfigError::ParseError {
            message: format!("failed to serialise defaults: {e}"),
        })?;
    composer.push_defaults(defaults);

    let config_path: Option<Utf8PathBuf> =
        cli.config.clone().filter(|p| p.exists()).or_else(|| {
            let discovery = ConfigDiscovery::builder("podhost")
                .env_var("PODHOST_CONFIG_PATH")
                .config_file_name("config.toml")
                .dotfile_name(".podhost.toml")
                .build();
            discovery
                .candidates()
                .into_iter()
                .filter(|p| p.exists())
                .find_map(|p| Utf8PathBuf::try_from(p).ok())
        });

    if let Some(ref path) = config_path {
        load_config_file(path, &mut composer)?;
    }

    let env_values = collect_env_vars()?;
    if !env_values.is_null() {
        composer.push_environment(env_values);
    }

    let cli_overrides = build_cli_overrides(cli);
    if !cli_overrides.is_null() {
        composer.push_cli(cli_overrides);
    }

    let config =
        AppConfig::merge_from_layers(composer.layers()).map_err(ConfigError::OrthoConfig)?;
    config.validate()?;

    Ok(config)
}

/// Collect environment variables with the `PODHOST_` prefix into a JSON value.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if a numeric variable does not parse.
fn collect_env_vars() -> Result<Value> {
    let mut root = Map::new();

    for entry in ENV_VAR_SPECS {
        let Ok(raw_value) = std::env::var(entry.env_var) else {
            continue;
        };
        let json_value = parse_env_value(entry, &raw_value)?;
        insert_at_path(&mut root, entry.path, json_value);
    }

    if root.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::Object(root))
    }
}

fn parse_env_value(entry: &EnvVarSpec, raw_value: &str) -> Result<Value> {
    let numeric = |parsed: Option<u64>, expected: &str| {
        parsed.map(|n| Value::Number(n.into())).ok_or_else(|| {
            ConfigError::InvalidValue {
                field: entry.env_var.to_owned(),
                reason: format!("expected {expected}, got '{raw_value}'"),
            }
        })
    };

    let value = match entry.var_type {
        EnvVarType::String => Value::String(raw_value.to_owned()),
        EnvVarType::U8 => numeric(
            raw_value.trim().parse::<u8>().ok().map(u64::from),
            "integer in 0-255",
        )?,
        EnvVarType::U16 => numeric(
            raw_value.trim().parse::<u16>().ok().map(u64::from),
            "integer in 0-65535",
        )?,
        EnvVarType::List => Value::Array(
            raw_value
                .split_whitespace()
                .map(|word| Value::String(word.to_owned()))
                .collect(),
        ),
    };
    Ok(value)
}

/// Insert a value at a nested path in a JSON map, creating intermediate
/// objects as needed.
fn insert_at_path(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((&field, parents)) = path.split_last() else {
        return;
    };

    let mut current = root;
    for &segment in parents {
        let entry = current
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(obj) = entry.as_object_mut() else {
            return;
        };
        current = obj;
    }

    current.insert(field.to_owned(), value);
}

/// Build a JSON value containing CLI overrides.
fn build_cli_overrides(cli: &Cli) -> Value {
    let mut overrides = Map::new();

    if let Some(ref socket) = cli.engine_socket {
        overrides.insert("engine_socket".to_owned(), Value::String(socket.clone()));
    }

    if let Some(ref server) = cli.server_name {
        overrides.insert("server_name".to_owned(), Value::String(server.clone()));
    }

    if overrides.is_empty() {
        Value::Null
    } else {
        Value::Object(overrides)
    }
}
