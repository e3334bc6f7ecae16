//! Shared fixtures and helper functions for config tests.

use crate::config::AppConfig;
use ortho_config::MergeComposer;
use rstest::fixture;
use std::sync::Arc;

/// Fixture providing an `AppConfig` parsed from a full TOML example.
#[fixture]
pub fn app_config_from_full_toml() -> AppConfig {
    let toml = r#"
        engine_socket = "unix:///var/run/docker.sock"
        server_name = "node1"

        [tenants]
        volumes_dir = "/srv/podhost/volumes"
        compose_template = "/srv/podhost/docker-compose.yml"
        default_image = "ghcr.io/example/userbot:stable"

        [limits]
        cpu = "0.5"
        memory = "256M"
        tmpfs_size = "1g"

        [network]
        subnet_base = "10.20"
        first_prefix = 10
        last_prefix = 20
        rate = "10mbit"

        [proxy]
        fragment_dir = "/tmp/conf.d"
        domain = "example.net"
        upstream_port = 9000
        bypass_paths = ["/health", "/static/*"]

        [tools]
        compose_command = ["podman", "compose"]
    "#;

    toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Fixture providing an `AppConfig` parsed from a minimal TOML example.
#[fixture]
pub fn app_config_from_partial_toml() -> AppConfig {
    let toml = r#"
        server_name = "edge"
    "#;

    toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Helper: Creates a `MergeComposer` with defaults layer already pushed.
pub fn create_composer_with_defaults() -> Result<MergeComposer, serde_json::Error> {
    let mut composer = MergeComposer::new();
    let defaults = ortho_config::serde_json::to_value(AppConfig::default())?;
    composer.push_defaults(defaults);
    Ok(composer)
}

/// Helper: Merges layers from a composer into `AppConfig`.
pub fn merge_config(composer: MergeComposer) -> Result<AppConfig, Arc<ortho_config::OrthoError>> {
    AppConfig::merge_from_layers(composer.layers())
}

/// Helper: Asserts that a config has all default values.
pub fn assert_config_has_defaults(config: &AppConfig) {
    assert!(
        config.engine_socket.is_none(),
        "engine_socket should be None"
    );
    assert_eq!(config.server_name, "local");
    assert_eq!(config.tenants.volumes_dir.as_str(), "volumes");
    assert_eq!(config.tenants.default_image, "vsecoder/hikka:latest");
    assert_eq!(config.limits.memory, "512M");
    assert_eq!(config.network.subnet_base, "192.168");
    assert_eq!(
        (config.network.first_prefix, config.network.last_prefix),
        (1, 255)
    );
    assert_eq!(config.network.container_host_octet, 101);
    assert_eq!(config.proxy.fragment_dir.as_str(), "/etc/caddy/conf.d");
    assert_eq!(config.proxy.reload_command, vec!["caddy", "reload"]);
    assert_eq!(config.tools.compose_command, vec!["docker", "compose"]);
}

/// Helper: Creates a `MergeComposer` with defaults, file, and env layers for
/// testing layer precedence.
pub fn create_composer_with_file_and_env() -> Result<MergeComposer, serde_json::Error> {
    use ortho_config::serde_json::json;

    let mut composer = create_composer_with_defaults()?;

    composer.push_file(
        json!({
            "engine_socket": "unix:///from/file.sock",
            "server_name": "file-node"
        }),
        None,
    );

    composer.push_environment(json!({
        "engine_socket": "unix:///from/env.sock"
    }));

    Ok(composer)
}
