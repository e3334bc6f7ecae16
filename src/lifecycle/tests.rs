//! Unit tests for lifecycle operations against a mocked runtime.

use std::sync::Arc;

use bollard::models::{ContainerInspectResponse, ContainerState};
use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::command::fake::RecordingRunner;
use crate::command::{CommandOutput, CommandSpec};
use crate::config::AppConfig;
use crate::engine::ContainerSummary;
use crate::engine::mock::{MockRuntime, not_found};
use crate::error::{ContainerError, HostError, LifecycleError, ValidationError};
use crate::tenant::{CredentialHash, ExternalPort, ImageRef, TenantName};

type RuntimeFixture = std::io::Result<tokio::runtime::Runtime>;

const REQUEST_HASH: &str = "$2b$12$reqreqreqreqreqreqreqreqreqreqreqreqreqreqreqreqreqre";
const STALE_HASH: &str = "$2b$12$stalestalestalestalestalestalestalestalestalestalesta";

#[fixture]
fn runtime() -> RuntimeFixture {
    tokio::runtime::Runtime::new()
}

struct Workspace {
    _temp: TempDir,
    base: Utf8PathBuf,
    config: AppConfig,
}

#[fixture]
fn workspace() -> Workspace {
    let temp = TempDir::new().expect("temp dir should be created");
    let base =
        Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("temp path should be UTF-8");
    let template = base.join("docker-compose.yml");
    std::fs::write(&template, "services: {}\n").expect("template should be written");
    let mut config = AppConfig::default();
    config.tenants.volumes_dir = base.join("volumes");
    config.tenants.compose_template = template;
    config.proxy.fragment_dir = base.join("conf.d");
    Workspace {
        _temp: temp,
        base,
        config,
    }
}

fn alpha() -> TenantName {
    TenantName::new("alpha").expect("name should be valid")
}

fn inspect_with(running: bool) -> ContainerInspectResponse {
    ContainerInspectResponse {
        state: Some(ContainerState {
            running: Some(running),
            ..ContainerState::default()
        }),
        ..ContainerInspectResponse::default()
    }
}

/// Answers like a host where no tenant rules exist and compose succeeds.
fn clean_host_reply(spec: &CommandSpec) -> Result<CommandOutput, crate::error::CommandError> {
    match spec.program() {
        "tc" if spec.arguments().get(1).is_some_and(|op| op == "del") => Ok(
            CommandOutput::failure(2, "Cannot find device \"br-alpha\""),
        ),
        "iptables" if spec.arguments().first().is_some_and(|op| op == "-C") => {
            Ok(CommandOutput::failure(1, "iptables: Bad rule"))
        }
        _ => Ok(CommandOutput::success("")),
    }
}

fn request() -> CreateRequest {
    CreateRequest {
        name: alpha(),
        port: ExternalPort::new(8080).expect("port should be valid"),
        image: ImageRef::new("vsecoder/hikka:latest").expect("image should be valid"),
        credential_hash: CredentialHash::new(REQUEST_HASH).expect("hash should be bcrypt"),
    }
}

fn manager(engine: MockRuntime, runner: &RecordingRunner, config: &AppConfig) -> LifecycleManager {
    LifecycleManager::new(Arc::new(engine), Arc::new(runner.clone()), config)
        .expect("manager should build")
}

#[rstest]
#[case("start", ActionKind::Start)]
#[case("stop", ActionKind::Stop)]
#[case(" restart ", ActionKind::Restart)]
#[case("recreate", ActionKind::Recreate)]
fn action_kinds_parse(#[case] raw: &str, #[case] expected: ActionKind) {
    assert_eq!(raw.parse::<ActionKind>().expect("should parse"), expected);
}

#[rstest]
fn unknown_action_is_a_validation_error() {
    assert!(matches!(
        "reboot".parse::<ActionKind>(),
        Err(ValidationError::UnknownAction { action }) if action == "reboot"
    ));
}

#[rstest]
fn create_writes_directory_and_fragment(runtime: RuntimeFixture, workspace: Workspace) {
    let rt = runtime.expect("runtime should start");
    let mut engine = MockRuntime::new();
    engine.expect_network_subnets().returning(|| {
        Box::pin(async { Ok(vec![String::from("192.168.1.0/24")]) })
    });
    let runner = RecordingRunner::with_responder(clean_host_reply);
    let mut lifecycle = manager(engine, &runner, &workspace.config);

    rt.block_on(lifecycle.create(&request()))
        .expect("create should succeed");

    let env = std::fs::read_to_string(workspace.base.join("volumes/alpha/.env"))
        .expect("env file should exist");
    assert!(env.contains("IP_PREFIX=192.168.2\n"));
    assert!(env.contains("BRIDGE_NAME=br-alpha\n"));
    let fragment = std::fs::read_to_string(workspace.base.join("conf.d/alpha.local.caddy"))
        .expect("fragment should exist");
    assert!(fragment.contains("reverse_proxy 192.168.2.101:8080"));

    let lines = runner.command_lines();
    let position = |needle: &str| lines.iter().position(|line| line.contains(needle));
    assert!(position(" build").is_some_and(|build| position(" up -d") > Some(build)));
    assert!(lines.iter().any(|line| line.starts_with("iptables -A OUTPUT -s 192.168.2.101")));
    assert!(lines.iter().any(|line| line == "caddy reload"));
}

fn subnet_one_taken() -> MockRuntime {
    let mut engine = MockRuntime::new();
    engine.expect_network_subnets().returning(|| {
        Box::pin(async { Ok(vec![String::from("192.168.1.0/24")]) })
    });
    engine
}

#[rstest]
fn create_succeeds_when_limits_fail(runtime: RuntimeFixture, workspace: Workspace) {
    let rt = runtime.expect("runtime should start");
    let runner = RecordingRunner::with_responder(|spec| {
        if spec.program() == "tc" {
            Ok(CommandOutput::failure(
                2,
                "RTNETLINK answers: Operation not permitted",
            ))
        } else {
            clean_host_reply(spec)
        }
    });
    let mut lifecycle = manager(subnet_one_taken(), &runner, &workspace.config);

    rt.block_on(lifecycle.create(&request()))
        .expect("create should succeed without shaping");

    let fragment = std::fs::read_to_string(workspace.base.join("conf.d/alpha.local.caddy"))
        .expect("fragment should exist");
    assert!(fragment.contains("reverse_proxy 192.168.2.101:8080"));
    assert!(workspace.base.join("volumes/alpha").is_dir());
    assert!(
        runner
            .command_lines()
            .iter()
            .any(|line| line.starts_with("tc qdisc add"))
    );
}

#[rstest]
fn create_overwrites_a_stale_fragment_with_the_requested_credential(
    runtime: RuntimeFixture,
    workspace: Workspace,
) {
    let rt = runtime.expect("runtime should start");
    let conf = workspace.base.join("conf.d");
    std::fs::create_dir_all(&conf).expect("fragment dir created");
    std::fs::write(
        conf.join("alpha.local.caddy"),
        format!(
            "\nalpha.local.hikka.host {{\n    reverse_proxy 192.168.9.101:8080\n    basicauth {{\n        alpha {STALE_HASH}\n    }}\n}}\n"
        ),
    )
    .expect("stale fragment written");
    let runner = RecordingRunner::with_responder(clean_host_reply);
    let mut lifecycle = manager(subnet_one_taken(), &runner, &workspace.config);

    rt.block_on(lifecycle.create(&request()))
        .expect("create should succeed");

    let fragment = std::fs::read_to_string(conf.join("alpha.local.caddy"))
        .expect("fragment should exist");
    assert!(fragment.contains(&format!("alpha {REQUEST_HASH}")));
    assert!(!fragment.contains(STALE_HASH));
    assert!(fragment.contains("reverse_proxy 192.168.2.101:8080"));
}

#[rstest]
fn create_refuses_existing_tenant_without_leasing(runtime: RuntimeFixture, workspace: Workspace) {
    let rt = runtime.expect("runtime should start");
    std::fs::create_dir_all(workspace.base.join("volumes/alpha")).expect("dir created");
    let mut engine = MockRuntime::new();
    engine.expect_network_subnets().times(0);
    let runner = RecordingRunner::succeeding();
    let mut lifecycle = manager(engine, &runner, &workspace.config);

    let error = rt
        .block_on(lifecycle.create(&request()))
        .expect_err("create should fail");

    assert!(matches!(
        error,
        HostError::Container(ContainerError::AlreadyExists { .. })
    ));
    assert!(runner.calls().is_empty());
}

#[rstest]
fn failed_compose_up_is_compensated(runtime: RuntimeFixture, workspace: Workspace) {
    let rt = runtime.expect("runtime should start");
    let mut engine = MockRuntime::new();
    engine
        .expect_network_subnets()
        .returning(|| Box::pin(async { Ok(Vec::new()) }));
    engine
        .expect_kill_container()
        .returning(|name| {
            let error = not_found(name);
            Box::pin(async move { Err(error) })
        });
    engine.expect_remove_network().returning(|name| {
        assert_eq!(name, "alpha_tenant_net");
        let error = not_found(name);
        Box::pin(async move { Err(error) })
    });
    let runner = RecordingRunner::with_responder(|spec| {
        if spec.arguments().iter().any(|arg| arg == "up") {
            return Ok(CommandOutput::failure(1, "port is already allocated"));
        }
        clean_host_reply(spec)
    });
    let mut lifecycle = manager(engine, &runner, &workspace.config);

    let error = rt
        .block_on(lifecycle.create(&request()))
        .expect_err("create should fail");

    match error {
        HostError::Lifecycle(LifecycleError::CreateFailed {
            tenant,
            cause,
            cleanup,
        }) => {
            assert_eq!(tenant, "alpha");
            assert!(cause.to_string().contains("port is already allocated"));
            assert!(cleanup.contains("compose_down=done"));
            assert!(cleanup.contains("delete_directory=done"));
        }
        other => panic!("expected CreateFailed, got {other:?}"),
    }
    assert!(!workspace.base.join("volumes/alpha").exists());
    assert!(runner.command_lines().iter().any(|line| line.ends_with("down -v")));
}

#[rstest]
fn removing_unknown_tenant_finds_nothing(runtime: RuntimeFixture, workspace: Workspace) {
    let rt = runtime.expect("runtime should start");
    let mut engine = MockRuntime::new();
    engine.expect_kill_container().returning(|name| {
        let error = not_found(name);
        Box::pin(async move { Err(error) })
    });
    engine.expect_remove_network().returning(|name| {
        let error = not_found(name);
        Box::pin(async move { Err(error) })
    });
    let runner = RecordingRunner::with_responder(clean_host_reply);
    let lifecycle = manager(engine, &runner, &workspace.config);

    let report = rt
        .block_on(lifecycle.remove(&alpha()))
        .expect("removal should complete");

    assert!(!report.resources_found);
    assert_eq!(report.steps.len(), TeardownStep::ALL.len());
    assert!(
        report
            .steps
            .iter()
            .all(|step| step.outcome == StepOutcome::NotFound)
    );
    assert!(runner.command_lines().iter().all(|line| !line.contains("compose")));
}

#[rstest]
fn failed_steps_are_aggregated(runtime: RuntimeFixture, workspace: Workspace) {
    let rt = runtime.expect("runtime should start");
    let mut engine = MockRuntime::new();
    engine
        .expect_kill_container()
        .returning(|_| Box::pin(async { Ok(()) }));
    engine.expect_remove_network().returning(|_| {
        Box::pin(async {
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 403,
                message: String::from("network has active endpoints"),
            })
        })
    });
    let runner = RecordingRunner::with_responder(clean_host_reply);
    let lifecycle = manager(engine, &runner, &workspace.config);

    let error = rt
        .block_on(lifecycle.remove(&alpha()))
        .expect_err("removal should report failure");

    match error {
        HostError::Lifecycle(LifecycleError::RemovalFailed { tenant, failures }) => {
            assert_eq!(tenant, "alpha");
            assert_eq!(failures.len(), 1);
            assert!(failures.iter().all(|f| f.starts_with("remove_network: ")));
        }
        other => panic!("expected RemovalFailed, got {other:?}"),
    }
}

#[rstest]
fn start_of_unknown_container_is_not_found(runtime: RuntimeFixture, workspace: Workspace) {
    let rt = runtime.expect("runtime should start");
    let mut engine = MockRuntime::new();
    engine.expect_start_container().returning(|name| {
        let error = not_found(name);
        Box::pin(async move { Err(error) })
    });
    let lifecycle = manager(engine, &RecordingRunner::succeeding(), &workspace.config);

    let error = rt
        .block_on(lifecycle.control(ActionKind::Start, &alpha()))
        .expect_err("start should fail");
    assert!(matches!(
        error,
        HostError::Container(ContainerError::NotFound { name }) if name == "alpha"
    ));
}

#[rstest]
fn recreate_runs_compose_create_then_start(runtime: RuntimeFixture, workspace: Workspace) {
    let rt = runtime.expect("runtime should start");
    std::fs::create_dir_all(workspace.base.join("volumes/alpha")).expect("dir created");
    let runner = RecordingRunner::succeeding();
    let lifecycle = manager(MockRuntime::new(), &runner, &workspace.config);

    rt.block_on(lifecycle.control(ActionKind::Recreate, &alpha()))
        .expect("recreate should succeed");

    let lines = runner.command_lines();
    assert_eq!(lines.len(), 2);
    assert!(lines.first().is_some_and(|line| line.ends_with(" create")));
    assert!(lines.last().is_some_and(|line| line.ends_with(" start")));
}

#[rstest]
fn rotation_without_fragment_reports_tenant_not_found(
    runtime: RuntimeFixture,
    workspace: Workspace,
) {
    let rt = runtime.expect("runtime should start");
    let lifecycle = manager(
        MockRuntime::new(),
        &RecordingRunner::succeeding(),
        &workspace.config,
    );
    let rotated = CredentialHash::new("$2b$12$rotrotrotrotrotrotrotrotrotrotrotrotrotrotrotrotrotro")
        .expect("hash should be bcrypt");
    let outcome = rt
        .block_on(lifecycle.rotate_credential(&alpha(), &rotated))
        .expect("rotation should not error");
    assert_eq!(outcome, RotationOutcome::TenantNotFound);
}

#[rstest]
fn resync_publishes_tenants_with_a_prefix(runtime: RuntimeFixture, workspace: Workspace) {
    let rt = runtime.expect("runtime should start");
    let volumes = workspace.base.join("volumes");
    std::fs::create_dir_all(volumes.join("alpha")).expect("dir created");
    std::fs::write(volumes.join("alpha/.env"), "IP_PREFIX=192.168.4\n").expect("env written");
    std::fs::create_dir_all(volumes.join("beta")).expect("dir created");
    let runner = RecordingRunner::succeeding();
    let lifecycle = manager(MockRuntime::new(), &runner, &workspace.config);

    let report = rt.block_on(lifecycle.resync()).expect("resync should succeed");

    assert_eq!(report.published, vec![String::from("alpha")]);
    assert_eq!(report.skipped, vec![String::from("beta")]);
    let fragment = std::fs::read_to_string(workspace.base.join("conf.d/alpha.local.caddy"))
        .expect("fragment should exist");
    assert!(fragment.contains("192.168.4.101:8080"));
    assert!(fragment.contains(crate::config::DEFAULT_CREDENTIAL_HASH));

    let again = rt.block_on(lifecycle.resync()).expect("resync should succeed");
    assert_eq!(again.unchanged, vec![String::from("alpha")]);
}

#[rstest]
#[case(true, DeploymentStatus::Running)]
#[case(false, DeploymentStatus::Stopped)]
fn status_reflects_inspect_state(
    runtime: RuntimeFixture,
    #[case] running: bool,
    #[case] expected: DeploymentStatus,
) {
    let rt = runtime.expect("runtime should start");
    let mut engine = MockRuntime::new();
    engine
        .expect_inspect_container()
        .returning(move |_| Box::pin(async move { Ok(inspect_with(running)) }));
    let queries = DeploymentQueries::new(Arc::new(engine));
    assert_eq!(
        rt.block_on(queries.status(&alpha())).expect("status"),
        expected
    );
}

#[rstest]
fn status_of_missing_container_is_not_found(runtime: RuntimeFixture) {
    let rt = runtime.expect("runtime should start");
    let mut engine = MockRuntime::new();
    engine.expect_inspect_container().returning(|name| {
        let error = not_found(name);
        Box::pin(async move { Err(error) })
    });
    let queries = DeploymentQueries::new(Arc::new(engine));
    assert_eq!(
        rt.block_on(queries.status(&alpha())).expect("status"),
        DeploymentStatus::NotFound
    );
}

#[rstest]
fn stats_of_stopped_container_is_not_running(runtime: RuntimeFixture) {
    let rt = runtime.expect("runtime should start");
    let mut engine = MockRuntime::new();
    engine
        .expect_inspect_container()
        .returning(|_| Box::pin(async { Ok(inspect_with(false)) }));
    engine.expect_container_stats().times(0);
    let queries = DeploymentQueries::new(Arc::new(engine));
    assert!(matches!(
        rt.block_on(queries.stats(&alpha())).expect("stats"),
        DeploymentStats::NotRunning
    ));
}

#[rstest]
fn count_running_ignores_stopped_containers(runtime: RuntimeFixture) {
    let rt = runtime.expect("runtime should start");
    let mut engine = MockRuntime::new();
    engine.expect_list_containers().returning(|| {
        Box::pin(async {
            Ok(vec![
                ContainerSummary {
                    name: String::from("alpha"),
                    status: String::from("running"),
                },
                ContainerSummary {
                    name: String::from("beta"),
                    status: String::from("exited"),
                },
            ])
        })
    });
    let queries = DeploymentQueries::new(Arc::new(engine));
    assert_eq!(rt.block_on(queries.count_running()).expect("count"), 1);
}
