//! In-memory container host shared by a fake runtime and a fake command
//! runner.
//!
//! Compose `up` reads the tenant's `.env` file and registers a running
//! container plus a network carrying the leased subnet; compose `down`
//! removes both. Firewall and shaping commands behave like a host with no
//! tenant rules installed.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, StartExecOptions};
use bollard::models::{ContainerInspectResponse, ContainerState, ContainerStatsResponse};
use podhost::command::{CommandFuture, CommandOutput, CommandRunner, CommandSpec};
use podhost::engine::{
    ContainerExecClient, ContainerRuntime, ContainerSummary, CreateExecFuture, InspectExecFuture,
    RuntimeFuture, StartExecFuture,
};

#[derive(Debug, Default)]
struct Inventory {
    /// Container name to running flag.
    containers: BTreeMap<String, bool>,
    /// Network name to CIDR.
    networks: BTreeMap<String, String>,
    commands: Vec<String>,
}

/// Handle onto the shared inventory; clones observe the same host.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeHost {
    inventory: Arc<Mutex<Inventory>>,
}

impl FakeHost {
    fn inventory(&self) -> MutexGuard<'_, Inventory> {
        self.inventory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// CIDRs of every network currently present.
    pub(crate) fn subnets(&self) -> Vec<String> {
        self.inventory().networks.values().cloned().collect()
    }

    /// Every host command line run so far.
    pub(crate) fn command_lines(&self) -> Vec<String> {
        self.inventory().commands.clone()
    }

    fn missing(what: &str) -> BollardError {
        BollardError::DockerResponseServerError {
            status_code: 404,
            message: format!("No such object: {what}"),
        }
    }

    fn set_running(&self, name: &str, running: bool) -> Result<(), BollardError> {
        let mut inventory = self.inventory();
        let Some(flag) = inventory.containers.get_mut(name) else {
            return Err(Self::missing(name));
        };
        *flag = running;
        Ok(())
    }

    fn apply_compose(&self, arguments: &[String]) {
        let value_after = |flag: &str| {
            arguments
                .iter()
                .position(|arg| arg == flag)
                .and_then(|index| arguments.get(index + 1))
                .cloned()
        };
        let (Some(project), Some(env_path)) = (value_after("-p"), value_after("--env-file")) else {
            return;
        };
        let action = arguments
            .iter()
            .skip_while(|arg| **arg != env_path)
            .nth(1)
            .cloned()
            .unwrap_or_default();

        let mut inventory = self.inventory();
        match action.as_str() {
            "up" => {
                let env = std::fs::read_to_string(&env_path).unwrap_or_default();
                if let Some(prefix) = env
                    .lines()
                    .find_map(|line| line.strip_prefix("IP_PREFIX="))
                {
                    inventory
                        .networks
                        .insert(format!("{project}_tenant_net"), format!("{prefix}.0/24"));
                }
                inventory.containers.insert(project, true);
            }
            "create" => {
                inventory.containers.entry(project).or_insert(false);
            }
            "start" => {
                inventory.containers.insert(project, true);
            }
            "down" => {
                inventory.containers.remove(&project);
                inventory.networks.remove(&format!("{project}_tenant_net"));
            }
            _ => {}
        }
    }
}

impl CommandRunner for FakeHost {
    fn run(&self, spec: CommandSpec) -> CommandFuture<'_> {
        Box::pin(async move {
            self.inventory().commands.push(spec.to_string());
            let arguments = spec.arguments();
            let first = arguments.first().map(String::as_str);
            let output = match spec.program() {
                "docker" if first == Some("compose") => {
                    self.apply_compose(arguments);
                    CommandOutput::success("")
                }
                "iptables" if first == Some("-C") => {
                    CommandOutput::failure(1, "iptables: Bad rule")
                }
                "tc" if arguments.get(1).is_some_and(|op| op == "del") => {
                    CommandOutput::failure(2, "Cannot find device")
                }
                _ => CommandOutput::success(""),
            };
            Ok(output)
        })
    }
}

impl ContainerExecClient for FakeHost {
    fn create_exec(
        &self,
        container_id: &str,
        _options: CreateExecOptions<String>,
    ) -> CreateExecFuture<'_> {
        let error = Self::missing(container_id);
        Box::pin(async move { Err(error) })
    }

    fn start_exec(&self, exec_id: &str, _options: Option<StartExecOptions>) -> StartExecFuture<'_> {
        let error = Self::missing(exec_id);
        Box::pin(async move { Err(error) })
    }

    fn inspect_exec(&self, exec_id: &str) -> InspectExecFuture<'_> {
        let error = Self::missing(exec_id);
        Box::pin(async move { Err(error) })
    }
}

impl ContainerRuntime for FakeHost {
    fn inspect_container(&self, name: &str) -> RuntimeFuture<'_, ContainerInspectResponse> {
        let result = self
            .inventory()
            .containers
            .get(name)
            .map(|running| ContainerInspectResponse {
                state: Some(ContainerState {
                    running: Some(*running),
                    ..ContainerState::default()
                }),
                ..ContainerInspectResponse::default()
            })
            .ok_or_else(|| Self::missing(name));
        Box::pin(async move { result })
    }

    fn start_container(&self, name: &str) -> RuntimeFuture<'_, ()> {
        let result = self.set_running(name, true);
        Box::pin(async move { result })
    }

    fn stop_container(&self, name: &str) -> RuntimeFuture<'_, ()> {
        let result = self.set_running(name, false);
        Box::pin(async move { result })
    }

    fn restart_container(&self, name: &str) -> RuntimeFuture<'_, ()> {
        let result = self.set_running(name, true);
        Box::pin(async move { result })
    }

    fn kill_container(&self, name: &str) -> RuntimeFuture<'_, ()> {
        let result = self.set_running(name, false);
        Box::pin(async move { result })
    }

    fn container_logs(&self, name: &str) -> RuntimeFuture<'_, String> {
        let result = self
            .inventory()
            .containers
            .get(name)
            .map(|_| String::from("ready\n"))
            .ok_or_else(|| Self::missing(name));
        Box::pin(async move { result })
    }

    fn container_stats(&self, name: &str) -> RuntimeFuture<'_, ContainerStatsResponse> {
        let result = self
            .inventory()
            .containers
            .get(name)
            .map(|_| ContainerStatsResponse::default())
            .ok_or_else(|| Self::missing(name));
        Box::pin(async move { result })
    }

    fn list_containers(&self) -> RuntimeFuture<'_, Vec<ContainerSummary>> {
        let summaries = self
            .inventory()
            .containers
            .iter()
            .map(|(name, running)| ContainerSummary {
                name: name.clone(),
                status: String::from(if *running { "running" } else { "exited" }),
            })
            .collect();
        Box::pin(async move { Ok(summaries) })
    }

    fn network_subnets(&self) -> RuntimeFuture<'_, Vec<String>> {
        let subnets = self.subnets();
        Box::pin(async move { Ok(subnets) })
    }

    fn remove_network(&self, name: &str) -> RuntimeFuture<'_, ()> {
        let removed = self.inventory().networks.remove(name);
        let result = removed.map(|_| ()).ok_or_else(|| Self::missing(name));
        Box::pin(async move { result })
    }
}
