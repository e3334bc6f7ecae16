//! Container runtime queries and control calls behind a mockable seam.
//!
//! The lifecycle manager and the subnet allocator only need a handful of
//! engine calls. [`ContainerRuntime`] names them so that both can be driven by
//! a fake in tests while production code passes a Bollard [`Docker`] client.

use std::future::Future;
use std::pin::Pin;

use bollard::Docker;
use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::models::{
    ContainerInspectResponse, ContainerStatsResponse, ContainerSummary as EngineContainerSummary,
    Network,
};
use bollard::query_parameters::{
    InspectContainerOptions, KillContainerOptions, ListContainersOptionsBuilder,
    ListNetworksOptions, LogsOptionsBuilder, RestartContainerOptions, StartContainerOptions,
    StatsOptionsBuilder, StopContainerOptions,
};
use futures_util::StreamExt;
use serde::Serialize;

use crate::engine::ContainerExecClient;

/// Boxed future type returned by every [`ContainerRuntime`] method.
pub type RuntimeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BollardError>> + Send + 'a>>;

/// A container as reported by the runtime listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerSummary {
    /// Container name without the leading slash.
    pub name: String,
    /// Runtime state, e.g. `running` or `exited`.
    pub status: String,
}

impl ContainerSummary {
    /// Whether the runtime reports the container as running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == "running"
    }
}

/// Engine calls used by lifecycle management and subnet allocation.
pub trait ContainerRuntime: ContainerExecClient + Send + Sync {
    /// Inspect a container by name.
    fn inspect_container(&self, name: &str) -> RuntimeFuture<'_, ContainerInspectResponse>;

    /// Start a stopped container.
    fn start_container(&self, name: &str) -> RuntimeFuture<'_, ()>;

    /// Stop a running container.
    fn stop_container(&self, name: &str) -> RuntimeFuture<'_, ()>;

    /// Restart a container.
    fn restart_container(&self, name: &str) -> RuntimeFuture<'_, ()>;

    /// Send `SIGKILL` to a container.
    fn kill_container(&self, name: &str) -> RuntimeFuture<'_, ()>;

    /// Collect the container's full stdout and stderr log.
    fn container_logs(&self, name: &str) -> RuntimeFuture<'_, String>;

    /// Take a single stats sample.
    fn container_stats(&self, name: &str) -> RuntimeFuture<'_, ContainerStatsResponse>;

    /// List every container, including stopped ones.
    fn list_containers(&self) -> RuntimeFuture<'_, Vec<ContainerSummary>>;

    /// Every subnet bound to a runtime-managed network, in CIDR notation.
    fn network_subnets(&self) -> RuntimeFuture<'_, Vec<String>>;

    /// Remove a network by name.
    fn remove_network(&self, name: &str) -> RuntimeFuture<'_, ()>;
}

impl ContainerRuntime for Docker {
    fn inspect_container(&self, name: &str) -> RuntimeFuture<'_, ContainerInspectResponse> {
        let name_owned = String::from(name);
        Box::pin(async move {
            Self::inspect_container(self, &name_owned, None::<InspectContainerOptions>).await
        })
    }

    fn start_container(&self, name: &str) -> RuntimeFuture<'_, ()> {
        let name_owned = String::from(name);
        Box::pin(async move {
            Self::start_container(self, &name_owned, None::<StartContainerOptions>).await
        })
    }

    fn stop_container(&self, name: &str) -> RuntimeFuture<'_, ()> {
        let name_owned = String::from(name);
        Box::pin(async move {
            Self::stop_container(self, &name_owned, None::<StopContainerOptions>).await
        })
    }

    fn restart_container(&self, name: &str) -> RuntimeFuture<'_, ()> {
        let name_owned = String::from(name);
        Box::pin(async move {
            Self::restart_container(self, &name_owned, None::<RestartContainerOptions>).await
        })
    }

    fn kill_container(&self, name: &str) -> RuntimeFuture<'_, ()> {
        let name_owned = String::from(name);
        Box::pin(async move {
            Self::kill_container(self, &name_owned, None::<KillContainerOptions>).await
        })
    }

    fn container_logs(&self, name: &str) -> RuntimeFuture<'_, String> {
        let name_owned = String::from(name);
        Box::pin(async move {
            let options = LogsOptionsBuilder::default()
                .stdout(true)
                .stderr(true)
                .tail("all")
                .build();
            let mut stream = Box::pin(self.logs(&name_owned, Some(options)));
            let mut collected = Vec::new();
            while let Some(chunk) = stream.next().await {
                match chunk? {
                    LogOutput::StdOut { message }
                    | LogOutput::StdErr { message }
                    | LogOutput::Console { message } => collected.extend_from_slice(&message),
                    LogOutput::StdIn { .. } => {}
                }
            }
            Ok(String::from_utf8_lossy(&collected).into_owned())
        })
    }

    fn container_stats(&self, name: &str) -> RuntimeFuture<'_, ContainerStatsResponse> {
        let name_owned = String::from(name);
        Box::pin(async move {
            let options = StatsOptionsBuilder::default()
                .stream(false)
                .one_shot(true)
                .build();
            let mut stream = Box::pin(self.stats(&name_owned, Some(options)));
            match stream.next().await {
                Some(sample) => sample,
                None => Err(BollardError::DockerStreamError {
                    error: format!("no stats sample returned for '{name_owned}'"),
                }),
            }
        })
    }

    fn list_containers(&self) -> RuntimeFuture<'_, Vec<ContainerSummary>> {
        Box::pin(async move {
            let options = ListContainersOptionsBuilder::default().all(true).build();
            let containers = Self::list_containers(self, Some(options)).await?;
            Ok(containers.iter().filter_map(summarize).collect())
        })
    }

    fn network_subnets(&self) -> RuntimeFuture<'_, Vec<String>> {
        Box::pin(async move {
            let networks = self.list_networks(None::<ListNetworksOptions>).await?;
            Ok(networks.iter().flat_map(subnets_of).collect())
        })
    }

    fn remove_network(&self, name: &str) -> RuntimeFuture<'_, ()> {
        let name_owned = String::from(name);
        Box::pin(async move { Self::remove_network(self, &name_owned).await })
    }
}

/// Reduce an engine listing entry to its name and state.
///
/// Entries without a name are skipped.
fn summarize(container: &EngineContainerSummary) -> Option<ContainerSummary> {
    let name = container
        .names
        .as_ref()?
        .first()?
        .trim_start_matches('/')
        .to_owned();
    let status = serde_json::to_value(&container.state)
        .ok()
        .and_then(|value| value.as_str().map(str::to_owned))
        .filter(|state| !state.is_empty())
        .unwrap_or_else(|| String::from("unknown"));
    Some(ContainerSummary { name, status })
}

fn subnets_of(network: &Network) -> Vec<String> {
    network
        .ipam
        .as_ref()
        .and_then(|ipam| ipam.config.as_ref())
        .map(|configs| {
            configs
                .iter()
                .filter_map(|config| config.subnet.clone())
                .collect()
        })
        .unwrap_or_default()
}
