//! `mockall` double for the runtime seam, shared by unit tests.

use bollard::exec::{CreateExecOptions, StartExecOptions};
use bollard::models::{ContainerInspectResponse, ContainerStatsResponse};
use mockall::mock;

use super::{
    ContainerExecClient, ContainerRuntime, ContainerSummary, CreateExecFuture, InspectExecFuture,
    RuntimeFuture, StartExecFuture,
};

mock! {
    #[derive(Debug)]
    pub(crate) Runtime {}

    impl ContainerExecClient for Runtime {
        fn create_exec(&self, container_id: &str, options: CreateExecOptions<String>) -> CreateExecFuture<'_>;
        fn start_exec(&self, exec_id: &str, options: Option<StartExecOptions>) -> StartExecFuture<'_>;
        fn inspect_exec(&self, exec_id: &str) -> InspectExecFuture<'_>;
    }

    impl ContainerRuntime for Runtime {
        fn inspect_container(&self, name: &str) -> RuntimeFuture<'_, ContainerInspectResponse>;
        fn start_container(&self, name: &str) -> RuntimeFuture<'_, ()>;
        fn stop_container(&self, name: &str) -> RuntimeFuture<'_, ()>;
        fn restart_container(&self, name: &str) -> RuntimeFuture<'_, ()>;
        fn kill_container(&self, name: &str) -> RuntimeFuture<'_, ()>;
        fn container_logs(&self, name: &str) -> RuntimeFuture<'_, String>;
        fn container_stats(&self, name: &str) -> RuntimeFuture<'_, ContainerStatsResponse>;
        fn list_containers(&self) -> RuntimeFuture<'_, Vec<ContainerSummary>>;
        fn network_subnets(&self) -> RuntimeFuture<'_, Vec<String>>;
        fn remove_network(&self, name: &str) -> RuntimeFuture<'_, ()>;
    }
}

/// A 404 as the engine reports it for a missing container or network.
pub(crate) fn not_found(what: &str) -> bollard::errors::Error {
    bollard::errors::Error::DockerResponseServerError {
        status_code: 404,
        message: format!("No such container: {what}"),
    }
}
