//! Scenario state for tenant lifecycle behavioural tests.

use std::sync::Arc;

use camino::Utf8PathBuf;
use podhost::api::HostService;
use podhost::config::AppConfig;
use podhost::tasks::TaskRecord;
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;
use tempfile::TempDir;

use super::StepResult;
use super::fake_host::FakeHost;

/// A host service wired to an in-memory container host.
#[derive(Clone)]
pub(crate) struct World {
    pub(crate) runtime: Arc<tokio::runtime::Runtime>,
    pub(crate) service: Arc<HostService>,
    pub(crate) host: FakeHost,
    pub(crate) volumes_dir: Utf8PathBuf,
    _temp: Arc<TempDir>,
}

impl World {
    /// Build a service over a fresh fake host rooted in a temporary
    /// directory.
    pub(crate) fn fresh() -> StepResult<Self> {
        let temp = TempDir::new().map_err(|e| format!("failed to create temp dir: {e}"))?;
        let base = Utf8PathBuf::from_path_buf(temp.path().to_path_buf())
            .map_err(|path| format!("temp path is not UTF-8: {}", path.display()))?;
        let template = base.join("docker-compose.yml");
        std::fs::write(&template, "services: {}\n")
            .map_err(|e| format!("failed to write compose template: {e}"))?;

        let mut config = AppConfig::default();
        config.tenants.volumes_dir = base.join("volumes");
        config.tenants.compose_template = template;
        config.proxy.fragment_dir = base.join("conf.d");

        let host = FakeHost::default();
        let service = HostService::new(Arc::new(host.clone()), Arc::new(host.clone()), &config)
            .map_err(|e| format!("failed to build service: {e}"))?;
        let runtime =
            tokio::runtime::Runtime::new().map_err(|e| format!("failed to create runtime: {e}"))?;

        Ok(Self {
            runtime: Arc::new(runtime),
            service: Arc::new(service),
            host,
            volumes_dir: config.tenants.volumes_dir,
            _temp: Arc::new(temp),
        })
    }
}

/// Result of the most recent submission.
#[derive(Debug, Clone)]
pub(crate) enum Submission {
    /// The task ran to a terminal status.
    Finished(Box<TaskRecord>),
    /// The service refused the request before queueing it.
    Rejected {
        /// Whether the error was a validation error.
        validation: bool,
        /// The error message.
        message: String,
    },
}

#[derive(Default, ScenarioState)]
pub(crate) struct LifecycleState {
    pub(crate) world: Slot<World>,
    pub(crate) submission: Slot<Submission>,
}

#[fixture]
pub(crate) fn lifecycle_state() -> LifecycleState {
    LifecycleState::default()
}
