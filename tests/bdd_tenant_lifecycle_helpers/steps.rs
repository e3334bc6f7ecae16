//! Given/when steps for tenant lifecycle scenarios.

use std::time::Duration;

use podhost::api::CreateParams;
use podhost::error::HostError;
use podhost::tasks::TaskId;
use rstest_bdd_macros::{given, when};

use super::StepResult;
use super::state::{LifecycleState, Submission, World};

const POLL_ATTEMPTS: usize = 400;
const POLL_INTERVAL: Duration = Duration::from_millis(5);

pub(crate) fn world(lifecycle_state: &LifecycleState) -> StepResult<World> {
    lifecycle_state
        .world
        .get()
        .ok_or_else(|| String::from("host should be configured"))
}

/// Wait for a submitted task to finish, or record the rejection.
fn settle(
    lifecycle_state: &LifecycleState,
    world: &World,
    submitted: Result<TaskId, HostError>,
) -> StepResult<()> {
    let task_id = match submitted {
        Ok(task_id) => task_id,
        Err(error) => {
            lifecycle_state.submission.set(Submission::Rejected {
                validation: error.is_validation(),
                message: error.to_string(),
            });
            return Ok(());
        }
    };

    let record = world.runtime.block_on(async {
        for _ in 0..POLL_ATTEMPTS {
            if let Some(record) = world.service.get_task(task_id).await {
                if record.is_finished() {
                    return Some(record);
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        None
    });
    let finished = record.ok_or_else(|| format!("task {task_id} did not finish"))?;
    lifecycle_state
        .submission
        .set(Submission::Finished(Box::new(finished)));
    Ok(())
}

#[given("a fresh host")]
fn given_fresh_host(lifecycle_state: &LifecycleState) -> StepResult<()> {
    lifecycle_state.world.set(World::fresh()?);
    Ok(())
}

#[given("tenant {name} has been created on port {port}")]
fn given_created_tenant(
    lifecycle_state: &LifecycleState,
    name: String,
    port: String,
) -> StepResult<()> {
    when_tenant_created(lifecycle_state, name, port)
}

#[when("tenant {name} is created on port {port}")]
fn when_tenant_created(
    lifecycle_state: &LifecycleState,
    name: String,
    port: String,
) -> StepResult<()> {
    let world = world(lifecycle_state)?;
    let submitted = world.runtime.block_on(world.service.submit_create(CreateParams {
        name: &name,
        port: &port,
        image: None,
        credential_hash: None,
    }));
    settle(lifecycle_state, &world, submitted)
}

#[when("tenant {name} is removed")]
fn when_tenant_removed(lifecycle_state: &LifecycleState, name: String) -> StepResult<()> {
    let world = world(lifecycle_state)?;
    let submitted = world.runtime.block_on(world.service.submit_remove(&name));
    settle(lifecycle_state, &world, submitted)
}

#[when("tenant {name} is stopped")]
fn when_tenant_stopped(lifecycle_state: &LifecycleState, name: String) -> StepResult<()> {
    let world = world(lifecycle_state)?;
    let submitted = world
        .runtime
        .block_on(world.service.submit_action("stop", &name));
    settle(lifecycle_state, &world, submitted)
}
