//! Assertion steps for tenant lifecycle scenarios.

use std::collections::BTreeSet;

use podhost::lifecycle::DeploymentStatus;
use podhost::tasks::{TaskRecord, TaskStatus};
use rstest_bdd_macros::then;
use serde_json::json;

use super::StepResult;
use super::state::{LifecycleState, Submission};
use super::steps::world;

fn finished(lifecycle_state: &LifecycleState) -> StepResult<TaskRecord> {
    match lifecycle_state.submission.get() {
        Some(Submission::Finished(record)) => Ok(*record),
        Some(Submission::Rejected { message, .. }) => {
            Err(format!("expected a finished task, submission was rejected: {message}"))
        }
        None => Err(String::from("no submission was made")),
    }
}

fn status_of(lifecycle_state: &LifecycleState, name: &str) -> StepResult<DeploymentStatus> {
    let world = world(lifecycle_state)?;
    world
        .runtime
        .block_on(world.service.get_status(name))
        .map_err(|e| format!("status query failed: {e}"))
}

#[then("the task completes with message {message}")]
fn task_completes_with_message(
    lifecycle_state: &LifecycleState,
    message: String,
) -> StepResult<()> {
    let record = finished(lifecycle_state)?;
    if record.status != TaskStatus::Completed {
        return Err(format!(
            "expected completed, got {:?}: {:?}",
            record.status, record.error
        ));
    }
    let expected = json!({ "message": message });
    if record.result.as_ref() != Some(&expected) {
        return Err(format!("expected {expected}, got {:?}", record.result));
    }
    Ok(())
}

#[then("the removal completes without finding resources")]
fn removal_found_nothing(lifecycle_state: &LifecycleState) -> StepResult<()> {
    let record = finished(lifecycle_state)?;
    if record.status != TaskStatus::Completed {
        return Err(format!("expected completed, got {:?}", record.error));
    }
    let found = record
        .result
        .as_ref()
        .and_then(|result| result.pointer("/remove/resources_found"))
        .cloned();
    if found != Some(json!(false)) {
        return Err(format!("expected no resources, report was {:?}", record.result));
    }
    Ok(())
}

#[then("the removal completes")]
fn removal_completes(lifecycle_state: &LifecycleState) -> StepResult<()> {
    let record = finished(lifecycle_state)?;
    if record.status == TaskStatus::Completed {
        Ok(())
    } else {
        Err(format!("removal failed: {:?}", record.error))
    }
}

#[then("tenant {name} is running")]
fn tenant_is_running(lifecycle_state: &LifecycleState, name: String) -> StepResult<()> {
    match status_of(lifecycle_state, &name)? {
        DeploymentStatus::Running => Ok(()),
        other => Err(format!("expected running, got {other:?}")),
    }
}

#[then("tenant {name} is reported stopped")]
fn tenant_is_stopped(lifecycle_state: &LifecycleState, name: String) -> StepResult<()> {
    match status_of(lifecycle_state, &name)? {
        DeploymentStatus::Stopped => Ok(()),
        other => Err(format!("expected stopped, got {other:?}")),
    }
}

#[then("tenant {name} is not found")]
fn tenant_is_not_found(lifecycle_state: &LifecycleState, name: String) -> StepResult<()> {
    match status_of(lifecycle_state, &name)? {
        DeploymentStatus::NotFound => Ok(()),
        other => Err(format!("expected not found, got {other:?}")),
    }
}

#[then("tenant {name} uses subnet prefix {prefix}")]
fn tenant_uses_prefix(
    lifecycle_state: &LifecycleState,
    name: String,
    prefix: String,
) -> StepResult<()> {
    let world = world(lifecycle_state)?;
    let path = world.volumes_dir.join(&name).join(".env");
    let env = std::fs::read_to_string(&path).map_err(|e| format!("cannot read {path}: {e}"))?;
    let recorded = env.lines().find_map(|line| line.strip_prefix("IP_PREFIX="));
    if recorded == Some(prefix.as_str()) {
        Ok(())
    } else {
        Err(format!("expected IP_PREFIX={prefix}, found {recorded:?}"))
    }
}

#[then("{count} distinct subnets are leased")]
fn distinct_subnets(lifecycle_state: &LifecycleState, count: usize) -> StepResult<()> {
    let world = world(lifecycle_state)?;
    let subnets = world.host.subnets();
    let distinct: BTreeSet<&String> = subnets.iter().collect();
    if subnets.len() == count && distinct.len() == count {
        Ok(())
    } else {
        Err(format!("expected {count} distinct subnets, got {subnets:?}"))
    }
}

#[then("the submission is rejected as invalid")]
fn submission_rejected(lifecycle_state: &LifecycleState) -> StepResult<()> {
    match lifecycle_state.submission.get() {
        Some(Submission::Rejected {
            validation: true, ..
        }) => Ok(()),
        Some(Submission::Rejected { message, .. }) => {
            Err(format!("rejected for a non-validation reason: {message}"))
        }
        Some(Submission::Finished(record)) => {
            Err(format!("expected rejection, task {} was queued", record.task_id))
        }
        None => Err(String::from("no submission was made")),
    }
}

#[then("nothing was provisioned on the host")]
fn nothing_provisioned(lifecycle_state: &LifecycleState) -> StepResult<()> {
    let world = world(lifecycle_state)?;
    let commands = world.host.command_lines();
    if !commands.is_empty() {
        return Err(format!("unexpected host commands: {commands:?}"));
    }
    if world.volumes_dir.exists() {
        return Err(format!("{} should not exist", world.volumes_dir));
    }
    Ok(())
}
