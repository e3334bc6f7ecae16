//! Asynchronous lifecycle task execution.
//!
//! Mutating operations are submitted as typed [`TaskPayload`]s and executed
//! one at a time by the [`TaskEngine`] worker. Callers poll the returned
//! [`TaskId`] for a [`TaskRecord`] until it reaches a terminal status.

mod engine;
mod handler;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

pub use engine::{TaskEngine, TaskFuture, TaskHandler};

use crate::lifecycle::{ActionKind, CreateRequest};
use crate::tenant::{CredentialHash, TenantName};

/// Opaque identifier of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The kind of work a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Provision a tenant.
    Create,
    /// Start, stop, restart or recreate a deployment.
    Action,
    /// Run a command inside a deployment.
    Exec,
    /// Tear a tenant down.
    Remove,
    /// Replace a tenant's proxy credential.
    UpdateCredential,
    /// Rebuild every proxy fragment.
    Resync,
}

/// Validated input of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TaskPayload {
    /// Provision a tenant.
    Create(CreateRequest),
    /// Control an existing deployment.
    Action {
        /// The action to perform.
        action: ActionKind,
        /// Target tenant.
        name: TenantName,
    },
    /// Run a shell snippet inside a deployment.
    Exec {
        /// Target tenant.
        name: TenantName,
        /// Snippet passed to `bash -c`.
        command: String,
    },
    /// Tear a tenant down.
    Remove {
        /// Target tenant.
        name: TenantName,
    },
    /// Replace a tenant's proxy credential.
    UpdateCredential {
        /// Target tenant.
        name: TenantName,
        /// The new password hash.
        credential_hash: CredentialHash,
    },
    /// Rebuild every proxy fragment.
    Resync,
}

impl TaskPayload {
    /// The kind of task this payload describes.
    #[must_use]
    pub const fn kind(&self) -> TaskKind {
        match self {
            Self::Create(_) => TaskKind::Create,
            Self::Action { .. } => TaskKind::Action,
            Self::Exec { .. } => TaskKind::Exec,
            Self::Remove { .. } => TaskKind::Remove,
            Self::UpdateCredential { .. } => TaskKind::UpdateCredential,
            Self::Resync => TaskKind::Resync,
        }
    }
}

/// Progress of a task.
///
/// Transitions only move forward: `pending` to `processing`, then to one of
/// the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Queued, not yet picked up by the worker.
    Pending,
    /// Currently executing.
    Processing,
    /// Finished successfully; the record carries a result.
    Completed,
    /// Finished with an error; the record carries a message.
    Failed,
}

impl TaskStatus {
    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed | Self::Failed)
        )
    }
}

/// Bookkeeping entry for one submitted task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    /// The task identifier.
    pub task_id: TaskId,
    /// The task kind.
    pub kind: TaskKind,
    /// The input the task was submitted with.
    pub payload: TaskPayload,
    /// Current status.
    pub status: TaskStatus,
    /// When the task was accepted.
    pub created_at: DateTime<Utc>,
    /// When the status last changed.
    pub updated_at: DateTime<Utc>,
    /// Result of a completed task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error message of a failed task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskRecord {
    fn pending(task_id: TaskId, payload: TaskPayload) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            kind: payload.kind(),
            payload,
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
            result: None,
            error: None,
        }
    }

    /// Whether the task has finished.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}
