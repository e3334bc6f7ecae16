//! Single-worker FIFO task queue.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use futures_util::FutureExt;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{TaskId, TaskPayload, TaskRecord, TaskStatus};
use crate::error::{HostError, TaskError};

/// Future returned by [`TaskHandler::handle`].
pub type TaskFuture<'a> =
    Pin<Box<dyn Future<Output = Result<serde_json::Value, HostError>> + Send + 'a>>;

/// Executes task payloads on behalf of the worker.
///
/// The handler is moved into the worker on first submission and receives
/// `&mut self`, so it may own state that needs exclusive access.
pub trait TaskHandler: Send + 'static {
    /// Run one task and produce its JSON result.
    fn handle(&mut self, payload: TaskPayload) -> TaskFuture<'_>;
}

type RecordMap = Arc<RwLock<HashMap<TaskId, TaskRecord>>>;

struct WorkerState {
    handler: Option<Box<dyn TaskHandler>>,
    sender: Option<mpsc::UnboundedSender<TaskId>>,
    worker: Option<JoinHandle<()>>,
    closed: bool,
}

/// Accepts task submissions and runs them one at a time.
pub struct TaskEngine {
    records: RecordMap,
    state: Mutex<WorkerState>,
}

impl TaskEngine {
    /// Create an engine that will run tasks with `handler`.
    ///
    /// No worker is spawned until the first submission.
    #[must_use]
    pub fn new(handler: impl TaskHandler) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            state: Mutex::new(WorkerState {
                handler: Some(Box::new(handler)),
                sender: None,
                worker: None,
                closed: false,
            }),
        }
    }

    /// Enqueue `payload` and return its identifier immediately.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `TaskError::QueueClosed` after [`Self::shutdown`].
    pub async fn submit(&self, payload: TaskPayload) -> Result<TaskId, HostError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(TaskError::QueueClosed.into());
        }
        let sender = self.ensure_worker(&mut state)?;

        let task_id = TaskId::new();
        let kind = payload.kind();
        self.records
            .write()
            .await
            .insert(task_id, TaskRecord::pending(task_id, payload));
        if sender.send(task_id).is_err() {
            self.records.write().await.remove(&task_id);
            return Err(TaskError::QueueClosed.into());
        }
        info!(%task_id, ?kind, "task accepted");
        Ok(task_id)
    }

    /// Snapshot of a task's record, or `None` for an unknown identifier.
    pub async fn status(&self, task_id: TaskId) -> Option<TaskRecord> {
        self.records.read().await.get(&task_id).cloned()
    }

    /// Close the queue, let the worker drain every queued task and wait for
    /// it to exit.
    ///
    /// # Errors
    ///
    /// Returns `TaskError::WorkerLost` if the worker could not be joined.
    pub async fn shutdown(&self) -> Result<(), HostError> {
        let worker = {
            let mut state = self.state.lock().await;
            state.closed = true;
            state.sender = None;
            state.worker.take()
        };
        let Some(handle) = worker else {
            return Ok(());
        };
        handle.await.map_err(|error| TaskError::WorkerLost {
            message: error.to_string(),
        })?;
        info!("task worker stopped");
        Ok(())
    }

    fn ensure_worker(
        &self,
        state: &mut WorkerState,
    ) -> Result<mpsc::UnboundedSender<TaskId>, HostError> {
        if let Some(sender) = &state.sender {
            return Ok(sender.clone());
        }
        let handler = state.handler.take().ok_or(TaskError::QueueClosed)?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let records = Arc::clone(&self.records);
        state.worker = Some(tokio::spawn(run_worker(receiver, handler, records)));
        state.sender = Some(sender.clone());
        debug!("task worker spawned");
        Ok(sender)
    }
}

async fn run_worker(
    mut receiver: mpsc::UnboundedReceiver<TaskId>,
    mut handler: Box<dyn TaskHandler>,
    records: RecordMap,
) {
    while let Some(task_id) = receiver.recv().await {
        let Some(payload) = begin(&records, task_id).await else {
            continue;
        };
        let kind = payload.kind();
        let outcome = AssertUnwindSafe(handler.handle(payload))
            .catch_unwind()
            .await;
        let (status, result, error) = match outcome {
            Ok(Ok(value)) => {
                info!(%task_id, ?kind, "task completed");
                (TaskStatus::Completed, Some(value), None)
            }
            Ok(Err(failure)) => {
                warn!(%task_id, ?kind, error = %failure, "task failed");
                (TaskStatus::Failed, None, Some(failure.to_string()))
            }
            Err(panic) => {
                let message = format!("task panicked: {}", panic_message(&*panic));
                warn!(%task_id, ?kind, error = %message, "task failed");
                (TaskStatus::Failed, None, Some(message))
            }
        };
        finish(&records, task_id, status, result, error).await;
    }
}

async fn begin(records: &RecordMap, task_id: TaskId) -> Option<TaskPayload> {
    let mut map = records.write().await;
    let record = map.get_mut(&task_id)?;
    if !record.status.can_transition_to(TaskStatus::Processing) {
        return None;
    }
    record.status = TaskStatus::Processing;
    record.updated_at = Utc::now();
    debug!(%task_id, kind = ?record.kind, "task started");
    Some(record.payload.clone())
}

async fn finish(
    records: &RecordMap,
    task_id: TaskId,
    status: TaskStatus,
    result: Option<serde_json::Value>,
    error: Option<String>,
) {
    let mut map = records.write().await;
    let Some(record) = map.get_mut(&task_id) else {
        return;
    };
    if !record.status.can_transition_to(status) {
        return;
    }
    record.status = status;
    record.updated_at = Utc::now();
    record.result = result;
    record.error = error;
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_owned();
    }
    payload
        .downcast_ref::<String>()
        .cloned()
        .unwrap_or_else(|| String::from("unknown panic"))
}
