//! Recording command runner shared by unit tests.

use std::sync::{Arc, Mutex, PoisonError};

use super::{CommandFuture, CommandOutput, CommandRunner, CommandSpec};
use crate::error::CommandError;

type Responder = dyn Fn(&CommandSpec) -> Result<CommandOutput, CommandError> + Send + Sync;

/// Records every spec it is asked to run and answers through a responder.
#[derive(Clone)]
pub(crate) struct RecordingRunner {
    calls: Arc<Mutex<Vec<CommandSpec>>>,
    responder: Arc<Responder>,
}

impl RecordingRunner {
    /// A runner where every command succeeds with empty output.
    pub(crate) fn succeeding() -> Self {
        Self::with_responder(|_| Ok(CommandOutput::success("")))
    }

    /// A runner answering through `responder`.
    pub(crate) fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&CommandSpec) -> Result<CommandOutput, CommandError> + Send + Sync + 'static,
    {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            responder: Arc::new(responder),
        }
    }

    /// Every spec run so far, in order.
    pub(crate) fn calls(&self) -> Vec<CommandSpec> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Each recorded call rendered as a single command line.
    pub(crate) fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(ToString::to_string).collect()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, spec: CommandSpec) -> CommandFuture<'_> {
        Box::pin(async move {
            let result = (self.responder)(&spec);
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(spec);
            result
        })
    }
}
