use thiserror::Error;

use crate::state::{Request, RunState};

/// Requests the scheduler refuses. Per-task failures are never reported
/// here; they become a `Failed` status plus a progress message.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// `run` on a queue with no tasks.
    #[error("Queue is empty")]
    QueueEmpty,

    /// A run is active; edits and new runs must wait until it is idle.
    #[error("Scheduler is busy ({0})")]
    Busy(RunState),

    /// The request makes no sense in the current state.
    #[error("Cannot {request} while {from}")]
    InvalidTransition { from: RunState, request: Request },

    #[error("Index {index} out of range for queue of {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Invalid task: {0}")]
    InvalidTask(String),
}

impl From<scriptq_core::CoreError> for SchedulerError {
    fn from(e: scriptq_core::CoreError) -> Self {
        match e {
            scriptq_core::CoreError::InvalidTask(msg) => SchedulerError::InvalidTask(msg),
            other => SchedulerError::InvalidTask(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
