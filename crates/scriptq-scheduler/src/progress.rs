//! Progress Channel: the worker's only way of talking to an observer.
//!
//! Unbounded and FIFO. The observer drains it with
//! [`Scheduler::poll`](crate::Scheduler::poll) on its own cadence.

use scriptq_core::TaskStatus;
use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Child output, stdout and stderr merged.
    Stdout,
    /// Scheduler errors and the stop notice.
    Stderr,
    /// Banners and other scheduler notices.
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Progress {
    /// A line for the console: child output or a scheduler notice.
    Output { text: String, severity: Severity },
    /// Task at zero-based `index` changed status.
    Status { index: usize, status: TaskStatus },
    /// The worker has exited and the scheduler is idle again.
    QueueFinished,
    /// A script attempt has delivered all of its output. `success` is false
    /// after a validation or launch error, a nonzero exit or a stop.
    TaskFinished { success: bool },
    /// Short one-line activity text. Empty clears it.
    StatusText(String),
}

/// Sending half. Sends after the observer is gone are dropped.
#[derive(Debug, Clone)]
pub(crate) struct ProgressSender {
    tx: mpsc::UnboundedSender<Progress>,
}

impl ProgressSender {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<Progress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub(crate) fn send(&self, message: Progress) {
        let _ = self.tx.send(message);
    }

    pub(crate) fn info(&self, text: impl Into<String>) {
        self.line(text, Severity::Info);
    }

    pub(crate) fn error(&self, text: impl Into<String>) {
        self.line(text, Severity::Stderr);
    }

    pub(crate) fn line(&self, text: impl Into<String>, severity: Severity) {
        self.send(Progress::Output {
            text: text.into(),
            severity,
        });
    }

    /// A line of child output. Both of the child's streams arrive merged.
    pub(crate) fn output(&self, text: String) {
        self.line(text, Severity::Stdout);
    }

    pub(crate) fn status(&self, index: usize, status: TaskStatus) {
        self.send(Progress::Status { index, status });
    }

    pub(crate) fn status_text(&self, text: impl Into<String>) {
        self.send(Progress::StatusText(text.into()));
    }
}
