//! scriptq-scheduler: the task queue and its execution worker.
//!
//! A [`Scheduler`] owns an ordered queue of script and sleep tasks. `run`
//! spawns one background worker that walks the queue (optionally several
//! times), launching each script through `scriptq-exec`. Everything the
//! worker has to say goes out on the Progress Channel, drained with
//! [`Scheduler::poll`].

pub mod engine;
pub mod error;
pub mod progress;
pub mod queue;
pub mod state;

pub use engine::Scheduler;
pub use error::{Result, SchedulerError};
pub use progress::{Progress, Severity};
pub use queue::{insert_index, TaskQueue, APPEND};
pub use state::{transition, Request, RunState};
