//! Ordered task queue with 1-based positional insert.

use std::collections::BTreeMap;

use scriptq_core::{types::validate_sleep, Task, TaskKind, TaskStatus};

use crate::error::{Result, SchedulerError};

/// Position value meaning "append".
pub const APPEND: i64 = -1;

/// Zero-based index at which a task lands when inserted at 1-based
/// `position` into a queue of `len`.
///
/// `-1` or anything `>= len` appends. Anything below 1 clamps to the front.
pub fn insert_index(len: usize, position: i64) -> usize {
    if position == APPEND {
        return len;
    }
    match usize::try_from(position) {
        Ok(p) if p >= len => len,
        Ok(p) if p >= 1 => p - 1,
        _ => 0,
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskQueue {
    tasks: Vec<Task>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, index: usize) -> Result<&Task> {
        self.tasks.get(index).ok_or(SchedulerError::IndexOutOfRange {
            index,
            len: self.tasks.len(),
        })
    }

    fn get_mut(&mut self, index: usize) -> Result<&mut Task> {
        let len = self.tasks.len();
        self.tasks
            .get_mut(index)
            .ok_or(SchedulerError::IndexOutOfRange { index, len })
    }

    /// Insert `task` at 1-based `position` and return its zero-based index.
    ///
    /// # Errors
    ///
    /// - `InvalidTask`: a sleep task with an unusable duration.
    pub fn insert(&mut self, mut task: Task, position: i64) -> Result<usize> {
        match task.kind {
            TaskKind::Sleep { seconds } => {
                validate_sleep(seconds)?;
                task.iterations = 1;
            }
            TaskKind::Script { ref script, .. } => {
                if script.trim().is_empty() {
                    return Err(SchedulerError::InvalidTask(
                        "script name is empty".to_string(),
                    ));
                }
                task.iterations = task.iterations.max(1);
            }
        }
        let index = insert_index(self.tasks.len(), position);
        self.tasks.insert(index, task);
        Ok(index)
    }

    pub fn remove(&mut self, index: usize) -> Result<Task> {
        self.get(index)?;
        Ok(self.tasks.remove(index))
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    pub fn set_status(&mut self, index: usize, status: TaskStatus) -> Result<()> {
        self.get_mut(index)?.status = status;
        Ok(())
    }

    /// Set every task back to `Pending`.
    pub fn reset_all(&mut self) {
        for task in &mut self.tasks {
            task.status = TaskStatus::Pending;
        }
    }

    /// `true` when non-empty and every task is `Done` or `Failed`.
    pub fn all_finished(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.iter().all(|t| t.status.is_finished())
    }

    pub fn any_failed(&self) -> bool {
        self.tasks.iter().any(|t| t.status == TaskStatus::Failed)
    }

    /// Replace a script task's parameter values.
    pub fn update_params(&mut self, index: usize, params: BTreeMap<String, String>) -> Result<()> {
        match &mut self.get_mut(index)?.kind {
            TaskKind::Script { params: current, .. } => {
                *current = params;
                Ok(())
            }
            TaskKind::Sleep { .. } => Err(SchedulerError::InvalidTask(format!(
                "task {} is a sleep task and has no parameters",
                index + 1
            ))),
        }
    }

    /// Change a sleep task's duration.
    pub fn update_sleep(&mut self, index: usize, seconds: f64) -> Result<()> {
        validate_sleep(seconds)?;
        match &mut self.get_mut(index)?.kind {
            TaskKind::Sleep { seconds: current } => {
                *current = seconds;
                Ok(())
            }
            TaskKind::Script { .. } => Err(SchedulerError::InvalidTask(format!(
                "task {} is not a sleep task",
                index + 1
            ))),
        }
    }

    /// Change a script task's inner repeat count. Values below 1 become 1.
    pub fn set_iterations(&mut self, index: usize, iterations: u32) -> Result<()> {
        let task = self.get_mut(index)?;
        if task.is_sleep() {
            return Err(SchedulerError::InvalidTask(format!(
                "task {} is a sleep task and always runs once",
                index + 1
            )));
        }
        task.iterations = iterations.max(1);
        Ok(())
    }
}
