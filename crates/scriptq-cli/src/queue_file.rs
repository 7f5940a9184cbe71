//! TOML queue definitions.
//!
//! ```toml
//! iterations = 2
//!
//! [[task]]
//! script = "reconstruct.py"
//! iterations = 3
//! params = { p = 42, ring = "all" }
//!
//! [[task]]
//! sleep = 5.0
//! position = 1
//! ```

use std::{collections::BTreeMap, path::Path};

use anyhow::{bail, Context};
use scriptq_core::Task;
use scriptq_scheduler::{Scheduler, APPEND};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueueFile {
    /// Whole-queue repeat count.
    pub iterations: Option<u32>,
    #[serde(default, rename = "task")]
    pub tasks: Vec<TaskEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskEntry {
    pub script: Option<String>,
    /// Seconds; makes this a sleep task.
    pub sleep: Option<f64>,
    #[serde(default)]
    pub params: BTreeMap<String, toml::Value>,
    #[serde(default = "one")]
    pub iterations: u32,
    /// 1-based insert position; `-1` appends.
    #[serde(default = "append")]
    pub position: i64,
}

fn one() -> u32 {
    1
}

fn append() -> i64 {
    APPEND
}

impl QueueFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading queue file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing queue file {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Enqueue every entry in file order, each at its own position.
    pub fn enqueue_into(self, scheduler: &Scheduler) -> anyhow::Result<usize> {
        let count = self.tasks.len();
        for (n, entry) in self.tasks.into_iter().enumerate() {
            let position = entry.position;
            let task = entry
                .into_task()
                .with_context(|| format!("task #{}", n + 1))?;
            scheduler
                .enqueue(task, position)
                .with_context(|| format!("task #{}", n + 1))?;
        }
        Ok(count)
    }
}

impl TaskEntry {
    pub fn into_task(self) -> anyhow::Result<Task> {
        match (self.script, self.sleep) {
            (Some(script), None) => {
                let params = self
                    .params
                    .into_iter()
                    .map(|(k, v)| (k, value_text(v)))
                    .collect();
                Ok(Task::script(script, params, self.iterations))
            }
            (None, Some(seconds)) => {
                if !self.params.is_empty() {
                    bail!("sleep tasks take no params");
                }
                Ok(Task::sleep(seconds)?)
            }
            (Some(_), Some(_)) => bail!("set either `script` or `sleep`, not both"),
            (None, None) => bail!("missing `script` or `sleep`"),
        }
    }
}

/// Values are passed to scripts as text; bare TOML strings lose their quotes.
fn value_text(value: toml::Value) -> String {
    match value {
        toml::Value::String(s) => s,
        other => other.to_string(),
    }
}
