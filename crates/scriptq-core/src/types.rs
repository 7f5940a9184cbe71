//! Shared data types for scriptq.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::error::{CoreError, Result};

// ---------------------------------------------------------------------------
// ParamType
// ---------------------------------------------------------------------------

/// Declared type of a script parameter.
///
/// Only used to validate operator-supplied values before launch; the value
/// itself is always passed to the script verbatim.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    #[default]
    String,
    Integer,
    Float,
    Boolean,
}

impl ParamType {
    /// Map a `type=` name to a declared type. Unknown names are strings.
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "int" => ParamType::Integer,
            "float" => ParamType::Float,
            "bool" => ParamType::Boolean,
            _ => ParamType::String,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "str",
            ParamType::Integer => "int",
            ParamType::Float => "float",
            ParamType::Boolean => "bool",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Literal
// ---------------------------------------------------------------------------

/// A literal default value recovered from script source.
///
/// Only the allow-listed kinds are representable; anything else in a
/// `default=` position is reported as "no default".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(true) => f.write_str("True"),
            Literal::Bool(false) => f.write_str("False"),
            Literal::Int(n) => write!(f, "{n}"),
            // Debug keeps the trailing `.0` so `0.0` does not render as `0`.
            Literal::Float(x) => write!(f, "{x:?}"),
            Literal::Str(s) => f.write_str(s),
        }
    }
}

// ---------------------------------------------------------------------------
// ParameterSpec
// ---------------------------------------------------------------------------

/// The declared shape of one command-line argument a script accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Flag token exactly as declared, e.g. `-f` or `--count`.
    pub flag: String,

    /// Flag with leading dashes removed. Keys the task's value map.
    pub name: String,

    /// `help=` text, empty when absent or not a string literal.
    pub help: String,

    pub param_type: ParamType,

    pub required: bool,

    /// `None` when no default was declared or it was not a literal.
    pub default: Option<Literal>,
}

impl ParameterSpec {
    /// Build a spec for `flag` with every other field at its default.
    pub fn new(flag: impl Into<String>) -> Self {
        let flag = flag.into();
        let name = canonical_name(&flag).to_string();
        Self {
            flag,
            name,
            help: String::new(),
            param_type: ParamType::String,
            required: false,
            default: None,
        }
    }
}

/// Strip leading dashes from a flag token.
pub fn canonical_name(flag: &str) -> &str {
    flag.trim_start_matches('-')
}

// ---------------------------------------------------------------------------
// TaskId
// ---------------------------------------------------------------------------

/// Opaque identifier for a queued task.
///
/// Positions shift as the queue is edited; the id does not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a queued task within one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    /// `iteration` is 1-based; `of` is the task's iteration count.
    Running { iteration: u32, of: u32 },
    Done,
    Failed,
}

impl TaskStatus {
    /// `true` for `Done` and `Failed`.
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => f.write_str("Pending"),
            TaskStatus::Running { of, .. } if *of <= 1 => f.write_str("Running..."),
            TaskStatus::Running { iteration, of } => write!(f, "Run {iteration}/{of}"),
            TaskStatus::Done => f.write_str("Done"),
            TaskStatus::Failed => f.write_str("Failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// What a task does when the worker reaches it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskKind {
    /// Run `script` (a file name inside the scripts folder, or an absolute
    /// path) with `params` keyed by canonical parameter name.
    Script {
        script: String,
        #[serde(default)]
        params: BTreeMap<String, String>,
    },

    /// Wait for `seconds` without launching anything.
    Sleep { seconds: f64 },
}

/// A unit of schedulable work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    /// Inner repeat count, always ≥ 1. Sleep tasks are fixed at 1.
    pub iterations: u32,
    pub status: TaskStatus,
}

impl Task {
    /// A pending script task. `iterations` below 1 is raised to 1.
    pub fn script(
        script: impl Into<String>,
        params: BTreeMap<String, String>,
        iterations: u32,
    ) -> Self {
        Self {
            id: TaskId::new(),
            kind: TaskKind::Script {
                script: script.into(),
                params,
            },
            iterations: iterations.max(1),
            status: TaskStatus::Pending,
        }
    }

    /// A pending sleep task.
    ///
    /// # Errors
    ///
    /// - `InvalidTask`: `seconds` is negative, NaN or infinite.
    pub fn sleep(seconds: f64) -> Result<Self> {
        validate_sleep(seconds)?;
        Ok(Self {
            id: TaskId::new(),
            kind: TaskKind::Sleep { seconds },
            iterations: 1,
            status: TaskStatus::Pending,
        })
    }

    pub fn is_sleep(&self) -> bool {
        matches!(self.kind, TaskKind::Sleep { .. })
    }

    /// Short human label: the script name, or `Sleep: N sec`.
    pub fn label(&self) -> String {
        match &self.kind {
            TaskKind::Script { script, .. } => script.clone(),
            TaskKind::Sleep { seconds } => format!("Sleep: {seconds} sec"),
        }
    }
}

/// Reject sleep durations that cannot be waited out.
pub fn validate_sleep(seconds: f64) -> Result<()> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(CoreError::InvalidTask(format!(
            "sleep duration must be a finite number ≥ 0, got {seconds}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_name_strips_all_leading_dashes() {
        assert_eq!(canonical_name("--count"), "count");
        assert_eq!(canonical_name("-f"), "f");
        assert_eq!(canonical_name("path"), "path");
        assert_eq!(canonical_name("--dry-run"), "dry-run");
    }

    #[test]
    fn unknown_type_names_fall_back_to_string() {
        assert_eq!(ParamType::from_type_name("int"), ParamType::Integer);
        assert_eq!(ParamType::from_type_name("float"), ParamType::Float);
        assert_eq!(ParamType::from_type_name("bool"), ParamType::Boolean);
        assert_eq!(ParamType::from_type_name("str"), ParamType::String);
        assert_eq!(ParamType::from_type_name("Path"), ParamType::String);
    }

    #[test]
    fn running_status_is_annotated_only_for_repeats() {
        let single = TaskStatus::Running { iteration: 1, of: 1 };
        let repeated = TaskStatus::Running { iteration: 2, of: 3 };
        assert_eq!(single.to_string(), "Running...");
        assert_eq!(repeated.to_string(), "Run 2/3");
    }

    #[test]
    fn finished_covers_done_and_failed() {
        assert!(TaskStatus::Done.is_finished());
        assert!(TaskStatus::Failed.is_finished());
        assert!(!TaskStatus::Pending.is_finished());
        assert!(!TaskStatus::Running { iteration: 1, of: 1 }.is_finished());
    }

    #[test]
    fn script_iterations_are_at_least_one() {
        let task = Task::script("a.py", BTreeMap::new(), 0);
        assert_eq!(task.iterations, 1);
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[test]
    fn sleep_rejects_negative_and_nan() {
        assert!(Task::sleep(-1.0).is_err());
        assert!(Task::sleep(f64::NAN).is_err());
        assert!(Task::sleep(f64::INFINITY).is_err());
        let t = Task::sleep(0.0).unwrap();
        assert_eq!(t.iterations, 1);
        assert!(t.is_sleep());
    }

    #[test]
    fn literal_display_matches_source_spelling() {
        assert_eq!(Literal::Bool(true).to_string(), "True");
        assert_eq!(Literal::Int(10).to_string(), "10");
        assert_eq!(Literal::Float(0.0).to_string(), "0.0");
        assert_eq!(Literal::Str("hdf".into()).to_string(), "hdf");
    }

    #[test]
    fn task_serializes_with_kind_tag() {
        let task = Task::sleep(1.5).unwrap();
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["kind"]["kind"], "sleep");
        assert_eq!(json["status"]["state"], "pending");
    }
}
