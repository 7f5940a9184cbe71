//! `scriptq-core`: types and configuration shared by every scriptq crate.
//!
//! The introspector produces [`types::ParameterSpec`] values, the command
//! builder consumes them, and the scheduler owns a queue of [`types::Task`]s.

pub mod config;
pub mod error;
pub mod types;

pub use error::{CoreError, Result};
pub use types::{Literal, ParamType, ParameterSpec, Task, TaskId, TaskKind, TaskStatus};
