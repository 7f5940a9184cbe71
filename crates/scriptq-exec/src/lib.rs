//! scriptq-exec: build a script's command line and run it.
//!
//! [`CommandBuilder`] resolves the interpreter, validates operator-supplied
//! values against the script's declared parameters and produces an
//! [`Invocation`]. [`ProcessRunner`] launches it and streams merged output.

pub mod command;
pub mod error;
pub mod interpreter;
pub mod runner;

pub use command::{validate_value, CommandBuilder, Invocation};
pub use error::{ExecError, Result};
pub use interpreter::{resolve_interpreter, InterpreterSource, ResolvedInterpreter};
pub use runner::{ExitReport, ProcessRunner};
