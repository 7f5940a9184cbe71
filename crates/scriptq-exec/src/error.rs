//! Error types for the scriptq-exec crate.

use scriptq_core::ParamType;
use thiserror::Error;

/// Failures that prevent a script attempt from running to completion.
#[derive(Debug, Error)]
pub enum ExecError {
    /// A supplied value does not convert to the parameter's declared type.
    /// Nothing is spawned.
    #[error("Invalid param {param}={value} (expected {expected})")]
    Validation {
        param: String,
        value: String,
        expected: ParamType,
    },

    /// The interpreter or script could not be launched.
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// An argv with no program in it.
    #[error("Empty command line")]
    EmptyCommand,

    /// Creating the output pipe or waiting on a launched child failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, ExecError>;
