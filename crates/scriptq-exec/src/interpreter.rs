//! Interpreter resolution for a script.
//!
//! Priority: the configured path, then a `#!` path on the script's first
//! line, then the fallback interpreter found on `PATH`. The first two apply
//! only when they name an existing file.

use std::{
    fmt,
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use scriptq_core::config::InterpreterConfig;
use serde::Serialize;
use tracing::debug;

/// Which rule selected the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpreterSource {
    Configured,
    Shebang,
    SystemDefault,
}

impl fmt::Display for InterpreterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InterpreterSource::Configured => "configured path",
            InterpreterSource::Shebang => "script shebang (#!)",
            InterpreterSource::SystemDefault => "system default",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedInterpreter {
    pub path: PathBuf,
    pub source: InterpreterSource,
}

/// Pick the interpreter for `script`.
///
/// Never fails. If the fallback is not on `PATH` its bare name is returned
/// and the launch itself reports the problem.
pub fn resolve_interpreter(config: &InterpreterConfig, script: &Path) -> ResolvedInterpreter {
    if let Some(configured) = config.path.as_deref().map(str::trim) {
        if !configured.is_empty() && Path::new(configured).is_file() {
            return ResolvedInterpreter {
                path: PathBuf::from(configured),
                source: InterpreterSource::Configured,
            };
        }
        debug!(path = configured, "configured interpreter is not a file, ignoring");
    }

    if let Some(path) = shebang_path(script) {
        return ResolvedInterpreter {
            path,
            source: InterpreterSource::Shebang,
        };
    }

    let path = which::which(&config.fallback).unwrap_or_else(|e| {
        debug!(fallback = %config.fallback, error = %e, "fallback interpreter not found on PATH");
        PathBuf::from(&config.fallback)
    });
    ResolvedInterpreter {
        path,
        source: InterpreterSource::SystemDefault,
    }
}

/// The text after `#!` on the first line, if it is an existing file.
///
/// `#!/usr/bin/env python3` does not qualify: the whole remainder is taken
/// as one path.
fn shebang_path(script: &Path) -> Option<PathBuf> {
    let file = File::open(script).ok()?;
    let mut first = String::new();
    BufReader::new(file).read_line(&mut first).ok()?;

    let rest = first.strip_prefix("#!")?.trim();
    let candidate = PathBuf::from(rest);
    (!rest.is_empty() && candidate.is_file()).then_some(candidate)
}
