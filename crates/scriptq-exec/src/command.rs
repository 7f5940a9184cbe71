//! `CommandBuilder`: turns a script task into a validated argv.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use scriptq_core::{config::InterpreterConfig, ParamType, ParameterSpec};
use tracing::{debug, warn};

use crate::{
    error::{ExecError, Result},
    interpreter::{resolve_interpreter, InterpreterSource},
};

/// A fully built command line, ready for [`ProcessRunner`](crate::ProcessRunner).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub interpreter: PathBuf,
    pub interpreter_source: InterpreterSource,
    pub script: PathBuf,
    /// Everything after the interpreter: unbuffered flag, script, then
    /// flag/value pairs.
    pub args: Vec<String>,
}

impl Invocation {
    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.interpreter.display().to_string());
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Space-joined argv, for banners and logs.
    pub fn command_line(&self) -> String {
        self.argv().join(" ")
    }
}

/// Builds invocations for scripts that live in one folder.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    config: InterpreterConfig,
    folder: PathBuf,
}

impl CommandBuilder {
    pub fn new(config: InterpreterConfig, folder: impl Into<PathBuf>) -> Self {
        Self {
            config,
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Full path of `script`. Absolute names are used as given.
    pub fn script_path(&self, script: &str) -> PathBuf {
        self.folder.join(script)
    }

    /// Build the argv for `script` with `params` keyed by canonical name.
    ///
    /// The script is re-inspected on every call. Declared parameters are
    /// emitted in declaration order as `raw_flag value`; empty values are
    /// left out and values for names the script does not declare are
    /// dropped.
    ///
    /// # Errors
    ///
    /// - `Validation`: a value does not convert to its declared type.
    pub fn build(&self, script: &str, params: &BTreeMap<String, String>) -> Result<Invocation> {
        let script_path = self.script_path(script);
        let resolved = resolve_interpreter(&self.config, &script_path);
        let declared = scriptq_introspect::inspect(&script_path).parameters;

        for name in params.keys() {
            if !declared.iter().any(|spec| &spec.name == name) {
                warn!(script, param = %name, "value supplied for undeclared parameter, dropping");
            }
        }

        let mut args = Vec::with_capacity(2 + declared.len() * 2);
        if !self.config.unbuffered_flag.is_empty() {
            args.push(self.config.unbuffered_flag.clone());
        }
        args.push(script_path.display().to_string());

        for spec in &declared {
            let Some(value) = params.get(&spec.name).filter(|v| !v.is_empty()) else {
                continue;
            };
            validate_value(spec, value)?;
            args.push(spec.flag.clone());
            args.push(value.clone());
        }

        debug!(
            script,
            interpreter = %resolved.path.display(),
            source = %resolved.source,
            "built invocation"
        );

        Ok(Invocation {
            interpreter: resolved.path,
            interpreter_source: resolved.source,
            script: script_path,
            args,
        })
    }
}

/// Check that `value` converts to `spec`'s declared type.
///
/// Booleans accept any non-empty text, matching how the scripts themselves
/// coerce `type=bool`.
pub fn validate_value(spec: &ParameterSpec, value: &str) -> Result<()> {
    let ok = match spec.param_type {
        ParamType::String | ParamType::Boolean => true,
        ParamType::Integer => is_integer(value.trim()),
        ParamType::Float => is_float(value.trim()),
    };
    if ok {
        Ok(())
    } else {
        Err(ExecError::Validation {
            param: spec.name.clone(),
            value: value.to_string(),
            expected: spec.param_type,
        })
    }
}

fn is_integer(text: &str) -> bool {
    let digits = text.strip_prefix(['+', '-']).unwrap_or(text);
    !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit() || c == '_')
        && underscores_between_digits(digits)
}

fn is_float(text: &str) -> bool {
    if !underscores_between_digits(text) {
        return false;
    }
    text.replace('_', "").parse::<f64>().is_ok()
}

/// `1_000` is fine; `_1`, `1_` and `1__0` are not.
fn underscores_between_digits(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.iter().enumerate().all(|(i, &b)| {
        b != b'_'
            || (i > 0
                && i + 1 < bytes.len()
                && bytes[i - 1].is_ascii_digit()
                && bytes[i + 1].is_ascii_digit())
    })
}
