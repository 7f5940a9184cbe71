use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_INTERPRETER: &str = "python3";
pub const DEFAULT_UNBUFFERED_FLAG: &str = "-u";
pub const DEFAULT_SCRIPT_EXTENSION: &str = "py";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100; // observer drain cadence
pub const DEFAULT_SLEEP_SLICE_MS: u64 = 100; // sleep tasks wake this often
pub const DEFAULT_PAUSE_CHECK_MS: u64 = 200; // paused flag re-check
pub const DEFAULT_TERMINATE_GRACE_MS: u64 = 2_000; // SIGTERM → SIGKILL

/// Top-level config (scriptq.toml + SCRIPTQ_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptqConfig {
    #[serde(default)]
    pub interpreter: InterpreterConfig,
    #[serde(default)]
    pub scripts: ScriptsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// How the interpreter for a script is chosen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpreterConfig {
    /// Operator-configured interpreter. Used only if it names an existing file.
    pub path: Option<String>,
    /// Interpreter looked up on `PATH` when neither `path` nor a shebang applies.
    #[serde(default = "default_fallback")]
    pub fallback: String,
    /// Inserted right after the interpreter so output arrives line by line.
    #[serde(default = "default_unbuffered_flag")]
    pub unbuffered_flag: String,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            path: None,
            fallback: default_fallback(),
            unbuffered_flag: default_unbuffered_flag(),
        }
    }
}

/// Which files in a folder count as scripts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptFilter {
    /// Only scripts that declare at least one parameter.
    #[default]
    Cli,
    /// Every file with the configured extension.
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptsConfig {
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default)]
    pub filter: ScriptFilter,
    /// Folder used when none is given on the command line.
    pub folder: Option<String>,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            extension: default_extension(),
            filter: ScriptFilter::default(),
            folder: None,
        }
    }
}

/// Timing knobs for the execution worker and its observer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_sleep_slice_ms")]
    pub sleep_slice_ms: u64,
    #[serde(default = "default_pause_check_ms")]
    pub pause_check_ms: u64,
    #[serde(default = "default_terminate_grace_ms")]
    pub terminate_grace_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            sleep_slice_ms: DEFAULT_SLEEP_SLICE_MS,
            pause_check_ms: DEFAULT_PAUSE_CHECK_MS,
            terminate_grace_ms: DEFAULT_TERMINATE_GRACE_MS,
        }
    }
}

fn default_fallback() -> String {
    DEFAULT_INTERPRETER.to_string()
}
fn default_unbuffered_flag() -> String {
    DEFAULT_UNBUFFERED_FLAG.to_string()
}
fn default_extension() -> String {
    DEFAULT_SCRIPT_EXTENSION.to_string()
}
fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_sleep_slice_ms() -> u64 {
    DEFAULT_SLEEP_SLICE_MS
}
fn default_pause_check_ms() -> u64 {
    DEFAULT_PAUSE_CHECK_MS
}
fn default_terminate_grace_ms() -> u64 {
    DEFAULT_TERMINATE_GRACE_MS
}

impl ScriptqConfig {
    /// Load config from a TOML file with SCRIPTQ_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `SCRIPTQ_INTERPRETER__PATH=/usr/bin/python3.12`.
    /// A missing file is not an error; every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        debug!(path = %path, "loading config");

        let config: ScriptqConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("SCRIPTQ_").split("__"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

/// Directory holding scriptq's config and state files.
pub fn config_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.scriptq", home)
}

fn default_config_path() -> String {
    format!("{}/scriptq.toml", config_dir())
}
