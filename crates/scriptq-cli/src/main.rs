use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use scriptq_core::{
    config::{ScriptFilter, ScriptqConfig},
    Task, TaskStatus,
};
use scriptq_scheduler::Scheduler;
use tracing::{info, warn};

mod console_log;
mod observer;
mod queue_file;
mod state;

use console_log::ConsoleLog;
use queue_file::QueueFile;
use state::{state_path, CliState};

/// Inspect, queue and run standalone command-line scripts.
#[derive(Debug, Parser)]
#[command(name = "scriptq", version)]
struct Cli {
    /// Scripts folder. Defaults to the config value, then the last folder used.
    #[arg(long, short, global = true)]
    folder: Option<PathBuf>,

    /// Interpreter to use when it exists, ahead of any shebang.
    #[arg(long, global = true)]
    interpreter: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List scripts in the folder.
    List(ListArgs),
    /// Show the parameters a script declares.
    Inspect(InspectArgs),
    /// Show which interpreter a script would run under.
    Interpreter(ScriptArg),
    /// Run a queue file.
    Run(RunArgs),
    /// Run one script right away, outside any queue.
    Exec(ExecArgs),
}

#[derive(Debug, Args)]
struct ListArgs {
    /// Include scripts that declare no parameters.
    #[arg(long)]
    all: bool,
}

#[derive(Debug, Args)]
struct InspectArgs {
    script: String,
    /// Emit JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct ScriptArg {
    script: String,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// TOML queue definition.
    queue: PathBuf,
    /// Whole-queue repeat count; overrides the file.
    #[arg(long, short = 'n')]
    iterations: Option<u32>,
    #[command(flatten)]
    console: ConsoleArgs,
}

#[derive(Debug, Args)]
struct ConsoleArgs {
    /// Also append console output to this file, timestamped.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl ConsoleArgs {
    fn open(&self) -> anyhow::Result<Option<ConsoleLog>> {
        self.log_file.as_deref().map(ConsoleLog::open).transpose()
    }
}

#[derive(Debug, Args)]
struct ExecArgs {
    script: String,
    /// Parameter value as NAME=VALUE, NAME without leading dashes.
    #[arg(long = "param", short = 'p', value_parser = parse_param)]
    params: Vec<(String, String)>,
    #[command(flatten)]
    console: ConsoleArgs,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got {raw:?}"))?;
    let name = name.trim().trim_start_matches('-');
    if name.is_empty() {
        return Err(format!("missing parameter name in {raw:?}"));
    }
    Ok((name.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,scriptq=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // config: SCRIPTQ_CONFIG env > ~/.scriptq/scriptq.toml
    let config_path = std::env::var("SCRIPTQ_CONFIG").ok();
    let mut config = ScriptqConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        ScriptqConfig::default()
    });
    if let Some(interpreter) = cli.interpreter.clone() {
        config.interpreter.path = Some(interpreter);
    }

    let folder = resolve_folder(cli.folder.as_deref(), &config);

    match cli.command {
        Command::List(args) => {
            let filter = if args.all {
                ScriptFilter::All
            } else {
                config.scripts.filter
            };
            for name in scriptq_introspect::list_scripts(&folder, &config.scripts.extension, filter)
            {
                println!("{name}");
            }
        }
        Command::Inspect(args) => inspect(&folder.join(&args.script), args.json)?,
        Command::Interpreter(args) => {
            let resolved =
                scriptq_exec::resolve_interpreter(&config.interpreter, &folder.join(&args.script));
            println!("{} ({})", resolved.path.display(), resolved.source);
        }
        Command::Run(args) => {
            let file = QueueFile::load(&args.queue)?;
            let iterations = args.iterations.or(file.iterations).unwrap_or(1);
            let scheduler = Arc::new(Scheduler::new(&config, &folder));
            let count = file.enqueue_into(&scheduler)?;
            info!(tasks = count, iterations, folder = %folder.display(), "queue loaded");

            let log = args.console.open()?;
            scheduler.run(iterations)?;
            observer::observe(Arc::clone(&scheduler), poll_interval(&config), log).await;
            scheduler.wait_idle().await;
            report(&scheduler)?;
        }
        Command::Exec(args) => {
            let log = args.console.open()?;
            let params: BTreeMap<String, String> = args.params.into_iter().collect();
            let scheduler = Arc::new(Scheduler::new(&config, &folder));
            scheduler.run_direct(&args.script, params)?;
            let observed =
                observer::observe(Arc::clone(&scheduler), poll_interval(&config), log).await;
            scheduler.wait_idle().await;
            if observed.failed_attempts > 0 {
                bail!("{} did not complete successfully", args.script);
            }
        }
    }

    Ok(())
}

/// Explicit flag (remembered for next time) > config > last used > cwd.
fn resolve_folder(explicit: Option<&Path>, config: &ScriptqConfig) -> PathBuf {
    let path = state_path();
    if let Some(folder) = explicit {
        let state = CliState {
            last_folder: Some(folder.display().to_string()),
        };
        if let Err(e) = state.save(&path) {
            warn!(error = %e, "could not remember folder");
        }
        return folder.to_path_buf();
    }
    config
        .scripts
        .folder
        .clone()
        .or_else(|| CliState::load(&path).last_folder)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn poll_interval(config: &ScriptqConfig) -> Duration {
    Duration::from_millis(config.scheduler.poll_interval_ms.max(1))
}

fn inspect(script: &Path, json: bool) -> anyhow::Result<()> {
    let found = scriptq_introspect::try_inspect(script)
        .with_context(|| format!("inspecting {}", script.display()))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&found)?);
        return Ok(());
    }
    if !found.has_interface {
        println!("{}: no command-line parameters", script.display());
        return Ok(());
    }
    for p in &found.parameters {
        let default = p
            .default
            .as_ref()
            .map_or_else(|| "-".to_string(), ToString::to_string);
        let required = if p.required { "required" } else { "optional" };
        println!(
            "{:<16} {:<6} {:<9} default={:<10} {}",
            p.flag,
            p.param_type.as_str(),
            required,
            default,
            p.help
        );
    }
    Ok(())
}

fn report(scheduler: &Scheduler) -> anyhow::Result<()> {
    let tasks = scheduler.tasks();
    let failed = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Failed)
        .count();
    let done = tasks.iter().filter(|t| t.status == TaskStatus::Done).count();
    info!(done, failed, total = tasks.len(), "run summary");
    for line in failure_lines(&tasks) {
        eprintln!("{line}");
    }
    if failed > 0 {
        bail!("{failed} of {} task(s) failed", tasks.len());
    }
    Ok(())
}

/// One line per failed task, naming it by label and id.
fn failure_lines(tasks: &[Task]) -> Vec<String> {
    tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Failed)
        .map(|t| format!("failed: {} [{}]", t.label(), t.id))
        .collect()
}
