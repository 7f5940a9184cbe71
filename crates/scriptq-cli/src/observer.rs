//! Terminal observer: drains the Progress Channel on a fixed cadence and
//! forwards operator commands from stdin and Ctrl-C.

use std::{io::BufRead, sync::Arc, time::Duration};

use scriptq_core::TaskStatus;
use scriptq_scheduler::{Progress, Scheduler, Severity};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::console_log::ConsoleLog;

/// One line of terminal output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    Out(String),
    Err(String),
}

impl Rendered {
    pub fn text(&self) -> &str {
        match self {
            Rendered::Out(text) | Rendered::Err(text) => text,
        }
    }
}

/// What the observer saw over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Observed {
    /// Script attempts that ended in an error, a nonzero exit or a stop.
    pub failed_attempts: usize,
}

/// Render `message` for the terminal. `labels` names tasks by index.
pub fn render(message: &Progress, labels: &[String]) -> Option<Rendered> {
    match message {
        Progress::Output { text, severity } => Some(match severity {
            Severity::Stdout | Severity::Info => Rendered::Out(text.clone()),
            Severity::Stderr => Rendered::Err(text.clone()),
        }),
        Progress::Status { index, status } => {
            let label = labels.get(*index).map(String::as_str).unwrap_or("?");
            let line = format!("[{}] {label}: {status}", index + 1);
            Some(match status {
                TaskStatus::Failed => Rendered::Err(line),
                _ => Rendered::Out(line),
            })
        }
        Progress::StatusText(text) if !text.is_empty() => Some(Rendered::Err(format!("» {text}"))),
        Progress::StatusText(_) | Progress::TaskFinished { .. } | Progress::QueueFinished => None,
    }
}

fn emit(line: &Rendered) {
    match line {
        Rendered::Out(text) => println!("{text}"),
        Rendered::Err(text) => eprintln!("{text}"),
    }
}

/// Operator commands accepted on stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Pause,
    Resume,
    Stop,
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "p" | "pause" => Some(Command::Pause),
            "r" | "resume" => Some(Command::Resume),
            "s" | "stop" | "q" | "quit" => Some(Command::Stop),
            _ => None,
        }
    }
}

fn apply(scheduler: &Scheduler, command: Command) {
    let result = match command {
        Command::Pause => scheduler.pause(),
        Command::Resume => scheduler.resume(),
        Command::Stop => scheduler.stop(),
    };
    if let Err(e) = result {
        warn!(?command, error = %e, "request refused");
        eprintln!("{e}");
    }
}

/// Stdin lines, read on a plain thread.
fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "stdin closed");
                    break;
                }
            }
        }
    });
    rx
}

/// Show `message` and copy it to `log`. Transient status text stays off
/// the log.
fn show(message: &Progress, labels: &[String], log: &mut Option<ConsoleLog>) {
    let Some(line) = render(message, labels) else {
        return;
    };
    emit(&line);
    if let Some(log) = log.as_mut() {
        if !matches!(message, Progress::StatusText(_)) {
            log.record(line.text());
        }
    }
}

/// Observe the active run until the worker reports it is finished.
pub async fn observe(
    scheduler: Arc<Scheduler>,
    poll_interval: Duration,
    mut log: Option<ConsoleLog>,
) -> Observed {
    let labels: Vec<String> = scheduler.tasks().iter().map(|t| t.label()).collect();
    let mut ticker = tokio::time::interval(poll_interval);
    let mut stdin = stdin_lines();
    let mut stdin_open = true;
    let mut interrupted = false;
    let mut observed = Observed::default();

    if let Some(log) = log.as_mut() {
        let notice = format!(">>> Console logging enabled to: {}", log.path().display());
        println!("{notice}");
        log.record(&notice);
    }

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let mut finished = false;
                for message in scheduler.poll() {
                    match message {
                        Progress::QueueFinished => finished = true,
                        Progress::TaskFinished { success: false } => observed.failed_attempts += 1,
                        _ => {}
                    }
                    show(&message, &labels, &mut log);
                }
                if finished {
                    break;
                }
            }
            line = stdin.recv(), if stdin_open => match line {
                Some(line) => match Command::parse(&line) {
                    Some(command) => apply(&scheduler, command),
                    None if line.trim().is_empty() => {}
                    None => eprintln!("unknown command {:?} (pause, resume, stop)", line.trim()),
                },
                None => stdin_open = false,
            },
            result = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                if let Err(e) = result {
                    warn!(error = %e, "ctrl-c handler failed");
                }
                apply(&scheduler, Command::Stop);
            }
        }
    }
    observed
}
