//! `Scheduler`: owns the queue and drives one background worker through it.
//!
//! Every method takes `&self`; wrap the scheduler in an `Arc` to share it
//! between an observer loop and whatever issues requests.

use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::Local;
use scriptq_core::{config::ScriptqConfig, Task, TaskKind, TaskStatus};
use scriptq_exec::{CommandBuilder, ExitReport, ProcessRunner};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::{Result, SchedulerError},
    progress::{Progress, ProgressSender},
    queue::TaskQueue,
    state::{transition, Request, RunState},
};

const BANNER_RULE: &str = "============================================================";
const SLEEP_RULE: &str = ">>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>";

/// How one task attempt (or a whole task) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepOutcome {
    Completed,
    Failed,
    Stopped,
}

pub struct Scheduler {
    shared: Arc<Shared>,
    progress_rx: Mutex<mpsc::UnboundedReceiver<Progress>>,
}

struct Shared {
    queue: Mutex<TaskQueue>,
    state: watch::Sender<RunState>,
    /// Cancelled by `stop`; replaced at the start of every run.
    cancel: Mutex<CancellationToken>,
    progress: ProgressSender,
    builder: CommandBuilder,
    runner: ProcessRunner,
    sleep_slice: Duration,
    pause_check: Duration,
}

impl Scheduler {
    /// Create an idle scheduler running scripts from `folder`.
    pub fn new(config: &ScriptqConfig, folder: impl Into<PathBuf>) -> Self {
        let (progress, progress_rx) = ProgressSender::channel();
        let (state, _) = watch::channel(RunState::Idle);
        let timing = &config.scheduler;

        let shared = Shared {
            queue: Mutex::new(TaskQueue::new()),
            state,
            cancel: Mutex::new(CancellationToken::new()),
            progress,
            builder: CommandBuilder::new(config.interpreter.clone(), folder),
            runner: ProcessRunner::new(Duration::from_millis(timing.terminate_grace_ms)),
            sleep_slice: Duration::from_millis(timing.sleep_slice_ms.max(1)),
            pause_check: Duration::from_millis(timing.pause_check_ms.max(1)),
        };

        Self {
            shared: Arc::new(shared),
            progress_rx: Mutex::new(progress_rx),
        }
    }

    pub fn state(&self) -> RunState {
        *self.shared.state.borrow()
    }

    /// Snapshot of the queue.
    pub fn tasks(&self) -> Vec<Task> {
        self.shared.queue.lock().unwrap().tasks().to_vec()
    }

    // -----------------------------------------------------------------------
    // Queue edits (idle only)
    // -----------------------------------------------------------------------

    /// Insert `task` at 1-based `position` (`-1` appends) and return its
    /// zero-based index.
    ///
    /// # Errors
    ///
    /// - `Busy`:        a run is active.
    /// - `InvalidTask`: a sleep with an unusable duration or an empty script.
    pub fn enqueue(&self, task: Task, position: i64) -> Result<usize> {
        self.edit(|q| q.insert(task, position))
    }

    /// Remove and return the task at zero-based `index`.
    pub fn dequeue(&self, index: usize) -> Result<Task> {
        self.edit(|q| q.remove(index))
    }

    pub fn clear_queue(&self) -> Result<()> {
        self.edit(|q| {
            q.clear();
            Ok(())
        })
    }

    pub fn update_params(&self, index: usize, params: BTreeMap<String, String>) -> Result<()> {
        self.edit(|q| q.update_params(index, params))
    }

    pub fn update_sleep(&self, index: usize, seconds: f64) -> Result<()> {
        self.edit(|q| q.update_sleep(index, seconds))
    }

    pub fn set_iterations(&self, index: usize, iterations: u32) -> Result<()> {
        self.edit(|q| q.set_iterations(index, iterations))
    }

    fn edit<T>(&self, f: impl FnOnce(&mut TaskQueue) -> Result<T>) -> Result<T> {
        let mut queue = self.shared.queue.lock().unwrap();
        let state = self.state();
        if state.is_active() {
            return Err(SchedulerError::Busy(state));
        }
        f(&mut queue)
    }

    // -----------------------------------------------------------------------
    // Run control
    // -----------------------------------------------------------------------

    /// Start the worker over the whole queue, `global_iterations` times
    /// (values below 1 run once). Returns as soon as the worker is spawned.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - `Busy`:       a run is already active.
    /// - `QueueEmpty`: nothing to run.
    pub fn run(&self, global_iterations: u32) -> Result<()> {
        let cancel = {
            let queue = self.shared.queue.lock().unwrap();
            let state = self.state();
            if state.is_active() {
                return Err(SchedulerError::Busy(state));
            }
            if queue.is_empty() {
                return Err(SchedulerError::QueueEmpty);
            }
            self.shared.start()?
        };

        info!(tasks = self.tasks().len(), global_iterations, "queue run started");
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            shared.drive_queue(global_iterations.max(1), &cancel).await;
            shared.finish();
        });
        Ok(())
    }

    /// Run one script immediately, outside the queue. Queue statuses are not
    /// touched. `stop` terminates it.
    ///
    /// # Errors
    ///
    /// - `Busy`: a run is already active.
    pub fn run_direct(&self, script: &str, params: BTreeMap<String, String>) -> Result<()> {
        let cancel = {
            let _queue = self.shared.queue.lock().unwrap();
            self.shared.start()?
        };

        info!(script, "direct run started");
        let shared = Arc::clone(&self.shared);
        let script = script.to_string();
        tokio::spawn(async move {
            let outcome = shared.run_script(&script, &params, &cancel).await;
            debug!(script = %script, ?outcome, "direct run ended");
            shared.finish();
        });
        Ok(())
    }

    /// Suspend the run at its next checkpoint.
    pub fn pause(&self) -> Result<()> {
        self.shared.request(Request::Pause)?;
        self.shared.progress.info(">>> Scheduler Paused...");
        info!("scheduler paused");
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        self.shared.request(Request::Resume)?;
        self.shared.progress.info(">>> Scheduler Resumed...");
        info!("scheduler resumed");
        Ok(())
    }

    /// Terminate any live process and abandon the rest of the run. Task
    /// statuses are left as they are.
    pub fn stop(&self) -> Result<()> {
        {
            let cancel = self.shared.cancel.lock().unwrap();
            self.shared.request(Request::Stop)?;
            cancel.cancel();
        }
        self.shared.progress.error(">>> Scheduler Stopped by User.");
        self.shared.progress.status_text("");
        info!("scheduler stop requested");
        Ok(())
    }

    /// Drain every pending progress message, oldest first.
    pub fn poll(&self) -> Vec<Progress> {
        let mut rx = self.progress_rx.lock().unwrap();
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    /// Wait until no run is active.
    pub async fn wait_idle(&self) {
        let mut rx = self.shared.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|s| *s == RunState::Idle).await;
    }
}

impl Shared {
    fn request(&self, request: Request) -> Result<RunState> {
        let mut outcome = Ok(RunState::Idle);
        self.state.send_if_modified(|state| match transition(*state, request) {
            Ok(next) => {
                debug!(from = %state, to = %next, %request, "state transition");
                outcome = Ok(next);
                let changed = next != *state;
                *state = next;
                changed
            }
            Err(e) => {
                outcome = Err(e);
                false
            }
        });
        outcome
    }

    /// Enter `Running` and hand out the token for the new run. The token lock
    /// is held across the transition, as in `stop`.
    fn start(&self) -> Result<CancellationToken> {
        let mut cancel = self.cancel.lock().unwrap();
        self.request(Request::Run)?;
        *cancel = CancellationToken::new();
        Ok(cancel.clone())
    }

    fn finish(&self) {
        if let Err(e) = self.request(Request::Finish) {
            warn!(error = %e, "worker finished in unexpected state");
        }
        self.progress.send(Progress::QueueFinished);
        info!("scheduler idle");
    }

    fn set_status(&self, index: usize, status: TaskStatus) {
        if let Err(e) = self.queue.lock().unwrap().set_status(index, status) {
            warn!(index, error = %e, "status update for missing task");
            return;
        }
        self.progress.status(index, status);
    }

    fn reset_all(&self) {
        let len = {
            let mut queue = self.queue.lock().unwrap();
            queue.reset_all();
            queue.len()
        };
        for index in 0..len {
            self.progress.status(index, TaskStatus::Pending);
        }
    }

    /// Block while paused. Returns `false` once a stop has been requested.
    async fn checkpoint(&self, cancel: &CancellationToken) -> bool {
        let mut rx = self.state.subscribe();
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            if *rx.borrow_and_update() != RunState::Paused {
                return true;
            }
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = rx.changed() => {}
                _ = tokio::time::sleep(self.pause_check) => {}
            }
        }
    }

    async fn drive_queue(&self, global_iterations: u32, cancel: &CancellationToken) {
        let all_finished = self.queue.lock().unwrap().all_finished();
        if all_finished {
            self.progress.info(">>> Queue is finished. Resetting for new run...");
            self.reset_all();
        }

        let mut completed_passes = 0;
        'passes: for pass in 1..=global_iterations {
            if pass > 1 {
                self.progress.info(format!(
                    "--- Restarting Queue (Iteration {pass}/{global_iterations}) ---"
                ));
                self.reset_all();
            } else if global_iterations > 1 {
                self.progress.info(format!(
                    "--- Starting Queue (Iteration 1/{global_iterations}) ---"
                ));
            }

            let len = self.queue.lock().unwrap().len();
            for index in 0..len {
                if !self.checkpoint(cancel).await {
                    break 'passes;
                }
                let task = match self.queue.lock().unwrap().get(index) {
                    Ok(task) => task.clone(),
                    Err(_) => break,
                };
                if task.status == TaskStatus::Done {
                    debug!(index, "skipping finished task");
                    continue;
                }
                if self.run_task(index, &task, cancel).await == StepOutcome::Stopped {
                    break 'passes;
                }
            }
            completed_passes = pass;

            if self.queue.lock().unwrap().any_failed() {
                if pass < global_iterations {
                    warn!(pass, "pass ended with failures, skipping remaining passes");
                }
                break;
            }
        }

        if cancel.is_cancelled() {
            info!(completed_passes, "queue run stopped");
        } else {
            info!(completed_passes, "queue run finished");
            self.progress.info("\n=== Scheduler Queue Finished ===\n");
        }
    }

    /// All inner iterations of the task at `index`.
    async fn run_task(&self, index: usize, task: &Task, cancel: &CancellationToken) -> StepOutcome {
        let of = task.iterations.max(1);
        for iteration in 1..=of {
            if iteration > 1 && !self.checkpoint(cancel).await {
                return StepOutcome::Stopped;
            }
            self.set_status(index, TaskStatus::Running { iteration, of });
            info!(
                task = index + 1,
                id = %task.id,
                label = %task.label(),
                iteration,
                of,
                "task attempt"
            );

            let outcome = match &task.kind {
                TaskKind::Sleep { seconds } => self.sleep(*seconds, cancel).await,
                TaskKind::Script { script, params } => {
                    self.run_script(script, params, cancel).await
                }
            };

            match outcome {
                StepOutcome::Completed => {}
                StepOutcome::Failed => {
                    self.set_status(index, TaskStatus::Failed);
                    warn!(task = index + 1, id = %task.id, iteration, "task failed");
                    return StepOutcome::Failed;
                }
                StepOutcome::Stopped => return StepOutcome::Stopped,
            }
        }
        self.set_status(index, TaskStatus::Done);
        StepOutcome::Completed
    }

    /// Wait `seconds` in slices. Time spent paused does not count.
    async fn sleep(&self, seconds: f64, cancel: &CancellationToken) -> StepOutcome {
        self.progress.info(format!(
            "\n{SLEEP_RULE}\n Sleeping for {seconds} seconds...\n{SLEEP_RULE}\n"
        ));
        let mut remaining = Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX);
        while !remaining.is_zero() {
            if !self.checkpoint(cancel).await {
                return StepOutcome::Stopped;
            }
            let slice = remaining.min(self.sleep_slice);
            tokio::select! {
                _ = cancel.cancelled() => return StepOutcome::Stopped,
                _ = tokio::time::sleep(slice) => {}
            }
            remaining = remaining.saturating_sub(slice);
        }
        StepOutcome::Completed
    }

    /// Build and run one attempt of `script`.
    async fn run_script(
        &self,
        script: &str,
        params: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> StepOutcome {
        let invocation = match self.builder.build(script, params) {
            Ok(invocation) => invocation,
            Err(e) => {
                warn!(script, error = %e, "invocation rejected");
                self.progress.error(format!("Error: {e}"));
                return StepOutcome::Failed;
            }
        };
        let command = invocation.command_line();

        self.progress.status_text(format!("Running: {script}..."));
        self.progress.info(format!("\n{BANNER_RULE}"));
        self.progress.info(format!("STARTED AT: {}", timestamp()));
        self.progress.info(format!("COMMAND:\n{command}"));
        self.progress.info(format!("{BANNER_RULE}\n"));

        let progress = self.progress.clone();
        let result = self
            .runner
            .run(&invocation.argv(), cancel, |line| progress.output(line))
            .await;

        let outcome = match result {
            Ok(ExitReport::Stopped) => StepOutcome::Stopped,
            Ok(report) => {
                self.progress.info(format!("\n{BANNER_RULE}"));
                self.progress.info(format!("COMMAND:\n{command}"));
                self.progress.info(format!("FINISHED AT: {}", timestamp()));
                self.progress.info(format!("{BANNER_RULE}\n"));
                match report {
                    ExitReport::Exited { code: Some(0) } => StepOutcome::Completed,
                    ExitReport::Exited { code } => {
                        let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
                        self.progress.error(format!("Process exited with status {code}"));
                        StepOutcome::Failed
                    }
                    ExitReport::Stopped => StepOutcome::Stopped,
                }
            }
            Err(e) => {
                warn!(script, error = %e, "script attempt failed");
                self.progress.error(format!("Scheduler Error: {e}"));
                StepOutcome::Failed
            }
        };

        self.progress.send(Progress::TaskFinished {
            success: outcome == StepOutcome::Completed,
        });
        self.progress.status_text("");
        outcome
    }
}

fn timestamp() -> String {
    Local::now().format("%a %b %e %H:%M:%S %Y").to_string()
}
