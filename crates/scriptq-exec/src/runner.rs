//! `ProcessRunner`: launch one child, stream its output, report how it ended.
//!
//! The child's stdout and stderr share one pipe, so lines reach the sink in
//! the order the child wrote them. Cancellation sends SIGTERM, waits out the
//! grace period, then kills.

use std::{
    io::{BufRead, BufReader},
    process::Stdio,
    time::Duration,
};

use os_pipe::PipeReader;
use tokio::{
    process::{Child, Command},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ExecError, Result};

/// How a launched child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReport {
    /// The child exited on its own. `code` is `None` when it died by signal.
    Exited { code: Option<i32> },
    /// Cancellation was requested while the child was live.
    Stopped,
}

impl ExitReport {
    /// Exit code 0 with no stop requested.
    pub fn success(&self) -> bool {
        matches!(self, ExitReport::Exited { code: Some(0) })
    }
}

#[derive(Debug, Clone)]
pub struct ProcessRunner {
    grace: Duration,
}

impl ProcessRunner {
    /// `grace` is how long a terminated child gets before it is killed.
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    /// Run `argv` to completion, handing each output line to `sink`.
    ///
    /// # Errors
    ///
    /// - `EmptyCommand`: `argv` is empty.
    /// - `Spawn`:        the program could not be launched.
    /// - `Io`:           the output pipe could not be created, or waiting on
    ///                   the child failed.
    pub async fn run<F>(
        &self,
        argv: &[String],
        cancel: &CancellationToken,
        mut sink: F,
    ) -> Result<ExitReport>
    where
        F: FnMut(String) + Send,
    {
        let (program, args) = argv.split_first().ok_or(ExecError::EmptyCommand)?;

        let (reader, writer) = os_pipe::pipe()?;
        let stderr_writer = writer.try_clone()?;
        // The temporary Command owns the parent's write ends and drops with
        // this statement, so the pipe hits EOF once the child exits.
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(stderr_writer)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecError::Spawn {
                program: program.clone(),
                source,
            })?;

        debug!(pid = ?child.id(), program = %program, "child spawned");

        let (tx, mut rx) = mpsc::unbounded_channel();
        // Blocking reads stay off the runtime.
        std::thread::spawn(move || pump(reader, tx));

        // Drain until the pipe closes.
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.terminate(&mut child).await;
                    return Ok(ExitReport::Stopped);
                }
                line = rx.recv() => match line {
                    Some(line) => sink(line),
                    None => break,
                },
            }
        }

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.terminate(&mut child).await;
                return Ok(ExitReport::Stopped);
            }
            status = child.wait() => status?,
        };

        if cancel.is_cancelled() {
            return Ok(ExitReport::Stopped);
        }
        debug!(code = ?status.code(), "child exited");
        Ok(ExitReport::Exited {
            code: status.code(),
        })
    }

    async fn terminate(&self, child: &mut Child) {
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            // Safety: pid belongs to our own child, which has not been reaped.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
            match tokio::time::timeout(self.grace, child.wait()).await {
                Ok(_) => {
                    info!(pid, "child terminated");
                    return;
                }
                Err(_) => warn!(pid, grace_ms = self.grace.as_millis() as u64, "child ignored SIGTERM, killing"),
            }
        }

        if let Err(e) = child.kill().await {
            warn!(error = %e, "failed to kill child");
        }
    }
}

fn pump(reader: PipeReader, tx: mpsc::UnboundedSender<String>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                if tx.send(strip_text(&buf)).is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(error = %e, "output pipe read failed");
                break;
            }
        }
    }
}

/// Strip ANSI escape codes and convert bytes to a UTF-8 string.
fn strip_text(raw: &[u8]) -> String {
    let clean = strip_ansi_escapes::strip(raw);
    String::from_utf8_lossy(&clean).into_owned()
}
