//! The run state machine.
//!
//! ```text
//!            run                 pause
//!   Idle ──────────▶ Running ◀──────────▶ Paused
//!    ▲                  │       resume      │
//!    │ finish           │ stop              │ stop
//!    │                  ▼                   │
//!    └──────────────  Stopped ◀─────────────┘
//! ```
//!
//! `finish` is issued by the worker when it exits, from any non-idle state.

use std::fmt;

use serde::Serialize;

use crate::error::{Result, SchedulerError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    /// A run is active but suspended at its next checkpoint.
    Paused,
    /// Stop requested; the worker is unwinding.
    Stopped,
}

impl RunState {
    /// `true` while a worker exists.
    pub fn is_active(&self) -> bool {
        !matches!(self, RunState::Idle)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Paused => "paused",
            RunState::Stopped => "stopping",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Request {
    Run,
    Pause,
    Resume,
    Stop,
    Finish,
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Request::Run => "run",
            Request::Pause => "pause",
            Request::Resume => "resume",
            Request::Stop => "stop",
            Request::Finish => "finish",
        })
    }
}

/// Next state for `request` in state `from`.
///
/// # Errors
///
/// - `Busy`:              `Run` while a run is active.
/// - `InvalidTransition`: any other request the state does not accept.
pub fn transition(from: RunState, request: Request) -> Result<RunState> {
    use Request::*;
    use RunState::*;

    match (from, request) {
        (Idle, Run) => Ok(Running),
        (_, Run) => Err(SchedulerError::Busy(from)),
        (Running, Pause) => Ok(Paused),
        (Paused, Resume) => Ok(Running),
        (Running | Paused, Stop) => Ok(Stopped),
        (Running | Paused | Stopped, Finish) => Ok(Idle),
        _ => Err(SchedulerError::InvalidTransition { from, request }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let s = transition(RunState::Idle, Request::Run).unwrap();
        let s = transition(s, Request::Pause).unwrap();
        assert_eq!(s, RunState::Paused);
        let s = transition(s, Request::Resume).unwrap();
        let s = transition(s, Request::Stop).unwrap();
        assert_eq!(s, RunState::Stopped);
        assert_eq!(transition(s, Request::Finish).unwrap(), RunState::Idle);
    }

    #[test]
    fn paused_run_can_be_stopped() {
        assert_eq!(
            transition(RunState::Paused, Request::Stop).unwrap(),
            RunState::Stopped
        );
    }

    #[test]
    fn second_run_is_busy() {
        for from in [RunState::Running, RunState::Paused, RunState::Stopped] {
            assert!(matches!(
                transition(from, Request::Run),
                Err(SchedulerError::Busy(s)) if s == from
            ));
        }
    }

    #[test]
    fn nonsense_requests_are_refused() {
        let refused = [
            (RunState::Idle, Request::Pause),
            (RunState::Idle, Request::Resume),
            (RunState::Idle, Request::Stop),
            (RunState::Idle, Request::Finish),
            (RunState::Running, Request::Resume),
            (RunState::Paused, Request::Pause),
            (RunState::Stopped, Request::Pause),
            (RunState::Stopped, Request::Stop),
        ];
        for (from, request) in refused {
            assert!(
                matches!(
                    transition(from, request),
                    Err(SchedulerError::InvalidTransition { .. })
                ),
                "{request} from {from}"
            );
        }
    }
}
