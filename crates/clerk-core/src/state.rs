//! Session lifecycle state machine.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Session is created but the worker has not been started.
    Idle,
    /// Worker is running.
    Running,
    /// Worker is blocked on a question for the human.
    WaitingForHuman,
    /// Worker finished successfully.
    Done,
    /// Worker failed.
    Error,
    /// Session was stopped.
    Stopped,
}

impl SessionState {
    /// Wire name of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::WaitingForHuman => "waiting_for_human",
            Self::Done => "done",
            Self::Error => "error",
            Self::Stopped => "stopped",
        }
    }

    /// Whether no further transitions are accepted.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Stopped)
    }

    /// Apply a transition, returning the next state.
    ///
    /// `Stop` is idempotent: applied to `Stopped` it yields `Stopped`.
    ///
    /// # Errors
    /// Returns [`InvalidTransition`] if the transition is not legal from this state.
    pub const fn apply(self, transition: Transition) -> Result<Self, InvalidTransition> {
        let next = match (self, transition) {
            (Self::Idle, Transition::Start) => Self::Running,
            (Self::Running, Transition::AskHuman) => Self::WaitingForHuman,
            (Self::WaitingForHuman, Transition::AnswerReceived) => Self::Running,
            (Self::Running, Transition::FinishOk) => Self::Done,
            // A worker may also fail while a question is outstanding.
            (Self::Running | Self::WaitingForHuman, Transition::FinishError) => Self::Error,
            (Self::Idle | Self::Running | Self::WaitingForHuman | Self::Stopped, Transition::Stop) => {
                Self::Stopped
            }
            (from, transition) => return Err(InvalidTransition { from, transition }),
        };
        Ok(next)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State machine transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Start,
    AskHuman,
    AnswerReceived,
    FinishOk,
    FinishError,
    Stop,
}

impl Transition {
    /// Human-readable action, used in error messages.
    #[must_use]
    pub const fn action(self) -> &'static str {
        match self {
            Self::Start => "start session",
            Self::AskHuman => "ask human",
            Self::AnswerReceived => "provide answer",
            Self::FinishOk => "finish",
            Self::FinishError => "fail",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action())
    }
}

/// A transition that is not legal from the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Cannot {transition} in state {from}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub transition: Transition,
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    const ALL: [SessionState; 6] = [
        SessionState::Idle,
        SessionState::Running,
        SessionState::WaitingForHuman,
        SessionState::Done,
        SessionState::Error,
        SessionState::Stopped,
    ];

    #[test]
    fn test_happy_path() {
        let state = assert_ok!(SessionState::Idle
            .apply(Transition::Start)
            .and_then(|s| s.apply(Transition::AskHuman))
            .and_then(|s| s.apply(Transition::AnswerReceived))
            .and_then(|s| s.apply(Transition::AskHuman))
            .and_then(|s| s.apply(Transition::AnswerReceived))
            .and_then(|s| s.apply(Transition::FinishOk)));
        assert_eq!(state, SessionState::Done);
    }

    #[test]
    fn test_start_only_from_idle() {
        for state in ALL {
            let result = state.apply(Transition::Start);
            if state == SessionState::Idle {
                assert_eq!(result, Ok(SessionState::Running));
            } else {
                assert_err!(result, "start accepted from {state}");
            }
        }
    }

    #[test]
    fn test_answer_only_while_waiting() {
        for state in ALL {
            let result = state.apply(Transition::AnswerReceived);
            assert_eq!(result.is_ok(), state == SessionState::WaitingForHuman);
        }
    }

    #[test]
    fn test_stop_from_non_terminal_and_idempotent() {
        for state in ALL {
            let result = state.apply(Transition::Stop);
            match state {
                SessionState::Done | SessionState::Error => assert!(result.is_err()),
                _ => assert_eq!(result, Ok(SessionState::Stopped)),
            }
        }
    }

    #[test]
    fn test_terminal_states_reject_progress() {
        for state in ALL.into_iter().filter(|s| s.is_terminal()) {
            for transition in [
                Transition::Start,
                Transition::AskHuman,
                Transition::AnswerReceived,
                Transition::FinishOk,
                Transition::FinishError,
            ] {
                assert!(state.apply(transition).is_err());
            }
        }
    }

    #[test]
    fn test_error_message() {
        let err = SessionState::Running
            .apply(Transition::AnswerReceived)
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot provide answer in state running");
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&SessionState::WaitingForHuman).unwrap();
        assert_eq!(json, "\"waiting_for_human\"");
    }
}
