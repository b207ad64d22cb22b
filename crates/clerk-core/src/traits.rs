//! Error taxonomy and the traits that connect a worker to its session.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::{GateError, InvalidTransition, SessionState};

/// Session identifier.
pub type SessionId = String;

/// Allocate a fresh, globally unique session identifier.
#[must_use]
pub fn new_session_id() -> SessionId {
    Uuid::new_v4().simple().to_string()
}

/// Session error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Operation is illegal in the current state; the session continues.
    #[error("Cannot {action} in state {state}")]
    InvalidState {
        action: &'static str,
        state: SessionState,
    },
    #[error("Session {0:?} not found")]
    NotFound(SessionId),
    /// A gate woke because the session was stopped.
    #[error("Session stopped by user")]
    Stopped,
    #[error("{0} request superseded by a newer request")]
    Superseded(&'static str),
    /// Action names that coincide with lifecycle event kinds are reserved.
    #[error("Action name {0:?} is reserved")]
    ReservedAction(String),
}

impl From<InvalidTransition> for SessionError {
    fn from(err: InvalidTransition) -> Self {
        Self::InvalidState {
            action: err.transition.action(),
            state: err.from,
        }
    }
}

impl SessionError {
    /// Map a gate failure for the gate named `gate`.
    #[must_use]
    pub const fn from_gate(gate: &'static str, err: GateError) -> Self {
        match err {
            GateError::Cancelled => Self::Stopped,
            GateError::Superseded => Self::Superseded(gate),
        }
    }
}

/// Failure inside a worker's decision loop.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("{0}")]
    Failed(String),
}

impl WorkerError {
    /// Whether the worker ended because its session was stopped.
    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        matches!(self, Self::Session(SessionError::Stopped))
    }
}

/// The four blocking primitives a worker may call on its session.
///
/// Every call waits until the boundary replies or the session is stopped.
#[async_trait]
pub trait SessionControl: Send + Sync {
    /// Ask the remote browser for its current page model.
    async fn scan_page(&self) -> Result<Value, SessionError>;

    /// Ask the remote browser to perform `kind` with `payload`.
    async fn execute_action(&self, kind: &str, payload: Value) -> Result<Value, SessionError>;

    /// Ask the human a question and wait for the answer.
    async fn ask_human(&self, question: &str, field_context: &str) -> Result<String, SessionError>;

    /// Publish an informational `running` progress event.
    fn report(&self, message: &str);
}

/// An autonomous decision loop driven through a [`SessionControl`].
#[async_trait]
pub trait Worker: Send + Sync {
    /// Run to completion, returning a short summary.
    async fn run(&self, control: Arc<dyn SessionControl>) -> Result<String, WorkerError>;
}
