//! Core coordination primitives for clerk-bot autofill sessions.
//!
//! This crate provides the fundamental building blocks:
//! - `SessionState` - Lifecycle states and legal transitions
//! - `Gate` - Single-slot rendezvous between the worker and the boundary
//! - `EventChannel` - Ordered progress events with keep-alive draining
//! - `Worker` and `SessionControl` traits

pub mod events;
pub mod gate;
pub mod state;
pub mod traits;

pub use events::{Drained, EventChannel, EventKind, ProgressEvent};
pub use gate::{Gate, GateError, Waiter};
pub use state::{InvalidTransition, SessionState, Transition};
pub use traits::{SessionControl, SessionError, SessionId, Worker, WorkerError, new_session_id};
