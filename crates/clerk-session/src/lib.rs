//! Autofill session orchestration for clerk-bot.
//!
//! Provides:
//! - `Session` - One worker run and its boundary-facing operations
//! - `SessionRegistry` - Process-wide table of live sessions

pub mod registry;
pub mod session;

pub use registry::SessionRegistry;
pub use session::{ActionRequest, Question, Session, SessionConfig, SessionSnapshot};
