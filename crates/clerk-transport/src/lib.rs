//! HTTP boundary for clerk-bot.
//!
//! Provides:
//! - Wire types for the browser extension and overlay
//! - The axum router: autofill session control, SSE progress stream, and
//!   the profile, preference and document endpoints

pub mod error;
pub mod protocol;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
