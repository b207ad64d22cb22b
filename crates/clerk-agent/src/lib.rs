//! Form-filling worker for clerk-bot.
//!
//! The worker reads the page model the browser reports, fills what it can
//! from the user's profile and learned preferences, asks the human for the
//! rest, and clicks through to the next page.

pub mod filler;
pub mod matcher;
pub mod page;

pub use filler::{DEFAULT_MAX_PAGES, FormFiller};
pub use page::{Button, Field, PageModel};
