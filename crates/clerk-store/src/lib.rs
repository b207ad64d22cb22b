//! On-disk records used by clerk-bot sessions.
//!
//! Everything lives under one data directory:
//! - `documents/` - user-supplied files, parsed on demand
//! - `profiles/<name>.json` - the aggregated user profile
//! - `preferences.json` - answers learned from earlier sessions

pub mod documents;
pub mod error;
pub mod paths;
pub mod preferences;
pub mod profile;

pub use documents::{DocumentInfo, DocumentStore};
pub use error::{DocumentError, StoreError};
pub use paths::DataDir;
pub use preferences::{
    MergeOutcome, Preference, PreferenceEntry, PreferenceStore, Preferences, normalize,
};
pub use profile::{
    Address, Education, IdentificationDocument, InsuranceInfo, PersonalInfo, Profile, ProfileStore,
    WorkExperience,
};
