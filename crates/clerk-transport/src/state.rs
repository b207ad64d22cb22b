//! Shared handler state.

use std::sync::Arc;

use clerk_agent::{DEFAULT_MAX_PAGES, FormFiller};
use clerk_core::Worker;
use clerk_session::{SessionConfig, SessionRegistry};
use clerk_store::{DataDir, DocumentStore, PreferenceStore, ProfileStore, paths::DEFAULT_PROFILE};

/// Application state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub documents: DocumentStore,
    pub profile: ProfileStore,
    pub preferences: Arc<PreferenceStore>,
    pub max_pages: usize,
}

impl AppState {
    /// State rooted at `data`.
    #[must_use]
    pub fn new(data: &DataDir, config: SessionConfig) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new(config)),
            documents: DocumentStore::new(data.documents_dir()),
            profile: ProfileStore::new(data.profile_path(DEFAULT_PROFILE)),
            preferences: Arc::new(PreferenceStore::new(data.preferences_path())),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    #[must_use]
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Worker for a fresh session.
    #[must_use]
    pub fn worker(&self) -> Arc<dyn Worker> {
        Arc::new(
            FormFiller::new(self.profile.clone(), Arc::clone(&self.preferences))
                .with_max_pages(self.max_pages),
        )
    }
}
