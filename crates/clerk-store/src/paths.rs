//! Data directory layout.

use std::path::{Path, PathBuf};

use crate::error::StoreError;

pub const DOCUMENTS_DIR: &str = "documents";
pub const PROFILES_DIR: &str = "profiles";
pub const PREFERENCES_FILE: &str = "preferences.json";
pub const DEFAULT_PROFILE: &str = "default";

/// Root of the clerk-bot data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `~/.clerk-bot`, or `None` when no home directory is known.
    #[must_use]
    pub fn default_root() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".clerk-bot"))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn documents_dir(&self) -> PathBuf {
        self.root.join(DOCUMENTS_DIR)
    }

    #[must_use]
    pub fn profiles_dir(&self) -> PathBuf {
        self.root.join(PROFILES_DIR)
    }

    /// Path of the named profile (without extension).
    #[must_use]
    pub fn profile_path(&self, name: &str) -> PathBuf {
        self.profiles_dir().join(format!("{name}.json"))
    }

    #[must_use]
    pub fn preferences_path(&self) -> PathBuf {
        self.root.join(PREFERENCES_FILE)
    }

    /// Create `documents/` and `profiles/` if missing.
    ///
    /// # Errors
    /// Returns error if a directory cannot be created.
    pub async fn ensure(&self) -> Result<(), StoreError> {
        for dir in [self.documents_dir(), self.profiles_dir()] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| StoreError::io(&dir, e))?;
        }
        Ok(())
    }
}
