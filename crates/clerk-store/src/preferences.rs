//! Answers learned from earlier sessions, keyed by normalised question text.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::StoreError;

static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("valid punctuation pattern"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Stable key for free-form question text.
///
/// Lowercases, trims, drops punctuation and collapses whitespace runs.
#[must_use]
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = PUNCTUATION.replace_all(lowered.trim(), "");
    WHITESPACE.replace_all(&stripped, " ").into_owned()
}

/// One learned answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preference {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub learned_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub times_used: u32,
}

/// All learned answers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub preferences: BTreeMap<String, Preference>,
}

impl Preferences {
    /// Look up an answer, counting the use.
    pub fn get_answer(&mut self, question: &str) -> Option<String> {
        let pref = self.preferences.get_mut(&normalize(question))?;
        pref.times_used += 1;
        Some(pref.answer.clone())
    }

    /// Insert a new answer or update an existing one.
    pub fn add_preference(&mut self, question: &str, answer: &str, source_url: Option<String>) {
        let now = Utc::now();
        self.preferences
            .entry(normalize(question))
            .and_modify(|existing| {
                existing.answer = answer.to_string();
                if source_url.is_some() {
                    existing.source_url.clone_from(&source_url);
                }
                existing.learned_at = Some(now);
            })
            .or_insert_with(|| Preference {
                question: question.trim().to_string(),
                answer: answer.to_string(),
                source_url: source_url.clone(),
                learned_at: Some(now),
                times_used: 0,
            });
    }

    /// Remove by key; the key is normalised first.
    pub fn remove_preference(&mut self, key: &str) -> bool {
        self.preferences.remove(&normalize(key)).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.preferences.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.preferences.is_empty()
    }

    /// Human-readable listing of every learned answer.
    #[must_use]
    pub fn to_context_string(&self) -> String {
        if self.preferences.is_empty() {
            return "No previously learned preferences.".to_string();
        }
        let mut out = String::from("Previously answered questions:");
        for pref in self.preferences.values() {
            out.push_str(&format!("\n- \"{}\" -> \"{}\"", pref.question, pref.answer));
        }
        out
    }
}

/// Incoming preference, as sent by clients. Entries missing a question or
/// an answer are skipped on merge.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreferenceEntry {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
}

/// Result of [`PreferenceStore::merge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub saved: usize,
    pub total: usize,
}

/// `preferences.json`.
///
/// Read-modify-write operations are serialised within the process.
#[derive(Debug)]
pub struct PreferenceStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl PreferenceStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load preferences. A missing or invalid file yields an empty set.
    pub async fn load(&self) -> Preferences {
        match self.try_load().await {
            Ok(prefs) => prefs,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load preferences, using empty set");
                Preferences::default()
            }
        }
    }

    async fn try_load(&self) -> Result<Preferences, StoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Preferences::default());
            }
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };
        serde_json::from_str(&raw).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })
    }

    /// Write preferences, creating the parent directory.
    ///
    /// # Errors
    /// Returns error if the file cannot be written.
    pub async fn save(&self, prefs: &Preferences) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(prefs).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| StoreError::io(&self.path, e))
    }

    /// Merge `entries` into the stored set.
    ///
    /// # Errors
    /// Returns error if the merged set cannot be written.
    pub async fn merge(
        &self,
        entries: impl IntoIterator<Item = (String, PreferenceEntry)>,
    ) -> Result<MergeOutcome, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut prefs = self.load().await;
        let mut saved = 0;
        for (key, entry) in entries {
            let (Some(question), Some(answer)) = (entry.question, entry.answer) else {
                tracing::warn!(key = %key, "skipping preference without question or answer");
                continue;
            };
            if question.is_empty() || answer.is_empty() {
                tracing::warn!(key = %key, "skipping preference without question or answer");
                continue;
            }
            prefs.add_preference(&question, &answer, entry.source_url);
            saved += 1;
        }
        self.save(&prefs).await?;
        tracing::info!(saved, total = prefs.len(), "preferences saved");
        Ok(MergeOutcome {
            saved,
            total: prefs.len(),
        })
    }

    /// Remove one preference; returns `Ok(None)` if the key was absent,
    /// otherwise the remaining count.
    ///
    /// # Errors
    /// Returns error if the reduced set cannot be written.
    pub async fn remove(&self, key: &str) -> Result<Option<usize>, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut prefs = self.load().await;
        if !prefs.remove_preference(key) {
            return Ok(None);
        }
        self.save(&prefs).await?;
        Ok(Some(prefs.len()))
    }
}
