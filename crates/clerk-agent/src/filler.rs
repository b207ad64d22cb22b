//! The form-filling decision loop.

use std::sync::Arc;

use async_trait::async_trait;
use clerk_core::{SessionControl, Worker, WorkerError};
use clerk_store::{PreferenceEntry, PreferenceStore, Preferences, Profile, ProfileStore, normalize};
use serde_json::{Value, json};

use crate::{
    matcher::profile_value,
    page::{Field, PageModel},
};

/// Pages visited before the run is abandoned.
pub const DEFAULT_MAX_PAGES: usize = 25;

/// Fills forms page by page from the profile, learned preferences and the
/// human.
pub struct FormFiller {
    profile: ProfileStore,
    preferences: Arc<PreferenceStore>,
    max_pages: usize,
}

/// Where a field's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Profile,
    Preference,
    Human,
}

#[derive(Debug, Default)]
struct Tally {
    pages: usize,
    filled: usize,
    asked: usize,
}

impl FormFiller {
    #[must_use]
    pub fn new(profile: ProfileStore, preferences: Arc<PreferenceStore>) -> Self {
        Self {
            profile,
            preferences,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    #[must_use]
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    async fn resolve(
        &self,
        control: &dyn SessionControl,
        page: &PageModel,
        field: &Field,
        profile: &Profile,
        prefs: &mut Preferences,
    ) -> Result<Option<(String, Source)>, WorkerError> {
        if let Some(value) = profile_value(profile, field).and_then(|v| field.pick_option(&v)) {
            return Ok(Some((value, Source::Profile)));
        }

        let question = field.question();
        if let Some(value) = prefs.get_answer(question).and_then(|v| field.pick_option(&v)) {
            return Ok(Some((value, Source::Preference)));
        }

        let answer = control.ask_human(question, &field.context(&page.title)).await?;
        let answer = answer.trim().to_string();
        if answer.is_empty() {
            return Ok(None);
        }
        self.remember(page, question, &answer, prefs).await;
        Ok(Some((answer, Source::Human)))
    }

    /// Persist a human answer so the same question is answered next time.
    async fn remember(&self, page: &PageModel, question: &str, answer: &str, prefs: &mut Preferences) {
        let source_url = (!page.url.is_empty()).then(|| page.url.clone());
        prefs.add_preference(question, answer, source_url.clone());

        let entry = PreferenceEntry {
            question: Some(question.to_string()),
            answer: Some(answer.to_string()),
            source_url,
        };
        if let Err(e) = self.preferences.merge([(normalize(question), entry)]).await {
            tracing::warn!(error = %e, "could not persist learned preference");
        }
    }

    async fn fill_page(
        &self,
        control: &dyn SessionControl,
        page: &PageModel,
        profile: &Profile,
        prefs: &mut Preferences,
        tally: &mut Tally,
    ) -> Result<(), WorkerError> {
        for field in page.fields.iter().filter(|f| f.is_fillable()) {
            let Some((value, source)) = self.resolve(control, page, field, profile, prefs).await?
            else {
                control.report(&format!("Skipping \"{}\"", field.question()));
                continue;
            };
            if source == Source::Human {
                tally.asked += 1;
            }
            tracing::debug!(field = %field.reference, ?source, "filling field");

            let result = control
                .execute_action("fill_field", json!({ "ref": field.reference, "value": value }))
                .await?;
            match action_error(&result) {
                Some(err) => control.report(&format!("Error filling {}: {err}", field.reference)),
                None => tally.filled += 1,
            }
        }
        Ok(())
    }
}

fn action_error(result: &Value) -> Option<String> {
    match result.get("error")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl Worker for FormFiller {
    async fn run(&self, control: Arc<dyn SessionControl>) -> Result<String, WorkerError> {
        let control = control.as_ref();
        let profile = self.profile.load().await;
        let mut prefs = self.preferences.load().await;
        control.report(&format!(
            "Loaded profile and {} learned preference(s)",
            prefs.len()
        ));

        let mut tally = Tally::default();
        loop {
            let raw = control.scan_page().await?;
            let page: PageModel = serde_json::from_value(raw)
                .map_err(|e| WorkerError::Failed(format!("Malformed page model: {e}")))?;
            tally.pages += 1;

            if page.fields.is_empty() {
                control.report("No form fields on this page");
                break;
            }
            // A fieldless page past the limit is still a clean finish.
            if tally.pages > self.max_pages {
                return Err(WorkerError::Failed(format!(
                    "Form still going after {} pages",
                    self.max_pages
                )));
            }
            self.fill_page(control, &page, &profile, &mut prefs, &mut tally)
                .await?;

            let Some(button) = page.navigation_button() else {
                control.report("No navigation button, stopping here");
                break;
            };
            control.report(&format!("Clicking \"{}\"", button.text));
            let result = control
                .execute_action("click_element", json!({ "ref": button.reference }))
                .await?;
            if let Some(err) = action_error(&result) {
                control.report(&format!("Error clicking {}: {err}", button.reference));
            }
        }

        let summary = format!(
            "Filled {} field(s) across {} page(s), asked {} question(s)",
            tally.filled, tally.pages, tally.asked
        );
        tracing::info!(%summary, "form filling finished");
        Ok(summary)
    }
}
