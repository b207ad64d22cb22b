//! Page model reported by the browser extension.

use serde::{Deserialize, Serialize};

/// Field types the worker never fills.
const SKIPPED_TYPES: &[&str] = &["hidden", "submit", "button", "file", "image", "reset"];

/// Button text that moves a multi-page form forward.
const NAVIGATION_WORDS: &[&str] = &["next", "continue", "submit", "save", "apply"];

/// One form field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Field {
    #[serde(rename = "ref")]
    pub reference: String,
    pub tag: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub label: String,
    pub name: String,
    pub value: String,
    pub placeholder: String,
    pub required: bool,
    pub options: Vec<String>,
    pub checked: Option<bool>,
}

impl Field {
    fn is_toggle(&self) -> bool {
        matches!(self.kind.as_str(), "checkbox" | "radio")
    }

    /// Whether the worker should try to fill this field.
    #[must_use]
    pub fn is_fillable(&self) -> bool {
        if SKIPPED_TYPES.contains(&self.kind.as_str()) {
            return false;
        }
        if self.is_toggle() {
            return self.checked != Some(true);
        }
        self.value.trim().is_empty()
    }

    /// The text a human would read as this field's question.
    #[must_use]
    pub fn question(&self) -> &str {
        [&self.label, &self.placeholder, &self.name, &self.reference]
            .into_iter()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .unwrap_or_default()
    }

    /// All descriptive text, for keyword matching.
    #[must_use]
    pub fn haystack(&self) -> String {
        format!("{} {} {}", self.label, self.name, self.placeholder)
    }

    /// Context shown to the human next to the question.
    #[must_use]
    pub fn context(&self, page_title: &str) -> String {
        let kind = if self.kind.is_empty() { &self.tag } else { &self.kind };
        let mut context = format!("{kind} field");
        if !page_title.is_empty() {
            context.push_str(&format!(" on \"{page_title}\""));
        }
        if self.required {
            context.push_str(" (required)");
        }
        if !self.options.is_empty() {
            context.push_str(&format!(". Options: {}", self.options.join(", ")));
        }
        context
    }

    /// Coerce `value` to one of this field's options, if it has any.
    #[must_use]
    pub fn pick_option(&self, value: &str) -> Option<String> {
        if self.options.is_empty() {
            return Some(value.to_string());
        }
        let wanted = value.trim().to_lowercase();
        self.options
            .iter()
            .find(|opt| opt.trim().to_lowercase() == wanted)
            .or_else(|| {
                self.options
                    .iter()
                    .find(|opt| !wanted.is_empty() && opt.to_lowercase().contains(&wanted))
            })
            .cloned()
    }
}

/// One clickable button.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Button {
    #[serde(rename = "ref")]
    pub reference: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Scan of the current page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageModel {
    pub url: String,
    pub title: String,
    pub fields: Vec<Field>,
    pub buttons: Vec<Button>,
}

impl PageModel {
    /// The button that advances the form: first one whose text names a
    /// navigation step, else the first submit button.
    #[must_use]
    pub fn navigation_button(&self) -> Option<&Button> {
        self.buttons
            .iter()
            .find(|b| {
                let text = b.text.to_lowercase();
                NAVIGATION_WORDS.iter().any(|word| text.contains(word))
            })
            .or_else(|| self.buttons.iter().find(|b| b.kind == "submit"))
    }
}
