//! Request and response bodies.

use std::collections::BTreeMap;

use clerk_store::{DocumentInfo, PreferenceEntry};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `?session_id=` query.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionQuery {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartResponse {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub session_id: String,
    pub answer: String,
}

/// Page model scanned by the content script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageDataRequest {
    pub session_id: String,
    pub data: Value,
}

/// Outcome of a `fill_field` or `click_element` action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResultRequest {
    pub session_id: String,
    pub result: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopRequest {
    pub session_id: String,
}

/// Acknowledgement for mutating session calls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
}

impl Ack {
    pub const OK: Self = Self { ok: true };
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub documents_count: usize,
    pub profile_cached: bool,
    pub preferences_count: usize,
    pub active_sessions: usize,
}

/// Preferences to merge, keyed by normalised question.
///
/// Entries are kept raw so one malformed entry does not reject the batch.
#[derive(Debug, Clone, Deserialize)]
pub struct SavePreferencesRequest {
    #[serde(default)]
    pub preferences: BTreeMap<String, Value>,
}

impl SavePreferencesRequest {
    /// Entries that parse as preference objects.
    pub fn entries(self) -> impl Iterator<Item = (String, PreferenceEntry)> {
        self.preferences
            .into_iter()
            .filter_map(|(key, value)| match serde_json::from_value(value) {
                Ok(entry) => Some((key, entry)),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "skipping malformed preference entry");
                    None
                }
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavePreferencesResponse {
    pub merged: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletePreferenceResponse {
    pub deleted: String,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentsResponse {
    pub documents: Vec<DocumentInfo>,
    pub total: usize,
}

/// Extracted text of one document. Images come back as
/// `IMAGE_BASE64:<mime>:<data>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDocumentResponse {
    pub filename: String,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_malformed_preference_entries_are_dropped() {
        let req: SavePreferencesRequest = serde_json::from_value(json!({
            "preferences": {
                "referral": { "question": "Referral?", "answer": "Google" },
                "broken": "not an object",
                "partial": { "question": "Salary?" }
            }
        }))
        .unwrap();

        let keys: Vec<_> = req.entries().map(|(key, _)| key).collect();
        assert_eq!(keys, ["partial", "referral"]);
    }

    #[test]
    fn test_ack_shape() {
        assert_eq!(serde_json::to_value(Ack::OK).unwrap(), json!({ "ok": true }));
    }
}
