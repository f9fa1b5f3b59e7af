//! Typed views over raw history-log entries.
//!
//! Log payloads are stored as raw JSON; handlers parse only the entry they
//! act on, so one malformed entry never poisons the rest of the log.

use serde::Deserialize;
use serde_json::Value;

/// Causality token stamped on an entry by the write that created it.
#[must_use]
pub fn write_version(entry: &Value) -> Option<u64> {
    entry.get("writeVersion").and_then(Value::as_u64)
}

/// A `stateHistory` entry. Both fields must be non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateEntry {
    pub state: String,
    pub user: String,
}

impl StateEntry {
    /// Parse and validate a state-history entry.
    ///
    /// # Errors
    ///
    /// Returns a description of the first missing or empty field.
    pub fn parse(entry: &Value) -> Result<Self, String> {
        let state = non_empty_str(entry, "state")?;
        let user = non_empty_str(entry, "user")?;
        Ok(Self {
            state: state.to_string(),
            user: user.to_string(),
        })
    }
}

fn non_empty_str<'a>(entry: &'a Value, field: &str) -> Result<&'a str, String> {
    match entry.get(field) {
        Some(Value::String(value)) if !value.trim().is_empty() => Ok(value),
        Some(Value::String(_)) => Err(format!("`{field}` is empty")),
        Some(_) => Err(format!("`{field}` is not a string")),
        None => Err(format!("`{field}` is missing")),
    }
}

/// A `dueDates` entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DueDateEntry {
    /// Unix seconds.
    #[serde(default)]
    pub due_date: Option<f64>,
    /// Calendar day, `MM/DD/YYYY`.
    #[serde(default)]
    pub due_date_day: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
}

/// A `deferredDates` entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeferredDateEntry {
    #[serde(default)]
    pub deferred_date: Option<f64>,
    #[serde(default)]
    pub deferred_date_day: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
}

/// A `progressNotes` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressNoteEntry {
    pub progress_note: String,
    #[serde(default)]
    pub user: Option<String>,
}

/// A `completedPhotos` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPhotoEntry {
    #[serde(default, rename = "downloadURL")]
    pub download_url: Option<String>,
    #[serde(default, rename = "storageDBPath")]
    pub storage_db_path: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default, rename = "cardAttachment", alias = "trelloCardAttachement")]
    pub card_attachment: Option<String>,
}

impl CompletedPhotoEntry {
    /// Source URL when present and non-blank.
    #[must_use]
    pub fn source_url(&self) -> Option<&str> {
        self.download_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// True once an attachment has been written back for this photo.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.card_attachment
            .as_deref()
            .is_some_and(|id| !id.is_empty())
    }
}

/// Parse any typed entry view, mapping failures to a readable reason.
///
/// # Errors
///
/// Returns the serde error message when the entry does not match `T`.
pub fn parse_entry<T: for<'de> Deserialize<'de>>(entry: &Value) -> Result<T, String> {
    T::deserialize(entry).map_err(|err| err.to_string())
}
