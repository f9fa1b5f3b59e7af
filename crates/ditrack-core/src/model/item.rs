use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::{fmt, str::FromStr};

/// An append-only history log: opaque entry id to entry payload.
///
/// Payloads stay as raw JSON so that entries without a numeric `createdAt`
/// (or of an unexpected shape) survive deserialization and can be excluded
/// by the resolver instead of failing the whole document.
pub type HistoryLog = BTreeMap<String, Value>;

/// The deficient-item lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum State {
    Pending,
    RequiresAction,
    GoBack,
    RequiresProgressUpdate,
    Deferred,
    Incomplete,
    Completed,
    Closed,
}

impl State {
    /// All known states in lifecycle order.
    pub const ALL: [Self; 8] = [
        Self::Pending,
        Self::RequiresAction,
        Self::GoBack,
        Self::RequiresProgressUpdate,
        Self::Deferred,
        Self::Incomplete,
        Self::Completed,
        Self::Closed,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::RequiresAction => "requires-action",
            Self::GoBack => "go-back",
            Self::RequiresProgressUpdate => "requires-progress-update",
            Self::Deferred => "deferred",
            Self::Incomplete => "incomplete",
            Self::Completed => "completed",
            Self::Closed => "closed",
        }
    }

    /// States that finish the item's lifecycle on the ticket board.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Completed)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

impl FromStr for State {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == normalized)
            .ok_or_else(|| ParseEnumError {
                expected: "state",
                got: s.to_string(),
            })
    }
}

/// Human label for a stored responsibility-group code.
///
/// Unknown codes are passed through untouched so new groups still render.
#[must_use]
pub fn responsibility_group_label(code: &str) -> &str {
    match code {
        "site_level_in-house" => "Site Level, In-House",
        "site_level_managed_by_corporate" => "Site Level, Managed By Corporate",
        "corporate" => "Corporate",
        "corporate_manages_vendor" => "Corporate, Manages Vendor",
        other => other,
    }
}

/// The named history logs an item owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogName {
    StateHistory,
    DueDates,
    DeferredDates,
    ProgressNotes,
    CompletedPhotos,
}

impl LogName {
    /// Document field the log is stored under.
    #[must_use]
    pub const fn field(self) -> &'static str {
        match self {
            Self::StateHistory => "stateHistory",
            Self::DueDates => "dueDates",
            Self::DeferredDates => "deferredDates",
            Self::ProgressNotes => "progressNotes",
            Self::CompletedPhotos => "completedPhotos",
        }
    }
}

impl fmt::Display for LogName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field())
    }
}

/// The item's own pointer to its external ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardPointer {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A deficient item as read from the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeficientItem {
    #[serde(skip)]
    pub id: String,
    pub property: String,
    #[serde(default)]
    pub inspection: String,
    #[serde(default)]
    pub item: String,
    pub state: String,
    /// Timestamp (seconds) of the last write to the document.
    #[serde(default)]
    pub updated_at: Option<f64>,
    /// Monotonic token bumped by every write to the document.
    #[serde(default)]
    pub write_version: Option<u64>,
    #[serde(default)]
    pub item_title: Option<String>,
    #[serde(default)]
    pub section_title: Option<String>,
    #[serde(default)]
    pub current_due_date_day: Option<String>,
    #[serde(default)]
    pub current_deferred_date_day: Option<String>,
    #[serde(default)]
    pub current_responsibility_group: Option<String>,
    #[serde(default)]
    pub current_plan_to_fix: Option<String>,
    #[serde(default)]
    pub current_complete_now_reason: Option<String>,
    #[serde(default)]
    pub current_reason_incomplete: Option<String>,
    #[serde(default)]
    pub state_history: Option<HistoryLog>,
    #[serde(default)]
    pub due_dates: Option<HistoryLog>,
    #[serde(default)]
    pub deferred_dates: Option<HistoryLog>,
    #[serde(default)]
    pub progress_notes: Option<HistoryLog>,
    #[serde(default)]
    pub completed_photos: Option<HistoryLog>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<CardPointer>,
}

impl DeficientItem {
    /// Read an item from its stored JSON document.
    ///
    /// # Errors
    ///
    /// Returns the deserialization error when required fields are missing
    /// or have the wrong type.
    pub fn from_document(id: &str, document: Value) -> Result<Self, serde_json::Error> {
        let mut item: Self = serde_json::from_value(document)?;
        item.id = id.to_string();
        Ok(item)
    }

    /// Borrow one of the item's history logs, if present.
    #[must_use]
    pub const fn log(&self, name: LogName) -> Option<&HistoryLog> {
        match name {
            LogName::StateHistory => self.state_history.as_ref(),
            LogName::DueDates => self.due_dates.as_ref(),
            LogName::DeferredDates => self.deferred_dates.as_ref(),
            LogName::ProgressNotes => self.progress_notes.as_ref(),
            LogName::CompletedPhotos => self.completed_photos.as_ref(),
        }
    }

    /// True when the named log holds at least one entry.
    #[must_use]
    pub fn has_entries(&self, name: LogName) -> bool {
        self.log(name).is_some_and(|log| !log.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Document mutation helpers shared by store backends
// ---------------------------------------------------------------------------

/// Field on a completed-photo entry holding the ticket attachment id.
pub const PHOTO_ATTACHMENT_FIELD: &str = "cardAttachment";

/// Set the attachment id on one completed-photo entry.
///
/// Returns `false` when the entry does not exist in the document.
pub fn set_photo_attachment(document: &mut Value, entry_id: &str, attachment_id: &str) -> bool {
    let Some(entry) = document
        .get_mut(LogName::CompletedPhotos.field())
        .and_then(|log| log.get_mut(entry_id))
        .and_then(Value::as_object_mut)
    else {
        return false;
    };
    entry.insert(
        PHOTO_ATTACHMENT_FIELD.to_string(),
        Value::String(attachment_id.to_string()),
    );
    true
}

/// Write the item's denormalized card pointer.
pub fn set_card_pointer(document: &mut Value, pointer: &CardPointer) -> bool {
    let Some(object) = document.as_object_mut() else {
        return false;
    };
    match serde_json::to_value(pointer) {
        Ok(value) => {
            object.insert("card".to_string(), value);
            true
        }
        Err(_) => false,
    }
}

/// Remove the item's denormalized card pointer.
///
/// Only removes the pointer when it still names `card_id`, so a cleanup
/// racing a re-link does not drop the newer card.
pub fn clear_card_pointer(document: &mut Value, card_id: &str) -> bool {
    let Some(object) = document.as_object_mut() else {
        return false;
    };
    let matches = object
        .get("card")
        .and_then(|card| card.get("id"))
        .and_then(Value::as_str)
        .is_some_and(|id| id == card_id);
    if matches {
        object.remove("card");
    }
    matches
}
