//! Wire codec for state-change events carried on the bus.
//!
//! # Format
//!
//! ```text
//! base64( "{property_id}/{item_id}/state/{state}[/{write_version}]" )
//! ```
//!
//! The third segment is a fixed literal kept for path shape; it carries no
//! data but must be present. The optional fifth segment is the item's
//! causality token at the time of the write; publishers that predate it
//! send four segments.
//!
//! Segments are not escaped. [`encode`] refuses any segment that is empty,
//! contains `/` or carries surrounding whitespace, so every encoded message
//! decodes back to the same fields.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use std::fmt;

/// Literal third path segment.
pub const STATE_SEGMENT: &str = "state";

/// Reasons a bus payload is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedEvent {
    #[error("empty payload")]
    Empty,

    #[error("payload is not valid base64: {0}")]
    Base64(String),

    #[error("payload is not valid UTF-8")]
    Utf8,

    #[error("expected at least 4 `/`-separated segments, found {found}")]
    MissingSegments { found: usize },

    #[error("`{0}` segment is empty")]
    EmptySegment(&'static str),

    #[error("`{0}` segment must not contain `/`")]
    Separator(&'static str),

    #[error("`{0}` segment must not start or end with whitespace")]
    Padded(&'static str),

    #[error("write version `{0}` is not an unsigned integer")]
    WriteVersion(String),
}

/// A decoded state-change notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateChangeEvent {
    pub property_id: String,
    pub item_id: String,
    /// State named by the publisher. Handlers only use it as a pre-check and
    /// re-read the stored item for everything else.
    pub state: String,
    pub write_version: Option<u64>,
}

impl StateChangeEvent {
    #[must_use]
    pub fn new(
        property_id: impl Into<String>,
        item_id: impl Into<String>,
        state: impl Into<String>,
    ) -> Self {
        Self {
            property_id: property_id.into(),
            item_id: item_id.into(),
            state: state.into(),
            write_version: None,
        }
    }

    #[must_use]
    pub const fn with_write_version(mut self, version: u64) -> Self {
        self.write_version = Some(version);
        self
    }

    /// Check that every segment survives a round trip through the path form.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedEvent`] naming the first offending segment.
    pub fn validate(&self) -> Result<(), MalformedEvent> {
        for (name, value) in [
            ("property", &self.property_id),
            ("item", &self.item_id),
            ("state", &self.state),
        ] {
            if value.trim().is_empty() {
                return Err(MalformedEvent::EmptySegment(name));
            }
            if value.contains('/') {
                return Err(MalformedEvent::Separator(name));
            }
            if value.trim() != value.as_str() {
                return Err(MalformedEvent::Padded(name));
            }
        }
        Ok(())
    }

    /// The unencoded path form of the event.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedEvent`] when a segment fails [`Self::validate`].
    pub fn to_path(&self) -> Result<String, MalformedEvent> {
        self.validate()?;
        Ok(self.raw_path())
    }

    fn raw_path(&self) -> String {
        let mut path = format!(
            "{}/{}/{STATE_SEGMENT}/{}",
            self.property_id, self.item_id, self.state
        );
        if let Some(version) = self.write_version {
            path.push('/');
            path.push_str(&version.to_string());
        }
        path
    }

    /// Parse the unencoded path form.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedEvent`] when segments are missing or empty, or the
    /// write version is not numeric.
    pub fn from_path(path: &str) -> Result<Self, MalformedEvent> {
        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() < 4 {
            return Err(MalformedEvent::MissingSegments {
                found: segments.len(),
            });
        }

        let property_id = required(segments[0], "property")?;
        let item_id = required(segments[1], "item")?;
        let state = required(segments[3], "state")?;

        let write_version = match segments.get(4).map(|raw| raw.trim()) {
            None | Some("") => None,
            Some(raw) => Some(
                raw.parse::<u64>()
                    .map_err(|_| MalformedEvent::WriteVersion(raw.to_string()))?,
            ),
        };

        Ok(Self {
            property_id: property_id.to_string(),
            item_id: item_id.to_string(),
            state: state.to_string(),
            write_version,
        })
    }
}

impl fmt::Display for StateChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw_path())
    }
}

fn required<'a>(segment: &'a str, name: &'static str) -> Result<&'a str, MalformedEvent> {
    let trimmed = segment.trim();
    if trimmed.is_empty() {
        Err(MalformedEvent::EmptySegment(name))
    } else {
        Ok(trimmed)
    }
}

/// Encode an event without a causality token.
///
/// # Errors
///
/// Returns [`MalformedEvent`] when a segment is empty, contains `/` or has
/// surrounding whitespace.
pub fn encode(property_id: &str, item_id: &str, state: &str) -> Result<String, MalformedEvent> {
    encode_event(&StateChangeEvent::new(property_id, item_id, state))
}

/// Encode an event for publishing.
///
/// # Errors
///
/// Same as [`encode`].
pub fn encode_event(event: &StateChangeEvent) -> Result<String, MalformedEvent> {
    Ok(BASE64.encode(event.to_path()?.as_bytes()))
}

/// Decode a raw bus message.
///
/// Surrounding whitespace is ignored; some bus clients append a newline.
///
/// # Errors
///
/// Returns [`MalformedEvent`] for an empty payload, invalid base64 or UTF-8,
/// fewer than four segments, or an empty property, item or state.
pub fn decode(raw: &str) -> Result<StateChangeEvent, MalformedEvent> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(MalformedEvent::Empty);
    }

    let bytes = BASE64
        .decode(raw)
        .map_err(|err| MalformedEvent::Base64(err.to_string()))?;
    let path = String::from_utf8(bytes).map_err(|_| MalformedEvent::Utf8)?;
    if path.trim().is_empty() {
        return Err(MalformedEvent::Empty);
    }

    StateChangeEvent::from_path(&path)
}
