//! External ticketing system contract.
//!
//! Every call is parameterized by the card id and the organization's
//! credentials. A 404 from any endpoint is reported as
//! [`TicketError::NotFound`] so handlers can run stale-reference cleanup.

pub mod http;
pub mod retry;

pub use http::HttpTicketing;
pub use retry::{RetryPolicy, is_retryable_status};

use serde::Serialize;

use crate::model::Credentials;

/// Fields of a card update. Unset fields are left out of the request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CardUpdate {
    /// `Some(None)` clears the due date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<Option<String>>,
    #[serde(rename = "dueComplete", skip_serializing_if = "Option::is_none")]
    pub due_complete: Option<bool>,
    #[serde(rename = "idList", skip_serializing_if = "Option::is_none")]
    pub id_list: Option<String>,
}

impl CardUpdate {
    /// True when the update would change nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.due.is_none() && self.due_complete.is_none() && self.id_list.is_none()
    }
}

/// Ticketing API failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TicketError {
    #[error("card {card_id} not found")]
    NotFound { card_id: String },

    #[error("{operation} failed with HTTP {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("{operation} transport error: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    #[error("{operation} returned an unreadable response: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },
}

impl TicketError {
    /// Whether the same request may succeed later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => is_retryable_status(*status),
            Self::Transport { .. } => true,
            Self::NotFound { .. } | Self::Decode { .. } => false,
        }
    }
}

/// Calls made against the external ticketing system.
pub trait TicketingApi: Send + Sync {
    /// Post a comment on a card.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError`] on HTTP or transport failure.
    fn create_comment(
        &self,
        card_id: &str,
        credentials: &Credentials,
        text: &str,
    ) -> Result<(), TicketError>;

    /// Apply a partial update to a card.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError`] on HTTP or transport failure.
    fn update_card(
        &self,
        card_id: &str,
        credentials: &Credentials,
        update: &CardUpdate,
    ) -> Result<(), TicketError>;

    /// Attach a file to a card by URL, returning the attachment id.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError`] on HTTP or transport failure, or when the
    /// response carries no id.
    fn create_attachment(
        &self,
        card_id: &str,
        credentials: &Credentials,
        url: &str,
    ) -> Result<String, TicketError>;
}
