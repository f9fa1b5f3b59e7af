//! Document store abstraction and backends.
//!
//! Handlers only talk to [`DocumentStore`]. Backends:
//! - [`MemoryStore`] for tests and embedding
//! - [`SqliteStore`] for the CLI and single-node deployments
//! - [`MirroredStore`] to keep a legacy store in step during migrations
//!
//! Multi-document writes (card link/unlink) are atomic in every backend.

pub mod memory;
pub mod mirror;
pub mod sqlite;

pub use memory::MemoryStore;
pub use mirror::MirroredStore;
pub use sqlite::SqliteStore;

use serde_json::Value;

use crate::cards::CardReference;
use crate::model::{Credentials, LogName, PropertyIntegration, UserProfile};

/// Failures raised by store backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("document encoding: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("store lock poisoned")]
    Poisoned,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    Backend(String),
}

/// Keyed document access used by the sync engine.
pub trait DocumentStore: Send + Sync {
    /// Raw deficient-item document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure; a missing item is `Ok(None)`.
    fn item(&self, item_id: &str) -> Result<Option<Value>, StoreError>;

    /// Insert or replace a deficient-item document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    fn put_item(&self, item_id: &str, document: &Value) -> Result<(), StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    fn property_integration(
        &self,
        property_id: &str,
    ) -> Result<Option<PropertyIntegration>, StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    fn put_property_integration(&self, integration: &PropertyIntegration)
    -> Result<(), StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    fn credentials(&self, organization_id: &str) -> Result<Option<Credentials>, StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    fn put_credentials(
        &self,
        organization_id: &str,
        credentials: &Credentials,
    ) -> Result<(), StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    fn user(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    fn put_user(&self, user_id: &str, profile: &UserProfile) -> Result<(), StoreError>;

    /// Card linked to `item_id` within `property_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    fn find_card(
        &self,
        property_id: &str,
        item_id: &str,
    ) -> Result<Option<CardReference>, StoreError>;

    /// Item linked to a card within its organization and property.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    fn item_for_card(
        &self,
        organization_id: &str,
        property_id: &str,
        card_id: &str,
    ) -> Result<Option<String>, StoreError>;

    /// Write the index entry and, when the item exists, its card pointer.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the item is already linked to a
    /// different card or the card to a different item. An existing reference
    /// is never re-pointed.
    fn insert_card(&self, reference: &CardReference) -> Result<(), StoreError>;

    /// Remove the index entry and the item's matching card pointer together.
    /// Returns `false` when neither existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure; nothing is removed then.
    fn remove_card(&self, reference: &CardReference) -> Result<bool, StoreError>;

    /// Record the attachment id on one completed-photo entry.
    /// Returns `false` when the item or entry no longer exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    fn set_photo_attachment(
        &self,
        item_id: &str,
        entry_id: &str,
        attachment_id: &str,
    ) -> Result<bool, StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    fn has_comment_receipt(&self, key: &str) -> Result<bool, StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    fn record_comment_receipt(&self, key: &str) -> Result<(), StoreError>;
}

/// Receipt key for a comment posted on `card_id` for one history entry.
#[must_use]
pub fn comment_receipt_key(card_id: &str, log: LogName, entry_id: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in [card_id, log.field(), entry_id] {
        hasher.update(part.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize().to_hex().to_string()
}
