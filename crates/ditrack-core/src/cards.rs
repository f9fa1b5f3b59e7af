//! Card reference index: external ticket id to deficient item.
//!
//! A reference lives in two places that must agree: the scoped index entry
//! `(organization, property, card) -> item` and the item's denormalized
//! `card` pointer. Store backends write and remove both together.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::CardPointer;
use crate::store::{DocumentStore, StoreError};

/// One linked ticket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardReference {
    pub organization_id: String,
    pub property_id: String,
    pub card_id: String,
    pub item_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl CardReference {
    #[must_use]
    pub fn new(
        organization_id: impl Into<String>,
        property_id: impl Into<String>,
        card_id: impl Into<String>,
        item_id: impl Into<String>,
    ) -> Self {
        Self {
            organization_id: organization_id.into(),
            property_id: property_id.into(),
            card_id: card_id.into(),
            item_id: item_id.into(),
            url: None,
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// The pointer denormalized onto the item document.
    #[must_use]
    pub fn pointer(&self) -> CardPointer {
        CardPointer {
            id: self.card_id.clone(),
            url: self.url.clone(),
        }
    }
}

/// Card linked to an item, if any.
///
/// # Errors
///
/// Returns [`StoreError`] when the index cannot be read.
pub fn lookup(
    store: &dyn DocumentStore,
    property_id: &str,
    item_id: &str,
) -> Result<Option<CardReference>, StoreError> {
    let found = store.find_card(property_id, item_id)?;
    debug!(property_id, item_id, found = found.is_some(), "card lookup");
    Ok(found)
}

/// Item a card is linked to within its organization and property.
///
/// # Errors
///
/// Returns [`StoreError`] when the index cannot be read.
pub fn item_for_card(
    store: &dyn DocumentStore,
    organization_id: &str,
    property_id: &str,
    card_id: &str,
) -> Result<Option<String>, StoreError> {
    store.item_for_card(organization_id, property_id, card_id)
}

/// Link a newly opened ticket to its item.
///
/// # Errors
///
/// Returns [`StoreError`] when the index or item pointer cannot be written,
/// including when the item or the card is already linked elsewhere.
pub fn register(store: &dyn DocumentStore, reference: &CardReference) -> Result<(), StoreError> {
    store.insert_card(reference)?;
    info!(
        organization_id = %reference.organization_id,
        property_id = %reference.property_id,
        item_id = %reference.item_id,
        card_id = %reference.card_id,
        "card reference registered"
    );
    Ok(())
}

/// Unlink a ticket. Returns `false` when nothing was linked.
///
/// # Errors
///
/// Returns [`StoreError`] when the removal transaction fails.
pub fn remove(store: &dyn DocumentStore, reference: &CardReference) -> Result<bool, StoreError> {
    store.remove_card(reference)
}
