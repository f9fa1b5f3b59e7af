//! Stale-reference cleanup after the ticketing system reports a card gone.

use tracing::{info, warn};

use crate::cards::{self, CardReference};
use crate::store::{DocumentStore, StoreError};

/// Remove the card index entry and the item's card pointer in one
/// transaction. Returns `false` when another delivery already removed them.
///
/// # Errors
///
/// Returns [`StoreError`] when the removal fails; nothing is removed then
/// and the caller must let the delivery be retried.
pub fn remove_stale_reference(
    store: &dyn DocumentStore,
    reference: &CardReference,
) -> Result<bool, StoreError> {
    match cards::remove(store, reference) {
        Ok(removed) => {
            info!(
                organization_id = %reference.organization_id,
                property_id = %reference.property_id,
                item_id = %reference.item_id,
                card_id = %reference.card_id,
                removed,
                "stale card reference cleaned up"
            );
            Ok(removed)
        }
        Err(err) => {
            warn!(
                card_id = %reference.card_id,
                item_id = %reference.item_id,
                error = %err,
                "stale card reference cleanup failed"
            );
            Err(err)
        }
    }
}
