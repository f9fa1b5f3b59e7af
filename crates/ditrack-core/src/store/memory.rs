use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::{DocumentStore, StoreError};
use crate::cards::CardReference;
use crate::model::item::{clear_card_pointer, set_card_pointer, set_photo_attachment};
use crate::model::{Credentials, PropertyIntegration, UserProfile};

type CardKey = (String, String, String);

#[derive(Debug, Default)]
struct State {
    items: HashMap<String, Value>,
    integrations: HashMap<String, PropertyIntegration>,
    credentials: HashMap<String, Credentials>,
    users: HashMap<String, UserProfile>,
    cards: BTreeMap<CardKey, CardReference>,
    receipts: HashSet<String>,
}

/// In-process store; every operation holds one lock, so multi-document
/// writes are atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Number of card references in the index.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Poisoned`] if a writer panicked.
    pub fn card_count(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.cards.len())
    }
}

fn card_key(reference: &CardReference) -> CardKey {
    (
        reference.organization_id.clone(),
        reference.property_id.clone(),
        reference.card_id.clone(),
    )
}

impl DocumentStore for MemoryStore {
    fn item(&self, item_id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.lock()?.items.get(item_id).cloned())
    }

    fn put_item(&self, item_id: &str, document: &Value) -> Result<(), StoreError> {
        self.lock()?
            .items
            .insert(item_id.to_string(), document.clone());
        Ok(())
    }

    fn property_integration(
        &self,
        property_id: &str,
    ) -> Result<Option<PropertyIntegration>, StoreError> {
        Ok(self.lock()?.integrations.get(property_id).cloned())
    }

    fn put_property_integration(
        &self,
        integration: &PropertyIntegration,
    ) -> Result<(), StoreError> {
        self.lock()?
            .integrations
            .insert(integration.property_id.clone(), integration.clone());
        Ok(())
    }

    fn credentials(&self, organization_id: &str) -> Result<Option<Credentials>, StoreError> {
        Ok(self.lock()?.credentials.get(organization_id).cloned())
    }

    fn put_credentials(
        &self,
        organization_id: &str,
        credentials: &Credentials,
    ) -> Result<(), StoreError> {
        self.lock()?
            .credentials
            .insert(organization_id.to_string(), credentials.clone());
        Ok(())
    }

    fn user(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.lock()?.users.get(user_id).cloned())
    }

    fn put_user(&self, user_id: &str, profile: &UserProfile) -> Result<(), StoreError> {
        self.lock()?
            .users
            .insert(user_id.to_string(), profile.clone());
        Ok(())
    }

    fn find_card(
        &self,
        property_id: &str,
        item_id: &str,
    ) -> Result<Option<CardReference>, StoreError> {
        Ok(self
            .lock()?
            .cards
            .values()
            .find(|card| card.property_id == property_id && card.item_id == item_id)
            .cloned())
    }

    fn item_for_card(
        &self,
        organization_id: &str,
        property_id: &str,
        card_id: &str,
    ) -> Result<Option<String>, StoreError> {
        let key = (
            organization_id.to_string(),
            property_id.to_string(),
            card_id.to_string(),
        );
        Ok(self.lock()?.cards.get(&key).map(|card| card.item_id.clone()))
    }

    fn insert_card(&self, reference: &CardReference) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let conflict = state.cards.values().any(|card| {
            card.property_id == reference.property_id
                && card.item_id == reference.item_id
                && card.card_id != reference.card_id
        });
        if conflict {
            return Err(StoreError::Conflict(format!(
                "item {} already linked to another card",
                reference.item_id
            )));
        }
        let key = card_key(reference);
        let taken = state
            .cards
            .get(&key)
            .is_some_and(|owner| owner.item_id != reference.item_id);
        if taken {
            return Err(StoreError::Conflict(format!(
                "card {} already linked to another item",
                reference.card_id
            )));
        }

        state.cards.insert(key, reference.clone());
        if let Some(document) = state.items.get_mut(&reference.item_id) {
            set_card_pointer(document, &reference.pointer());
        }
        Ok(())
    }

    fn remove_card(&self, reference: &CardReference) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        let indexed = state.cards.remove(&card_key(reference)).is_some();
        let cleared = state
            .items
            .get_mut(&reference.item_id)
            .is_some_and(|document| clear_card_pointer(document, &reference.card_id));
        Ok(indexed || cleared)
    }

    fn set_photo_attachment(
        &self,
        item_id: &str,
        entry_id: &str,
        attachment_id: &str,
    ) -> Result<bool, StoreError> {
        Ok(self
            .lock()?
            .items
            .get_mut(item_id)
            .is_some_and(|document| set_photo_attachment(document, entry_id, attachment_id)))
    }

    fn has_comment_receipt(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.receipts.contains(key))
    }

    fn record_comment_receipt(&self, key: &str) -> Result<(), StoreError> {
        self.lock()?.receipts.insert(key.to_string());
        Ok(())
    }
}
