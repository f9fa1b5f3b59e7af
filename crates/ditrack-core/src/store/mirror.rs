//! Dual-write wrapper for migrating between two stores.
//!
//! The primary store is the source of truth: every read goes to it and every
//! write must succeed there first. The legacy store receives the same write
//! afterwards; a legacy failure is logged as drift and never fails the call.
//!
//! The CLI wraps its SQLite store in one when `[store] legacy_path` is set.

use serde_json::Value;
use tracing::warn;

use super::{DocumentStore, StoreError};
use crate::cards::CardReference;
use crate::model::{Credentials, PropertyIntegration, UserProfile};

/// Reads from `P`, writes to `P` then `L`.
#[derive(Debug)]
pub struct MirroredStore<P, L> {
    primary: P,
    legacy: L,
}

impl<P: DocumentStore, L: DocumentStore> MirroredStore<P, L> {
    #[must_use]
    pub const fn new(primary: P, legacy: L) -> Self {
        Self { primary, legacy }
    }

    #[must_use]
    pub const fn primary(&self) -> &P {
        &self.primary
    }

    #[must_use]
    pub const fn legacy(&self) -> &L {
        &self.legacy
    }

    fn mirror<T>(&self, operation: &'static str, write: impl FnOnce(&L) -> Result<T, StoreError>) {
        if let Err(err) = write(&self.legacy) {
            warn!(operation, error = %err, "legacy store write failed; stores have drifted");
        }
    }
}

impl<P: DocumentStore, L: DocumentStore> DocumentStore for MirroredStore<P, L> {
    fn item(&self, item_id: &str) -> Result<Option<Value>, StoreError> {
        self.primary.item(item_id)
    }

    fn put_item(&self, item_id: &str, document: &Value) -> Result<(), StoreError> {
        self.primary.put_item(item_id, document)?;
        self.mirror("put_item", |legacy| legacy.put_item(item_id, document));
        Ok(())
    }

    fn property_integration(
        &self,
        property_id: &str,
    ) -> Result<Option<PropertyIntegration>, StoreError> {
        self.primary.property_integration(property_id)
    }

    fn put_property_integration(
        &self,
        integration: &PropertyIntegration,
    ) -> Result<(), StoreError> {
        self.primary.put_property_integration(integration)?;
        self.mirror("put_property_integration", |legacy| {
            legacy.put_property_integration(integration)
        });
        Ok(())
    }

    fn credentials(&self, organization_id: &str) -> Result<Option<Credentials>, StoreError> {
        self.primary.credentials(organization_id)
    }

    fn put_credentials(
        &self,
        organization_id: &str,
        credentials: &Credentials,
    ) -> Result<(), StoreError> {
        self.primary.put_credentials(organization_id, credentials)?;
        self.mirror("put_credentials", |legacy| {
            legacy.put_credentials(organization_id, credentials)
        });
        Ok(())
    }

    fn user(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        self.primary.user(user_id)
    }

    fn put_user(&self, user_id: &str, profile: &UserProfile) -> Result<(), StoreError> {
        self.primary.put_user(user_id, profile)?;
        self.mirror("put_user", |legacy| legacy.put_user(user_id, profile));
        Ok(())
    }

    fn find_card(
        &self,
        property_id: &str,
        item_id: &str,
    ) -> Result<Option<CardReference>, StoreError> {
        self.primary.find_card(property_id, item_id)
    }

    fn item_for_card(
        &self,
        organization_id: &str,
        property_id: &str,
        card_id: &str,
    ) -> Result<Option<String>, StoreError> {
        self.primary
            .item_for_card(organization_id, property_id, card_id)
    }

    fn insert_card(&self, reference: &CardReference) -> Result<(), StoreError> {
        self.primary.insert_card(reference)?;
        self.mirror("insert_card", |legacy| legacy.insert_card(reference));
        Ok(())
    }

    fn remove_card(&self, reference: &CardReference) -> Result<bool, StoreError> {
        let removed = self.primary.remove_card(reference)?;
        self.mirror("remove_card", |legacy| legacy.remove_card(reference));
        Ok(removed)
    }

    fn set_photo_attachment(
        &self,
        item_id: &str,
        entry_id: &str,
        attachment_id: &str,
    ) -> Result<bool, StoreError> {
        let written = self
            .primary
            .set_photo_attachment(item_id, entry_id, attachment_id)?;
        self.mirror("set_photo_attachment", |legacy| {
            legacy.set_photo_attachment(item_id, entry_id, attachment_id)
        });
        Ok(written)
    }

    fn has_comment_receipt(&self, key: &str) -> Result<bool, StoreError> {
        self.primary.has_comment_receipt(key)
    }

    fn record_comment_receipt(&self, key: &str) -> Result<(), StoreError> {
        self.primary.record_comment_receipt(key)?;
        self.mirror("record_comment_receipt", |legacy| {
            legacy.record_comment_receipt(key)
        });
        Ok(())
    }
}
