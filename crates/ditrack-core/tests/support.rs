//! Fakes shared by the integration tests.
//!
//! Included from each test file with `#[path = "support.rs"] mod support;`.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use ditrack_core::cards::CardReference;
use ditrack_core::config::CommentSettings;
use ditrack_core::handlers::SyncContext;
use ditrack_core::model::{Credentials, PropertyIntegration, UserProfile};
use ditrack_core::store::{DocumentStore, MemoryStore, StoreError};
use ditrack_core::ticketing::{CardUpdate, TicketError, TicketingApi};
use serde_json::Value;

pub const ORG: &str = "org-1";
pub const PROPERTY: &str = "prop-1";
pub const ITEM: &str = "di-1";
pub const CARD: &str = "card-1";
pub const CLOSED_LIST: &str = "list-closed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    Comment { card_id: String, text: String },
    Update { card_id: String, update: CardUpdate },
    Attachment { card_id: String, url: String },
}

/// Ticketing fake: records every call and fails with queued errors first.
#[derive(Debug, Default)]
pub struct RecordingApi {
    calls: Mutex<Vec<ApiCall>>,
    failures: Mutex<VecDeque<TicketError>>,
}

impl RecordingApi {
    pub fn fail_next(&self, err: TicketError) {
        self.failures.lock().unwrap().push_back(err);
    }

    pub fn card_gone(&self) {
        self.fail_next(TicketError::NotFound {
            card_id: CARD.to_string(),
        });
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn comments(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::Comment { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ApiCall) -> Result<usize, TicketError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(call);
        self.failures
            .lock()
            .unwrap()
            .pop_front()
            .map_or(Ok(calls.len()), Err)
    }
}

impl TicketingApi for RecordingApi {
    fn create_comment(
        &self,
        card_id: &str,
        _credentials: &Credentials,
        text: &str,
    ) -> Result<(), TicketError> {
        self.record(ApiCall::Comment {
            card_id: card_id.to_string(),
            text: text.to_string(),
        })
        .map(|_| ())
    }

    fn update_card(
        &self,
        card_id: &str,
        _credentials: &Credentials,
        update: &CardUpdate,
    ) -> Result<(), TicketError> {
        self.record(ApiCall::Update {
            card_id: card_id.to_string(),
            update: update.clone(),
        })
        .map(|_| ())
    }

    fn create_attachment(
        &self,
        card_id: &str,
        _credentials: &Credentials,
        url: &str,
    ) -> Result<String, TicketError> {
        self.record(ApiCall::Attachment {
            card_id: card_id.to_string(),
            url: url.to_string(),
        })
        .map(|n| format!("attachment-{n}"))
    }
}

/// Store wrapper whose card removal can be switched to fail.
#[derive(Debug, Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_removal: AtomicBool,
}

impl FlakyStore {
    pub fn failing_removal() -> Self {
        let store = Self::default();
        store.fail_removal.store(true, Ordering::SeqCst);
        store
    }
}

impl DocumentStore for FlakyStore {
    fn item(&self, item_id: &str) -> Result<Option<Value>, StoreError> {
        self.inner.item(item_id)
    }

    fn put_item(&self, item_id: &str, document: &Value) -> Result<(), StoreError> {
        self.inner.put_item(item_id, document)
    }

    fn property_integration(
        &self,
        property_id: &str,
    ) -> Result<Option<PropertyIntegration>, StoreError> {
        self.inner.property_integration(property_id)
    }

    fn put_property_integration(
        &self,
        integration: &PropertyIntegration,
    ) -> Result<(), StoreError> {
        self.inner.put_property_integration(integration)
    }

    fn credentials(&self, organization_id: &str) -> Result<Option<Credentials>, StoreError> {
        self.inner.credentials(organization_id)
    }

    fn put_credentials(
        &self,
        organization_id: &str,
        credentials: &Credentials,
    ) -> Result<(), StoreError> {
        self.inner.put_credentials(organization_id, credentials)
    }

    fn user(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        self.inner.user(user_id)
    }

    fn put_user(&self, user_id: &str, profile: &UserProfile) -> Result<(), StoreError> {
        self.inner.put_user(user_id, profile)
    }

    fn find_card(
        &self,
        property_id: &str,
        item_id: &str,
    ) -> Result<Option<CardReference>, StoreError> {
        self.inner.find_card(property_id, item_id)
    }

    fn item_for_card(
        &self,
        organization_id: &str,
        property_id: &str,
        card_id: &str,
    ) -> Result<Option<String>, StoreError> {
        self.inner
            .item_for_card(organization_id, property_id, card_id)
    }

    fn insert_card(&self, reference: &CardReference) -> Result<(), StoreError> {
        self.inner.insert_card(reference)
    }

    fn remove_card(&self, reference: &CardReference) -> Result<bool, StoreError> {
        if self.fail_removal.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected removal failure".to_string()));
        }
        self.inner.remove_card(reference)
    }

    fn set_photo_attachment(
        &self,
        item_id: &str,
        entry_id: &str,
        attachment_id: &str,
    ) -> Result<bool, StoreError> {
        self.inner
            .set_photo_attachment(item_id, entry_id, attachment_id)
    }

    fn has_comment_receipt(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.has_comment_receipt(key)
    }

    fn record_comment_receipt(&self, key: &str) -> Result<(), StoreError> {
        self.inner.record_comment_receipt(key)
    }
}

pub fn card_reference() -> CardReference {
    CardReference::new(ORG, PROPERTY, CARD, ITEM)
}

/// Link the card, connect the organization and configure the closed list.
pub fn seed_linked(store: &dyn DocumentStore, item: &Value) {
    store.put_item(ITEM, item).unwrap();
    store.insert_card(&card_reference()).unwrap();
    store
        .put_credentials(
            ORG,
            &Credentials {
                auth_token: "token".to_string(),
                api_key: "key".to_string(),
            },
        )
        .unwrap();
    store
        .put_property_integration(&PropertyIntegration {
            property_id: PROPERTY.to_string(),
            organization_id: ORG.to_string(),
            board_id: Some("board-1".to_string()),
            open_list: Some("list-open".to_string()),
            closed_list: Some(CLOSED_LIST.to_string()),
        })
        .unwrap();
}

pub fn seed_user(store: &dyn DocumentStore, user_id: &str, first: &str, last: &str) {
    store
        .put_user(
            user_id,
            &UserProfile {
                first_name: first.to_string(),
                last_name: last.to_string(),
                email: String::new(),
            },
        )
        .unwrap();
}

pub fn context<'a>(
    store: &'a dyn DocumentStore,
    api: &'a RecordingApi,
    comments: &'a CommentSettings,
) -> SyncContext<'a> {
    SyncContext {
        store,
        api,
        comments,
    }
}
