//! Shared fixtures for unit tests.

use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::cards::CardReference;
use crate::config::CommentSettings;
use crate::handlers::SyncContext;
use crate::model::{Credentials, PropertyIntegration, UserProfile};
use crate::store::{DocumentStore, MemoryStore};
use crate::ticketing::{CardUpdate, TicketError, TicketingApi};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Comment { card_id: String, text: String },
    Update { card_id: String, update: CardUpdate },
    Attachment { card_id: String, url: String },
}

/// Records every call; fails calls with queued errors first.
#[derive(Debug, Default)]
pub struct ScriptedTicketing {
    calls: Mutex<Vec<Call>>,
    failures: Mutex<VecDeque<TicketError>>,
}

impl ScriptedTicketing {
    pub fn fail_next(&self, err: TicketError) {
        self.failures.lock().unwrap().push_back(err);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) -> Result<usize, TicketError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(call);
        match self.failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(calls.len()),
        }
    }
}

impl TicketingApi for ScriptedTicketing {
    fn create_comment(
        &self,
        card_id: &str,
        _credentials: &Credentials,
        text: &str,
    ) -> Result<(), TicketError> {
        self.record(Call::Comment {
            card_id: card_id.into(),
            text: text.into(),
        })
        .map(|_| ())
    }

    fn update_card(
        &self,
        card_id: &str,
        _credentials: &Credentials,
        update: &CardUpdate,
    ) -> Result<(), TicketError> {
        self.record(Call::Update {
            card_id: card_id.into(),
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
        self.record(Call::Attachment {
            card_id: card_id.into(),
            url: url.into(),
        })
        .map(|n| format!("att-{n}"))
    }
}

pub fn reference() -> CardReference {
    CardReference::new("org-1", "prop-1", "card-1", "di-1")
}

pub struct Fixture {
    pub store: MemoryStore,
    pub settings: CommentSettings,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            settings: CommentSettings::default(),
        }
    }

    /// Card linked, organization connected, closed list configured.
    pub fn linked() -> Self {
        let fixture = Self::new();
        fixture.link_card();
        fixture.connect_organization();
        fixture
            .store
            .put_property_integration(&PropertyIntegration {
                property_id: "prop-1".into(),
                organization_id: "org-1".into(),
                board_id: Some("board-1".into()),
                open_list: Some("list-open".into()),
                closed_list: Some("list-closed".into()),
            })
            .unwrap();
        fixture
    }

    pub fn context<'a>(&'a self, api: &'a ScriptedTicketing) -> SyncContext<'a> {
        SyncContext {
            store: &self.store,
            api,
            comments: &self.settings,
        }
    }

    pub fn link_card(&self) {
        self.store.insert_card(&reference()).unwrap();
    }

    pub fn connect_organization(&self) {
        self.store
            .put_credentials(
                "org-1",
                &Credentials {
                    auth_token: "token".into(),
                    api_key: "key".into(),
                },
            )
            .unwrap();
    }

    pub fn put_item(&self, document: Value) {
        self.store.put_item("di-1", &document).unwrap();
    }

    pub fn put_user(&self, user_id: &str, first: &str, last: &str, email: &str) {
        self.store
            .put_user(
                user_id,
                &UserProfile {
                    first_name: first.into(),
                    last_name: last.into(),
                    email: email.into(),
                },
            )
            .unwrap();
    }

    pub fn item(&self) -> Value {
        self.store.item("di-1").unwrap().unwrap()
    }
}
