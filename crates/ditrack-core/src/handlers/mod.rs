//! Ticket sync handlers.
//!
//! Every handler is invoked once per delivered state-change event, may run
//! concurrently with the others and with redeliveries of the same event,
//! and re-derives everything from stored state. Handlers write disjoint
//! field sets, so no coordination is needed between them.
//!
//! The common preamble resolves, in order:
//! 1. the card reference for `(property, item)`; none means no ticket
//! 2. the organization's credentials; none means the integration is off
//! 3. the item document; absent or malformed means nothing to sync
//!
//! Each of those absences surfaces as a [`SyncError`] with a
//! [`SkipReason`]; [`dispatch`] turns them into [`Outcome::Skipped`].

pub mod close;
pub mod comment;
pub mod due_date;
pub mod photo;
pub mod progress_note;

pub use close::CloseHandler;
pub use comment::CommentHandler;
pub use due_date::DueDateHandler;
pub use photo::PhotoAttachmentHandler;
pub use progress_note::ProgressNoteHandler;

use std::fmt;
use tracing::{debug, error, info, warn};

use crate::cards::{self, CardReference};
use crate::cleanup;
use crate::codec::StateChangeEvent;
use crate::config::CommentSettings;
use crate::error::SyncError;
use crate::history::HistoryEntry;
use crate::model::entries;
use crate::model::{Credentials, DeficientItem, LogName};
use crate::store::DocumentStore;
use crate::ticketing::{TicketError, TicketingApi};

/// Collaborators shared by all handlers for one delivery.
#[derive(Clone, Copy)]
pub struct SyncContext<'a> {
    pub store: &'a dyn DocumentStore,
    pub api: &'a dyn TicketingApi,
    pub comments: &'a CommentSettings,
}

impl fmt::Debug for SyncContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncContext")
            .field("comments", self.comments)
            .finish_non_exhaustive()
    }
}

/// Why a handler did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// The event is outside this handler's trigger set.
    NotApplicable,
    NoTicket,
    NoCredentials,
    ItemMissing,
    ItemMalformed,
    InvalidHistoryEntry,
    /// The newest log entry was not written by the triggering write.
    NotTriggeringWrite,
    NothingToUpdate,
    AlreadyAttached,
    MissingSourceUrl,
    AlreadyCommented,
}

impl SkipReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotApplicable => "not-applicable",
            Self::NoTicket => "no-ticket",
            Self::NoCredentials => "no-credentials",
            Self::ItemMissing => "item-missing",
            Self::ItemMalformed => "item-malformed",
            Self::InvalidHistoryEntry => "invalid-history-entry",
            Self::NotTriggeringWrite => "not-triggering-write",
            Self::NothingToUpdate => "nothing-to-update",
            Self::AlreadyAttached => "already-attached",
            Self::MissingSourceUrl => "missing-source-url",
            Self::AlreadyCommented => "already-commented",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one handler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The external ticket was updated.
    Synced,
    Skipped(SkipReason),
    /// The ticket was gone; its reference has been removed.
    CardRemoved { card_id: String },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Synced => f.write_str("synced"),
            Self::Skipped(reason) => write!(f, "skipped ({reason})"),
            Self::CardRemoved { card_id } => write!(f, "card {card_id} removed"),
        }
    }
}

/// One reaction to state-change events.
pub trait SyncHandler: Send + Sync {
    /// Stable name used in logs and reports.
    fn name(&self) -> &'static str;

    /// React to one event.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] for expected absences (mapped to skips by
    /// [`dispatch`]), a vanished card, or external and persistence failures.
    fn handle(
        &self,
        ctx: &SyncContext<'_>,
        event: &StateChangeEvent,
    ) -> Result<Outcome, SyncError>;
}

/// The handler set run for every event.
#[must_use]
pub fn default_handlers() -> Vec<Box<dyn SyncHandler>> {
    vec![
        Box::new(CloseHandler),
        Box::new(CommentHandler),
        Box::new(DueDateHandler),
        Box::new(PhotoAttachmentHandler),
        Box::new(ProgressNoteHandler),
    ]
}

// ---------------------------------------------------------------------------
// Preamble
// ---------------------------------------------------------------------------

/// Everything a handler needs about the linked ticket and its item.
#[derive(Debug, Clone)]
pub struct Target {
    pub reference: CardReference,
    pub credentials: Credentials,
    pub item: DeficientItem,
}

impl Target {
    #[must_use]
    pub fn card_id(&self) -> &str {
        &self.reference.card_id
    }

    /// Classify a ticketing failure; a missing card triggers cleanup.
    #[must_use]
    pub fn ticket_error(&self, err: TicketError) -> SyncError {
        match err {
            TicketError::NotFound { .. } => SyncError::CardDeleted {
                reference: Box::new(self.reference.clone()),
            },
            other => SyncError::ExternalApi(other),
        }
    }

    /// Error for a log entry that does not have the shape a handler needs.
    #[must_use]
    pub fn invalid_entry(&self, log: LogName, reason: impl Into<String>) -> SyncError {
        SyncError::InvalidHistoryEntry {
            item_id: self.item.id.clone(),
            log: log.field(),
            reason: reason.into(),
        }
    }
}

/// Resolve card reference, credentials and item, in that order.
///
/// # Errors
///
/// Returns [`SyncError::NoTicket`], [`SyncError::NoCredentials`],
/// [`SyncError::ItemNotFound`] or [`SyncError::MalformedItem`] for the
/// expected absences and [`SyncError::Persistence`] on store failure.
pub fn preamble(ctx: &SyncContext<'_>, event: &StateChangeEvent) -> Result<Target, SyncError> {
    let reference = cards::lookup(ctx.store, &event.property_id, &event.item_id)?.ok_or_else(
        || SyncError::NoTicket {
            property_id: event.property_id.clone(),
            item_id: event.item_id.clone(),
        },
    )?;

    let credentials = ctx
        .store
        .credentials(&reference.organization_id)?
        .ok_or_else(|| SyncError::NoCredentials {
            organization_id: reference.organization_id.clone(),
        })?;

    let document = ctx
        .store
        .item(&event.item_id)?
        .ok_or_else(|| SyncError::ItemNotFound {
            item_id: event.item_id.clone(),
        })?;
    let item = DeficientItem::from_document(&event.item_id, document).map_err(|err| {
        SyncError::MalformedItem {
            item_id: event.item_id.clone(),
            reason: err.to_string(),
        }
    })?;

    Ok(Target {
        reference,
        credentials,
        item,
    })
}

/// Whether `entry` was written by the write that produced `event`.
///
/// Events carrying a write version match entries stamped with the same
/// version. Older events fall back to comparing the item's `updatedAt`
/// with the entry's `createdAt`.
#[must_use]
pub fn is_triggering_write(
    item: &DeficientItem,
    event: &StateChangeEvent,
    entry: &HistoryEntry<'_>,
) -> bool {
    match event.write_version {
        Some(version) => entries::write_version(entry.payload) == Some(version),
        None => item
            .updated_at
            .is_some_and(|updated_at| updated_at.total_cmp(&entry.created_at).is_eq()),
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Run one handler, turning expected absences into skips and a vanished
/// card into stale-reference cleanup.
///
/// # Errors
///
/// Returns the handler's error when it is neither a skip nor a vanished
/// card, or [`SyncError::Persistence`] when cleanup itself fails.
pub fn dispatch(
    handler: &dyn SyncHandler,
    ctx: &SyncContext<'_>,
    event: &StateChangeEvent,
) -> Result<Outcome, SyncError> {
    let name = handler.name();
    match handler.handle(ctx, event) {
        Ok(outcome) => {
            debug!(
                handler = name,
                property_id = %event.property_id,
                item_id = %event.item_id,
                %outcome,
                "handler finished"
            );
            Ok(outcome)
        }
        Err(err) => {
            if let Some(reason) = err.skip_reason() {
                info!(
                    handler = name,
                    property_id = %event.property_id,
                    item_id = %event.item_id,
                    code = %err.code(),
                    error = %err,
                    "handler skipped"
                );
                return Ok(Outcome::Skipped(reason));
            }

            if let SyncError::CardDeleted { reference } = &err {
                warn!(
                    handler = name,
                    property_id = %reference.property_id,
                    item_id = %reference.item_id,
                    card_id = %reference.card_id,
                    "card no longer exists, removing reference"
                );
                cleanup::remove_stale_reference(ctx.store, reference)?;
                return Ok(Outcome::CardRemoved {
                    card_id: reference.card_id.clone(),
                });
            }

            error!(
                handler = name,
                property_id = %event.property_id,
                item_id = %event.item_id,
                code = %err.code(),
                retryable = err.is_retryable(),
                error = %err,
                "handler failed"
            );
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fixture, ScriptedTicketing};
    use serde_json::json;

    struct Failing(fn() -> SyncError);

    impl SyncHandler for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn handle(
            &self,
            _ctx: &SyncContext<'_>,
            _event: &StateChangeEvent,
        ) -> Result<Outcome, SyncError> {
            Err((self.0)())
        }
    }

    #[test]
    fn preamble_checks_card_then_credentials_then_item() {
        let fixture = Fixture::new();
        let api = ScriptedTicketing::default();
        let ctx = fixture.context(&api);
        let event = StateChangeEvent::new("prop-1", "di-1", "pending");

        assert!(matches!(
            preamble(&ctx, &event),
            Err(SyncError::NoTicket { .. })
        ));

        fixture.link_card();
        assert!(matches!(
            preamble(&ctx, &event),
            Err(SyncError::NoCredentials { .. })
        ));

        fixture.connect_organization();
        assert!(matches!(
            preamble(&ctx, &event),
            Err(SyncError::ItemNotFound { .. })
        ));

        fixture.put_item(json!({ "property": "prop-1", "state": 12 }));
        assert!(matches!(
            preamble(&ctx, &event),
            Err(SyncError::MalformedItem { .. })
        ));

        fixture.put_item(json!({ "property": "prop-1", "state": "pending" }));
        let target = preamble(&ctx, &event).unwrap();
        assert_eq!(target.card_id(), "card-1");
        assert_eq!(target.item.id, "di-1");
    }

    #[test]
    fn triggering_write_prefers_version_token() {
        let item = DeficientItem::from_document(
            "di-1",
            json!({ "property": "p", "state": "pending", "updatedAt": 20.0 }),
        )
        .unwrap();
        let stamped = json!({ "createdAt": 10.0, "writeVersion": 3 });
        let entry = HistoryEntry {
            id: "e",
            created_at: 10.0,
            payload: &stamped,
        };

        let versioned = StateChangeEvent::new("p", "di-1", "pending").with_write_version(3);
        assert!(is_triggering_write(&item, &versioned, &entry));
        let stale = StateChangeEvent::new("p", "di-1", "pending").with_write_version(4);
        assert!(!is_triggering_write(&item, &stale, &entry));

        let legacy = StateChangeEvent::new("p", "di-1", "pending");
        assert!(!is_triggering_write(&item, &legacy, &entry));
        let fresh = HistoryEntry {
            created_at: 20.0,
            ..entry
        };
        assert!(is_triggering_write(&item, &legacy, &fresh));
    }

    #[test]
    fn dispatch_swallows_expected_absences() {
        let fixture = Fixture::new();
        let api = ScriptedTicketing::default();
        let ctx = fixture.context(&api);
        let event = StateChangeEvent::new("prop-1", "di-1", "pending");

        let handler = Failing(|| SyncError::NoCredentials {
            organization_id: "org-1".into(),
        });
        assert_eq!(
            dispatch(&handler, &ctx, &event).unwrap(),
            Outcome::Skipped(SkipReason::NoCredentials)
        );
    }

    #[test]
    fn dispatch_rethrows_external_failures() {
        let fixture = Fixture::new();
        let api = ScriptedTicketing::default();
        let ctx = fixture.context(&api);
        let event = StateChangeEvent::new("prop-1", "di-1", "pending");

        let handler = Failing(|| {
            SyncError::ExternalApi(TicketError::Status {
                operation: "update card",
                status: 500,
                body: String::new(),
            })
        });
        let err = dispatch(&handler, &ctx, &event).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn dispatch_cleans_up_deleted_cards() {
        let fixture = Fixture::linked();
        let api = ScriptedTicketing::default();
        let ctx = fixture.context(&api);
        let event = StateChangeEvent::new("prop-1", "di-1", "pending");

        let handler = Failing(|| SyncError::CardDeleted {
            reference: Box::new(crate::testing::reference()),
        });
        assert_eq!(
            dispatch(&handler, &ctx, &event).unwrap(),
            Outcome::CardRemoved {
                card_id: "card-1".into()
            }
        );
        assert!(fixture.store.find_card("prop-1", "di-1").unwrap().is_none());
    }

    #[test]
    fn default_handler_names_are_unique() {
        let handlers = default_handlers();
        let mut names: Vec<&str> = handlers.iter().map(|h| h.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 5);
    }
}
