//! Due-Date: mirror the item's due date onto the card.
//!
//! Acts only when the newest entry of a log was written by the triggering
//! write. Checked in order, first match wins:
//! 1. deferred date: due becomes the deferred date
//! 2. due date: due becomes the due day
//! 3. `go-back` state entry: due is cleared
//!
//! Every branch also resets `dueComplete` to false.

use tracing::info;

use super::{Outcome, SkipReason, SyncContext, SyncHandler, Target, is_triggering_write, preamble};
use crate::codec::StateChangeEvent;
use crate::dates;
use crate::error::SyncError;
use crate::history::{self, HistoryEntry};
use crate::model::entries::{DeferredDateEntry, DueDateEntry, parse_entry};
use crate::model::{LogName, State, StateEntry};
use crate::ticketing::CardUpdate;

#[derive(Debug, Clone, Copy, Default)]
pub struct DueDateHandler;

fn triggering_entry<'a>(
    target: &'a Target,
    event: &StateChangeEvent,
    log: LogName,
) -> Option<HistoryEntry<'a>> {
    history::resolve(&target.item, log)
        .current()
        .filter(|entry| is_triggering_write(&target.item, event, entry))
}

fn due_update(due: String) -> CardUpdate {
    CardUpdate {
        due: Some(Some(due)),
        due_complete: Some(false),
        id_list: None,
    }
}

impl DueDateHandler {
    fn plan(target: &Target, event: &StateChangeEvent) -> Result<Option<CardUpdate>, SyncError> {
        if let Some(entry) = triggering_entry(target, event, LogName::DeferredDates) {
            let log = LogName::DeferredDates;
            let deferred: DeferredDateEntry =
                parse_entry(entry.payload).map_err(|reason| target.invalid_entry(log, reason))?;
            let due = dates::due_timestamp(
                deferred.deferred_date_day.as_deref(),
                deferred.deferred_date,
            )
            .ok_or_else(|| target.invalid_entry(log, "no usable deferred date"))?;
            return Ok(Some(due_update(due)));
        }

        if let Some(entry) = triggering_entry(target, event, LogName::DueDates) {
            let log = LogName::DueDates;
            let due_date: DueDateEntry =
                parse_entry(entry.payload).map_err(|reason| target.invalid_entry(log, reason))?;
            let due = dates::due_timestamp(due_date.due_date_day.as_deref(), due_date.due_date)
                .ok_or_else(|| target.invalid_entry(log, "no usable due date"))?;
            return Ok(Some(due_update(due)));
        }

        if let Some(entry) = triggering_entry(target, event, LogName::StateHistory) {
            let state = StateEntry::parse(entry.payload)
                .map_err(|reason| target.invalid_entry(LogName::StateHistory, reason))?;
            if state.state == State::GoBack.as_str() {
                return Ok(Some(CardUpdate {
                    due: Some(None),
                    due_complete: Some(false),
                    id_list: None,
                }));
            }
        }

        Ok(None)
    }
}

impl SyncHandler for DueDateHandler {
    fn name(&self) -> &'static str {
        "due-date"
    }

    fn handle(
        &self,
        ctx: &SyncContext<'_>,
        event: &StateChangeEvent,
    ) -> Result<Outcome, SyncError> {
        let target = preamble(ctx, event)?;
        let Some(update) = Self::plan(&target, event)? else {
            return Ok(Outcome::Skipped(SkipReason::NotTriggeringWrite));
        };

        ctx.api
            .update_card(target.card_id(), &target.credentials, &update)
            .map_err(|err| target.ticket_error(err))?;

        info!(
            property_id = %event.property_id,
            item_id = %event.item_id,
            card_id = %target.card_id(),
            due = update.due.as_ref().and_then(Option::as_deref).unwrap_or("cleared"),
            "card due date updated"
        );
        Ok(Outcome::Synced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::dispatch;
    use crate::testing::{Call, Fixture, ScriptedTicketing};
    use serde_json::json;

    fn single_update(api: &ScriptedTicketing) -> CardUpdate {
        match api.calls().as_slice() {
            [Call::Update { update, .. }] => update.clone(),
            other => panic!("expected one update, got {other:?}"),
        }
    }

    #[test]
    fn triggering_deferred_date_wins() {
        let fixture = Fixture::linked();
        fixture.put_item(json!({
            "property": "prop-1",
            "state": "deferred",
            "writeVersion": 7,
            "deferredDates": {
                "x": { "createdAt": 50, "deferredDateDay": "06/01/2024", "writeVersion": 7 }
            },
            "dueDates": {
                "d": { "createdAt": 50, "dueDateDay": "01/01/2024", "writeVersion": 7 }
            }
        }));
        let api = ScriptedTicketing::default();
        let event = StateChangeEvent::new("prop-1", "di-1", "deferred").with_write_version(7);

        assert_eq!(
            dispatch(&DueDateHandler, &fixture.context(&api), &event).unwrap(),
            Outcome::Synced
        );
        assert_eq!(
            single_update(&api),
            due_update("2024-06-01T23:59:59Z".to_string())
        );
    }

    #[test]
    fn legacy_event_matches_updated_at() {
        let fixture = Fixture::linked();
        fixture.put_item(json!({
            "property": "prop-1",
            "state": "pending",
            "updatedAt": 1_700_000_000.0,
            "dueDates": {
                "old": { "createdAt": 1_600_000_000.0, "dueDateDay": "01/01/2020" },
                "new": { "createdAt": 1_700_000_000.0, "dueDate": 1_700_000_000.0 }
            }
        }));
        let api = ScriptedTicketing::default();
        let event = StateChangeEvent::new("prop-1", "di-1", "pending");

        assert_eq!(
            dispatch(&DueDateHandler, &fixture.context(&api), &event).unwrap(),
            Outcome::Synced
        );
        assert_eq!(
            single_update(&api).due,
            Some(Some("2023-11-14T22:13:20Z".to_string()))
        );
    }

    #[test]
    fn go_back_clears_due() {
        let fixture = Fixture::linked();
        fixture.put_item(json!({
            "property": "prop-1",
            "state": "go-back",
            "stateHistory": {
                "s1": { "createdAt": 3, "state": "go-back", "user": "u", "writeVersion": 2 }
            },
            "dueDates": { "d": { "createdAt": 1, "dueDateDay": "01/01/2024", "writeVersion": 1 } }
        }));
        let api = ScriptedTicketing::default();
        let event = StateChangeEvent::new("prop-1", "di-1", "go-back").with_write_version(2);

        dispatch(&DueDateHandler, &fixture.context(&api), &event).unwrap();
        let update = single_update(&api);
        assert_eq!(update.due, Some(None));
        assert_eq!(update.due_complete, Some(false));
    }

    #[test]
    fn unrelated_write_is_skipped() {
        let fixture = Fixture::linked();
        fixture.put_item(json!({
            "property": "prop-1",
            "state": "pending",
            "stateHistory": {
                "s1": { "createdAt": 3, "state": "pending", "user": "u", "writeVersion": 4 }
            },
            "dueDates": { "d": { "createdAt": 1, "dueDateDay": "01/01/2024", "writeVersion": 1 } }
        }));
        let api = ScriptedTicketing::default();
        let event = StateChangeEvent::new("prop-1", "di-1", "pending").with_write_version(4);

        assert_eq!(
            dispatch(&DueDateHandler, &fixture.context(&api), &event).unwrap(),
            Outcome::Skipped(SkipReason::NotTriggeringWrite)
        );
        assert!(api.calls().is_empty());
    }
}
