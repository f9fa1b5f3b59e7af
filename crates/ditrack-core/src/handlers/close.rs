//! Close/Move: finish the card when the item reaches a terminal state.
//!
//! - `closed` moves the card to the property's closed list, if configured
//! - any due or deferred date on the item marks the card's due complete
//!
//! An empty update makes no API call.

use tracing::info;

use super::{Outcome, SkipReason, SyncContext, SyncHandler, preamble};
use crate::codec::StateChangeEvent;
use crate::error::SyncError;
use crate::model::{LogName, State};
use crate::ticketing::CardUpdate;

#[derive(Debug, Clone, Copy, Default)]
pub struct CloseHandler;

impl CloseHandler {
    /// Card update for an item entering `state`.
    fn build_update(
        state: State,
        closed_list: Option<String>,
        has_dates: bool,
    ) -> CardUpdate {
        CardUpdate {
            id_list: closed_list.filter(|_| state == State::Closed),
            due_complete: has_dates.then_some(true),
            ..CardUpdate::default()
        }
    }
}

impl SyncHandler for CloseHandler {
    fn name(&self) -> &'static str {
        "close"
    }

    fn handle(
        &self,
        ctx: &SyncContext<'_>,
        event: &StateChangeEvent,
    ) -> Result<Outcome, SyncError> {
        let Some(state) = event
            .state
            .parse::<State>()
            .ok()
            .filter(|state| state.is_terminal())
        else {
            return Ok(Outcome::Skipped(SkipReason::NotApplicable));
        };

        let target = preamble(ctx, event)?;

        let closed_list = if state == State::Closed {
            ctx.store
                .property_integration(&event.property_id)?
                .and_then(|integration| integration.closed_list)
                .filter(|list| !list.trim().is_empty())
        } else {
            None
        };
        let has_dates = target.item.has_entries(LogName::DueDates)
            || target.item.has_entries(LogName::DeferredDates);

        let update = Self::build_update(state, closed_list, has_dates);
        if update.is_empty() {
            return Ok(Outcome::Skipped(SkipReason::NothingToUpdate));
        }

        ctx.api
            .update_card(target.card_id(), &target.credentials, &update)
            .map_err(|err| target.ticket_error(err))?;

        info!(
            property_id = %event.property_id,
            item_id = %event.item_id,
            card_id = %target.card_id(),
            moved = update.id_list.is_some(),
            due_complete = update.due_complete.is_some(),
            "card closed"
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

    fn run(fixture: &Fixture, api: &ScriptedTicketing, state: &str) -> Outcome {
        let event = StateChangeEvent::new("prop-1", "di-1", state);
        dispatch(&CloseHandler, &fixture.context(api), &event).unwrap()
    }

    #[test]
    fn closed_with_dates_moves_and_completes() {
        let fixture = Fixture::linked();
        fixture.put_item(json!({
            "property": "prop-1",
            "state": "closed",
            "dueDates": { "d1": { "createdAt": 1, "dueDate": 100 } }
        }));
        let api = ScriptedTicketing::default();

        assert_eq!(run(&fixture, &api, "closed"), Outcome::Synced);
        assert_eq!(
            api.calls(),
            [Call::Update {
                card_id: "card-1".into(),
                update: CardUpdate {
                    id_list: Some("list-closed".into()),
                    due_complete: Some(true),
                    due: None,
                },
            }]
        );
    }

    #[test]
    fn completed_never_moves_list() {
        let fixture = Fixture::linked();
        fixture.put_item(json!({
            "property": "prop-1",
            "state": "completed",
            "deferredDates": { "x": { "createdAt": 1 } }
        }));
        let api = ScriptedTicketing::default();

        assert_eq!(run(&fixture, &api, "completed"), Outcome::Synced);
        let calls = api.calls();
        let [Call::Update { update, .. }] = calls.as_slice() else {
            panic!("expected one update");
        };
        assert_eq!(update.id_list, None);
        assert_eq!(update.due_complete, Some(true));
    }

    #[test]
    fn empty_update_makes_no_call() {
        let fixture = Fixture::linked();
        fixture.put_item(json!({ "property": "prop-1", "state": "completed" }));
        let api = ScriptedTicketing::default();

        assert_eq!(
            run(&fixture, &api, "completed"),
            Outcome::Skipped(SkipReason::NothingToUpdate)
        );
        assert!(api.calls().is_empty());
    }

    #[test]
    fn non_terminal_states_are_ignored() {
        let fixture = Fixture::linked();
        let api = ScriptedTicketing::default();
        assert_eq!(
            run(&fixture, &api, "pending"),
            Outcome::Skipped(SkipReason::NotApplicable)
        );
        assert!(api.calls().is_empty());
    }

    #[test]
    fn build_update_ignores_list_for_completed() {
        let update = CloseHandler::build_update(State::Completed, Some("l".into()), false);
        assert!(update.is_empty());
    }
}
