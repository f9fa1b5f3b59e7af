//! Comment: post a rendered comment describing every state transition.

use serde_json::Value;
use tracing::{info, warn};

use super::{Outcome, SkipReason, SyncContext, SyncHandler, preamble};
use crate::codec::StateChangeEvent;
use crate::dates::format_day;
use crate::error::SyncError;
use crate::history;
use crate::model::entries::{DeferredDateEntry, DueDateEntry, parse_entry};
use crate::model::item::responsibility_group_label;
use crate::model::{DeficientItem, LogName, StateEntry, UserProfile};
use crate::store::comment_receipt_key;
use crate::templates::{TemplateFields, render};

#[derive(Debug, Clone, Copy, Default)]
pub struct CommentHandler;

/// Interpolation fields for a state-transition comment.
#[must_use]
pub fn transition_fields(
    item: &DeficientItem,
    previous_state: &str,
    current_state: &str,
    author: &UserProfile,
) -> TemplateFields {
    let mut fields = author_fields(author);
    fields.set("previousState", previous_state);
    fields.set("currentState", current_state);
    fields.set_opt("itemTitle", item.item_title.as_deref());
    fields.set_opt("sectionTitle", item.section_title.as_deref());
    fields.set_opt("currentDueDateDay", current_due_day(item).as_deref());
    fields.set_opt(
        "currentDeferredDateDay",
        current_deferred_day(item).as_deref(),
    );
    fields.set_opt(
        "currentResponsibilityGroup",
        item.current_responsibility_group
            .as_deref()
            .map(responsibility_group_label),
    );
    fields.set_opt("currentPlanToFix", item.current_plan_to_fix.as_deref());
    fields.set_opt(
        "currentCompleteNowReason",
        item.current_complete_now_reason.as_deref(),
    );
    fields.set_opt(
        "currentReasonIncomplete",
        item.current_reason_incomplete.as_deref(),
    );
    fields
}

fn non_blank(day: Option<&str>) -> Option<String> {
    day.filter(|day| !day.trim().is_empty()).map(str::to_string)
}

/// The item's due day, else the day of the newest due-date entry.
fn current_due_day(item: &DeficientItem) -> Option<String> {
    non_blank(item.current_due_date_day.as_deref()).or_else(|| {
        let entry: DueDateEntry =
            parse_entry(history::resolve(item, LogName::DueDates).current()?.payload).ok()?;
        non_blank(entry.due_date_day.as_deref()).or_else(|| entry.due_date.and_then(format_day))
    })
}

/// The item's deferred day, else the day of the newest deferred-date entry.
fn current_deferred_day(item: &DeficientItem) -> Option<String> {
    non_blank(item.current_deferred_date_day.as_deref()).or_else(|| {
        let entry: DeferredDateEntry =
            parse_entry(history::resolve(item, LogName::DeferredDates).current()?.payload).ok()?;
        non_blank(entry.deferred_date_day.as_deref())
            .or_else(|| entry.deferred_date.and_then(format_day))
    })
}

/// Author identity fields shared by comment templates.
#[must_use]
pub fn author_fields(author: &UserProfile) -> TemplateFields {
    TemplateFields::new()
        .with("firstName", author.first_name.trim())
        .with("lastName", author.last_name.trim())
        .with("email", author.email.trim())
}

/// Profile for `user_id`, or an empty one when the user is gone.
///
/// # Errors
///
/// Returns [`SyncError::Persistence`] on store failure.
pub fn resolve_author(
    ctx: &SyncContext<'_>,
    item_id: &str,
    user_id: Option<&str>,
) -> Result<UserProfile, SyncError> {
    let Some(user_id) = user_id.filter(|id| !id.trim().is_empty()) else {
        return Ok(UserProfile::default());
    };
    if let Some(profile) = ctx.store.user(user_id)? {
        return Ok(profile);
    }
    warn!(item_id, user_id, "comment author not found; posting without identity");
    Ok(UserProfile::default())
}

impl SyncHandler for CommentHandler {
    fn name(&self) -> &'static str {
        "comment"
    }

    fn handle(
        &self,
        ctx: &SyncContext<'_>,
        event: &StateChangeEvent,
    ) -> Result<Outcome, SyncError> {
        let target = preamble(ctx, event)?;
        let item = &target.item;
        let log = LogName::StateHistory;

        let states = history::resolve(item, log);
        let current = states
            .current()
            .ok_or_else(|| target.invalid_entry(log, "state history is empty"))?;
        let entry =
            StateEntry::parse(current.payload).map_err(|reason| target.invalid_entry(log, reason))?;

        let previous_state = states
            .previous()
            .and_then(|previous| previous.payload.get("state").and_then(Value::as_str))
            .filter(|state| !state.trim().is_empty())
            .unwrap_or(ctx.comments.initial_state.as_str());

        let receipt = comment_receipt_key(target.card_id(), log, current.id);
        if ctx.store.has_comment_receipt(&receipt)? {
            return Ok(Outcome::Skipped(SkipReason::AlreadyCommented));
        }

        let author = resolve_author(ctx, &item.id, Some(&entry.user))?;
        let template = ctx.comments.templates.first(previous_state, &entry.state)?;
        let text = render(
            &template,
            &transition_fields(item, previous_state, &entry.state, &author),
        );

        ctx.api
            .create_comment(target.card_id(), &target.credentials, &text)
            .map_err(|err| target.ticket_error(err))?;
        ctx.store.record_comment_receipt(&receipt)?;

        info!(
            property_id = %event.property_id,
            item_id = %event.item_id,
            card_id = %target.card_id(),
            previous_state,
            current_state = %entry.state,
            "transition comment posted"
        );
        Ok(Outcome::Synced)
    }
}
