//! Progress-Note: post new progress notes as card comments.

use tracing::info;

use super::comment::{author_fields, resolve_author};
use super::{Outcome, SkipReason, SyncContext, SyncHandler, is_triggering_write, preamble};
use crate::codec::StateChangeEvent;
use crate::error::SyncError;
use crate::history;
use crate::model::LogName;
use crate::model::entries::{ProgressNoteEntry, parse_entry};
use crate::store::comment_receipt_key;
use crate::templates::render;

#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressNoteHandler;

impl SyncHandler for ProgressNoteHandler {
    fn name(&self) -> &'static str {
        "progress-note"
    }

    fn handle(
        &self,
        ctx: &SyncContext<'_>,
        event: &StateChangeEvent,
    ) -> Result<Outcome, SyncError> {
        let target = preamble(ctx, event)?;
        let log = LogName::ProgressNotes;

        let Some(current) = history::resolve(&target.item, log)
            .current()
            .filter(|entry| is_triggering_write(&target.item, event, entry))
        else {
            return Ok(Outcome::Skipped(SkipReason::NotTriggeringWrite));
        };
        let note: ProgressNoteEntry =
            parse_entry(current.payload).map_err(|reason| target.invalid_entry(log, reason))?;
        if note.progress_note.trim().is_empty() {
            return Err(target.invalid_entry(log, "`progressNote` is empty"));
        }

        let receipt = comment_receipt_key(target.card_id(), log, current.id);
        if ctx.store.has_comment_receipt(&receipt)? {
            return Ok(Outcome::Skipped(SkipReason::AlreadyCommented));
        }

        let author = resolve_author(ctx, &target.item.id, note.user.as_deref())?;
        let fields = author_fields(&author).with("progressNote", note.progress_note.trim());
        let text = render(&ctx.comments.progress_note_template, &fields);

        ctx.api
            .create_comment(target.card_id(), &target.credentials, &text)
            .map_err(|err| target.ticket_error(err))?;
        ctx.store.record_comment_receipt(&receipt)?;

        info!(
            property_id = %event.property_id,
            item_id = %event.item_id,
            card_id = %target.card_id(),
            entry_id = current.id,
            "progress note posted"
        );
        Ok(Outcome::Synced)
    }
}
