//! Photo-Attachment: attach the newest completion photo to the card and
//! remember the attachment on the photo entry.

use tracing::{info, warn};

use super::{Outcome, SkipReason, SyncContext, SyncHandler, preamble};
use crate::codec::StateChangeEvent;
use crate::error::SyncError;
use crate::history;
use crate::model::LogName;
use crate::model::entries::{CompletedPhotoEntry, parse_entry};

#[derive(Debug, Clone, Copy, Default)]
pub struct PhotoAttachmentHandler;

impl SyncHandler for PhotoAttachmentHandler {
    fn name(&self) -> &'static str {
        "photo-attachment"
    }

    fn handle(
        &self,
        ctx: &SyncContext<'_>,
        event: &StateChangeEvent,
    ) -> Result<Outcome, SyncError> {
        let target = preamble(ctx, event)?;
        let log = LogName::CompletedPhotos;

        let photos = history::resolve(&target.item, log);
        let Some(current) = photos.current() else {
            return Ok(Outcome::Skipped(SkipReason::NotApplicable));
        };
        let photo: CompletedPhotoEntry =
            parse_entry(current.payload).map_err(|reason| target.invalid_entry(log, reason))?;

        if photo.is_attached() {
            return Ok(Outcome::Skipped(SkipReason::AlreadyAttached));
        }
        let Some(source_url) = photo.source_url() else {
            return Ok(Outcome::Skipped(SkipReason::MissingSourceUrl));
        };

        let entry_id = photos
            .id_of(current.payload)
            .ok_or_else(|| target.invalid_entry(log, "entry is not part of the log"))?;

        let attachment_id = ctx
            .api
            .create_attachment(target.card_id(), &target.credentials, source_url)
            .map_err(|err| target.ticket_error(err))?;

        if !ctx
            .store
            .set_photo_attachment(&target.item.id, entry_id, &attachment_id)?
        {
            warn!(
                item_id = %target.item.id,
                entry_id,
                attachment_id = %attachment_id,
                "photo entry vanished before attachment could be recorded"
            );
        }

        info!(
            property_id = %event.property_id,
            item_id = %event.item_id,
            card_id = %target.card_id(),
            entry_id,
            attachment_id = %attachment_id,
            "completion photo attached"
        );
        Ok(Outcome::Synced)
    }
}
