//! ditrack-core library.
//!
//! Keeps deficient items found during property inspections in step with the
//! cards that track them in an external ticketing system. A state change on
//! an item is published as an encoded message; every [`handlers::SyncHandler`]
//! receives it through the [`bus::EventBus`] and pushes its part of the item
//! (list, due date, comments, photos, progress notes) to the linked card.
//!
//! # Conventions
//!
//! - **Errors**: domain failures are [`error::SyncError`] with a stable
//!   [`error::ErrorCode`]; loading and opening use `anyhow::Result` with
//!   context.
//! - **Logging**: use `tracing` macros (`info!`, `warn!`, `error!`,
//!   `debug!`) with structured `property_id`, `item_id` and `card_id`
//!   fields.

pub mod bus;
pub mod cards;
pub mod cleanup;
pub mod codec;
pub mod config;
pub mod dates;
pub mod error;
pub mod handlers;
pub mod history;
pub mod model;
pub mod store;
pub mod templates;
pub mod ticketing;

#[cfg(test)]
mod testing;

pub use bus::{BusReport, DeadLetter, EventBus};
pub use codec::{StateChangeEvent, decode, encode};
pub use error::{ErrorCode, SyncError};
pub use handlers::{Outcome, SkipReason, SyncContext, SyncHandler, default_handlers};
pub use history::{HistoryEntry, ResolvedHistory, resolve};
pub use templates::CommentTemplates;
