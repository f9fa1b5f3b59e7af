//! Document shapes read and written by the sync engine.

pub mod entries;
pub mod integration;
pub mod item;

pub use entries::{
    CompletedPhotoEntry, DeferredDateEntry, DueDateEntry, ProgressNoteEntry, StateEntry,
};
pub use integration::{Credentials, PropertyIntegration, UserProfile};
pub use item::{CardPointer, DeficientItem, HistoryLog, LogName, State};
