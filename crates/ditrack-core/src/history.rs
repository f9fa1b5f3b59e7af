//! History resolution over append-only, multi-writer logs.
//!
//! A log is a map of opaque entry id to payload. Writers never coordinate,
//! so the only ordering signal is each entry's numeric `createdAt`. The
//! resolver builds a descending view over the entries that carry one:
//!
//! - `current` is the newest entry, `previous` the one before it
//! - entries without a numeric `createdAt` (or that are not objects) are
//!   excluded entirely
//! - equal `createdAt` values are ordered by entry id, descending, so the
//!   lexicographically greater id is treated as more recent
//!
//! Resolution is a pure read: it borrows the item and never copies payloads.

use serde_json::Value;
use std::cmp::Ordering;

use crate::model::{DeficientItem, HistoryLog, LogName};

/// One entry of a resolved log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryEntry<'a> {
    /// Key the entry is stored under.
    pub id: &'a str,
    pub created_at: f64,
    pub payload: &'a Value,
}

/// Descending-time view over one history log.
#[derive(Debug, Clone)]
pub struct ResolvedHistory<'a> {
    log: Option<&'a HistoryLog>,
    ordered: Vec<HistoryEntry<'a>>,
}

impl<'a> ResolvedHistory<'a> {
    /// Newest entry, if any.
    #[must_use]
    pub fn current(&self) -> Option<HistoryEntry<'a>> {
        self.ordered.first().copied()
    }

    /// Second-newest entry, if any.
    #[must_use]
    pub fn previous(&self) -> Option<HistoryEntry<'a>> {
        self.ordered.get(1).copied()
    }

    /// All orderable entries, newest first.
    #[must_use]
    pub fn entries(&self) -> &[HistoryEntry<'a>] {
        &self.ordered
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Key under which `payload` is stored, matched by reference identity.
    ///
    /// Equal-valued payloads under different keys are told apart because
    /// the lookup compares addresses, not contents.
    #[must_use]
    pub fn id_of(&self, payload: &Value) -> Option<&'a str> {
        self.log?
            .iter()
            .find(|(_, stored)| std::ptr::eq(*stored, payload))
            .map(|(id, _)| id.as_str())
    }
}

/// Resolve one of an item's named logs.
#[must_use]
pub fn resolve(item: &DeficientItem, name: LogName) -> ResolvedHistory<'_> {
    resolve_log(item.log(name))
}

/// Resolve a raw log. An absent log resolves like an empty one.
#[must_use]
pub fn resolve_log(log: Option<&HistoryLog>) -> ResolvedHistory<'_> {
    let mut ordered: Vec<HistoryEntry<'_>> = log
        .into_iter()
        .flatten()
        .filter_map(|(id, payload)| {
            let created_at = payload.as_object()?.get("createdAt")?.as_f64()?;
            Some(HistoryEntry {
                id,
                created_at,
                payload,
            })
        })
        .collect();

    ordered.sort_by(newest_first);

    ResolvedHistory { log, ordered }
}

fn newest_first(a: &HistoryEntry<'_>, b: &HistoryEntry<'_>) -> Ordering {
    b.created_at
        .total_cmp(&a.created_at)
        .then_with(|| b.id.cmp(a.id))
}
