use std::fmt;

use crate::cards::CardReference;
use crate::codec::MalformedEvent;
use crate::handlers::SkipReason;
use crate::store::StoreError;
use crate::ticketing::TicketError;

/// Machine-readable error codes for log-based alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    MalformedEvent,
    InvalidArgument,
    InvalidHistoryEntry,
    NoTicket,
    NoCredentials,
    ItemNotFound,
    MalformedItem,
    CardDeleted,
    ExternalApiFailure,
    PersistenceFailure,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::MalformedEvent => "E2001",
            Self::InvalidArgument => "E2002",
            Self::InvalidHistoryEntry => "E2003",
            Self::NoTicket => "E3001",
            Self::NoCredentials => "E3002",
            Self::ItemNotFound => "E3003",
            Self::MalformedItem => "E3004",
            Self::CardDeleted => "E4001",
            Self::ExternalApiFailure => "E4002",
            Self::PersistenceFailure => "E5001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::MalformedEvent => "Malformed state-change event",
            Self::InvalidArgument => "Invalid argument",
            Self::InvalidHistoryEntry => "Invalid history entry",
            Self::NoTicket => "No ticket linked to item",
            Self::NoCredentials => "No ticketing credentials for organization",
            Self::ItemNotFound => "Deficient item not found",
            Self::MalformedItem => "Deficient item document is malformed",
            Self::CardDeleted => "Ticket no longer exists",
            Self::ExternalApiFailure => "Ticketing API failure",
            Self::PersistenceFailure => "Document store failure",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .ditrack/config.toml and retry."),
            Self::MalformedEvent => {
                Some("Publishers must send base64 of `{property}/{item}/state/{state}`.")
            }
            Self::InvalidArgument | Self::ItemNotFound | Self::NoTicket => None,
            Self::InvalidHistoryEntry => {
                Some("Check the writer of the history log; entries need `user` and `state`.")
            }
            Self::NoCredentials => Some("Connect the organization to the ticketing integration."),
            Self::MalformedItem => Some("Inspect the item document for type mismatches."),
            Self::CardDeleted => Some("The card reference was removed; re-open a ticket if needed."),
            Self::ExternalApiFailure => Some("Check ticketing API status; delivery will be retried."),
            Self::PersistenceFailure => Some("Check database availability; delivery will be retried."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Failure kinds raised while synchronizing a deficient item with its ticket.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The bus payload could not be decoded.
    #[error("malformed event: {0}")]
    MalformedEvent(#[from] MalformedEvent),

    /// A caller passed an argument outside the accepted domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A history entry needed by a handler does not have the expected shape.
    #[error("invalid {log} entry on item {item_id}: {reason}")]
    InvalidHistoryEntry {
        item_id: String,
        log: &'static str,
        reason: String,
    },

    /// The item has no card reference.
    #[error("no ticket linked to item {item_id} on property {property_id}")]
    NoTicket {
        property_id: String,
        item_id: String,
    },

    /// The owning organization is not connected to the ticketing system.
    #[error("no ticketing credentials for organization {organization_id}")]
    NoCredentials { organization_id: String },

    /// The item document does not exist.
    #[error("deficient item {item_id} not found")]
    ItemNotFound { item_id: String },

    /// The item document exists but cannot be read as a deficient item.
    #[error("deficient item {item_id} is malformed: {reason}")]
    MalformedItem { item_id: String, reason: String },

    /// The external API reported the card as gone.
    #[error("card {} for item {} no longer exists", .reference.card_id, .reference.item_id)]
    CardDeleted { reference: Box<CardReference> },

    /// Any other ticketing API failure.
    #[error("ticketing API failure: {0}")]
    ExternalApi(TicketError),

    /// The document store failed to read or write.
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

impl SyncError {
    /// Machine-readable code for this failure.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::MalformedEvent(_) => ErrorCode::MalformedEvent,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::InvalidHistoryEntry { .. } => ErrorCode::InvalidHistoryEntry,
            Self::NoTicket { .. } => ErrorCode::NoTicket,
            Self::NoCredentials { .. } => ErrorCode::NoCredentials,
            Self::ItemNotFound { .. } => ErrorCode::ItemNotFound,
            Self::MalformedItem { .. } => ErrorCode::MalformedItem,
            Self::CardDeleted { .. } => ErrorCode::CardDeleted,
            Self::ExternalApi(_) => ErrorCode::ExternalApiFailure,
            Self::Persistence(_) => ErrorCode::PersistenceFailure,
        }
    }

    /// Expected absences are swallowed: the handler reports a skip instead
    /// of failing the delivery.
    #[must_use]
    pub const fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::NoTicket { .. } => Some(SkipReason::NoTicket),
            Self::NoCredentials { .. } => Some(SkipReason::NoCredentials),
            Self::ItemNotFound { .. } => Some(SkipReason::ItemMissing),
            Self::MalformedItem { .. } => Some(SkipReason::ItemMalformed),
            Self::InvalidHistoryEntry { .. } => Some(SkipReason::InvalidHistoryEntry),
            _ => None,
        }
    }

    /// Whether redelivering the same event can succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::ExternalApi(err) => err.is_retryable(),
            Self::Persistence(_) => true,
            _ => false,
        }
    }
}

impl From<TicketError> for SyncError {
    fn from(err: TicketError) -> Self {
        Self::ExternalApi(err)
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorCode, SyncError};
    use crate::ticketing::TicketError;
    use std::collections::HashSet;

    const ALL: [ErrorCode; 12] = [
        ErrorCode::ConfigParseError,
        ErrorCode::MalformedEvent,
        ErrorCode::InvalidArgument,
        ErrorCode::InvalidHistoryEntry,
        ErrorCode::NoTicket,
        ErrorCode::NoCredentials,
        ErrorCode::ItemNotFound,
        ErrorCode::MalformedItem,
        ErrorCode::CardDeleted,
        ErrorCode::ExternalApiFailure,
        ErrorCode::PersistenceFailure,
        ErrorCode::InternalUnexpected,
    ];

    #[test]
    fn all_codes_are_unique() {
        let mut seen = HashSet::new();
        for code in ALL {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        for code in ALL {
            let raw = code.code();
            assert_eq!(raw.len(), 5);
            assert!(raw.starts_with('E'));
            assert!(raw.chars().skip(1).all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn expected_absences_are_skips_not_failures() {
        let err = SyncError::NoCredentials {
            organization_id: "org-1".into(),
        };
        assert!(err.skip_reason().is_some());
        assert!(!err.is_retryable());
        assert_eq!(err.code(), ErrorCode::NoCredentials);
    }

    #[test]
    fn transport_failures_are_retryable() {
        let err = SyncError::from(TicketError::Transport {
            operation: "update card",
            message: "connection reset".into(),
        });
        assert!(err.is_retryable());
        assert!(err.skip_reason().is_none());
        assert_eq!(err.code().code(), "E4002");
    }
}
