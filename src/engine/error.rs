use std::fmt;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::BookingStatus;

/// Caller-facing classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Holiday,
    SlotFull,
    InvalidTransition,
    NotFound,
    PermissionDenied,
    StoreFailure,
    LimitExceeded,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Holiday => "HOLIDAY",
            ErrorKind::SlotFull => "SLOT_FULL",
            ErrorKind::InvalidTransition => "INVALID_TRANSITION",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ErrorKind::StoreFailure => "STORE_FAILURE",
            ErrorKind::LimitExceeded => "LIMIT_EXCEEDED",
        }
    }

    /// Only store failures may be retried transparently.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::StoreFailure)
    }

    /// The slot could not be taken: blacked out or out of capacity.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ErrorKind::Holiday | ErrorKind::SlotFull)
    }

    /// SQLSTATE reported on the wire.
    pub fn sqlstate(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "22023",
            ErrorKind::Holiday => "SB001",
            ErrorKind::SlotFull => "23P01",
            ErrorKind::InvalidTransition => "55000",
            ErrorKind::NotFound => "P0002",
            ErrorKind::PermissionDenied => "42501",
            ErrorKind::StoreFailure => "58030",
            ErrorKind::LimitExceeded => "54000",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub enum EngineError {
    Validation(String),
    Holiday(NaiveDate),
    SlotFull { window_id: Ulid, capacity: u32 },
    InvalidTransition { from: BookingStatus, to: BookingStatus },
    NotFound(Ulid),
    AlreadyExists(Ulid),
    PermissionDenied(String),
    LimitExceeded(&'static str),
    WalError(String),
    /// The task feed could not be read.
    TaskFeed(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) | EngineError::AlreadyExists(_) => ErrorKind::Validation,
            EngineError::Holiday(_) => ErrorKind::Holiday,
            EngineError::SlotFull { .. } => ErrorKind::SlotFull,
            EngineError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            EngineError::LimitExceeded(_) => ErrorKind::LimitExceeded,
            EngineError::WalError(_) | EngineError::TaskFeed(_) => ErrorKind::StoreFailure,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.kind())?;
        match self {
            EngineError::Validation(msg) => write!(f, "{msg}"),
            EngineError::Holiday(date) => write!(f, "{date} is an unavailable date"),
            EngineError::SlotFull { window_id, capacity } => {
                write!(f, "slot no longer available: window {window_id} holds {capacity}")
            }
            EngineError::InvalidTransition { from, to } => {
                write!(f, "cannot move booking from {from} to {to}")
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::PermissionDenied(msg) => write!(f, "{msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "journal error: {e}"),
            EngineError::TaskFeed(e) => write!(f, "task feed unavailable: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_leads_with_kind() {
        let e = EngineError::SlotFull {
            window_id: Ulid::nil(),
            capacity: 1,
        };
        assert!(e.to_string().starts_with("SLOT_FULL: "));
        let e = EngineError::InvalidTransition {
            from: BookingStatus::Cancelled,
            to: BookingStatus::Confirmed,
        };
        assert_eq!(e.to_string(), "INVALID_TRANSITION: cannot move booking from CANCELLED to CONFIRMED");
    }

    #[test]
    fn only_store_failures_retry() {
        assert!(EngineError::WalError("disk".into()).kind().is_retryable());
        assert!(!EngineError::SlotFull { window_id: Ulid::nil(), capacity: 1 }.kind().is_retryable());
        assert!(!EngineError::Validation("x".into()).kind().is_retryable());
    }

    #[test]
    fn conflict_family() {
        assert!(ErrorKind::Holiday.is_conflict());
        assert!(ErrorKind::SlotFull.is_conflict());
        assert!(!ErrorKind::NotFound.is_conflict());
    }
}
