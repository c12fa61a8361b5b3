use ulid::Ulid;

use crate::policy::DenyReason;

/// Coarse outcome class, for mapping onto transport status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    EligibilityDenied,
    Conflict,
    Forbidden,
    NotFound,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },
    #[error("invalid range: operating hours must be non-empty and slots at least one minute")]
    InvalidRange,
    #[error("{0}")]
    EligibilityDenied(DenyReason),
    #[error("room already reserved for this slot (reservation {existing})")]
    RoomSlotConflict { existing: Ulid },
    #[error("user already holds a reservation in this slot (reservation {existing})")]
    UserSlotConflict { existing: Ulid },
    #[error("conflict: timed out waiting for the day's ledger")]
    Contended,
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("internal error: {0}")]
    Internal(String),
}

impl BookingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BookingError::Validation { .. }
            | BookingError::InvalidRange
            | BookingError::LimitExceeded(_) => ErrorKind::Validation,
            BookingError::EligibilityDenied(_) => ErrorKind::EligibilityDenied,
            BookingError::RoomSlotConflict { .. }
            | BookingError::UserSlotConflict { .. }
            | BookingError::Contended => ErrorKind::Conflict,
            BookingError::Forbidden(_) => ErrorKind::Forbidden,
            BookingError::NotFound { .. } => ErrorKind::NotFound,
            BookingError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        BookingError::Validation {
            field,
            message: message.into(),
        }
    }

    pub(crate) fn not_found(what: &'static str, id: impl ToString) -> Self {
        BookingError::NotFound {
            what,
            id: id.to_string(),
        }
    }
}
