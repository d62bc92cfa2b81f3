use ulid::Ulid;

use crate::model::{BookingStatus, Ms, ResourceRef};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Malformed input, rejected before any calendar is read.
    Validation(String),
    NotFound(Ulid),
    /// `resource` is already held by the active booking `booking`.
    Conflict {
        resource: ResourceRef,
        booking: Ulid,
    },
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    Forbidden(&'static str),
    /// Time-gated transition attempted before its threshold.
    TooEarly {
        to: BookingStatus,
        not_before: Ms,
    },
    NotEditable(BookingStatus),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "invalid request: {msg}"),
            EngineError::NotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::Conflict { resource, booking } => {
                write!(f, "{resource} is already booked by {booking}")
            }
            EngineError::InvalidTransition { from, to } => {
                write!(f, "cannot move booking from {from} to {to}")
            }
            EngineError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            EngineError::TooEarly { to, not_before } => {
                write!(f, "booking cannot become {to} before {not_before}")
            }
            EngineError::NotEditable(status) => {
                write!(f, "a {status} booking can no longer be edited")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
