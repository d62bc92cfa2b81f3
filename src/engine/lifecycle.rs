//! Booking lifecycle: which status changes exist, who may make them and when.
//!
//! ```text
//! Requested ──accept──▶ Pending ──start──▶ Ongoing ──complete──▶ Completed
//!     │                    │                  │
//!     └──decline/withdraw──┴──────cancel──────┴──────────────────▶ Cancelled
//! ```
//!
//! `Completed` and `Cancelled` are terminal. Time guards read the instant the
//! caller passes in; nothing here promotes a booking on its own.

use crate::model::*;

use super::EngineError;

/// The transition table, independent of role and time.
pub fn is_legal(from: BookingStatus, to: BookingStatus) -> bool {
    use BookingStatus::*;
    matches!(
        (from, to),
        (Requested, Pending)
            | (Requested, Cancelled)
            | (Pending, Ongoing)
            | (Pending, Cancelled)
            | (Ongoing, Completed)
            | (Ongoing, Cancelled)
    )
}

/// Whether `actor` may act on a booking with these participants. Students only
/// for themselves; instructors for their own sessions or ones without an
/// instructor yet.
fn acts_for(participants: &Participants, actor: &Actor) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Instructor => {
            participants.instructor.is_none() || participants.instructor == actor.id
        }
        Role::Student => actor.id.is_some() && participants.student == actor.id,
    }
}

/// Gate a status change: legality, then role, then wall-clock time.
pub(crate) fn check_transition(
    booking: &Booking,
    to: BookingStatus,
    actor: &Actor,
    now: Ms,
) -> Result<(), EngineError> {
    let from = booking.status;
    if !is_legal(from, to) {
        return Err(EngineError::InvalidTransition { from, to });
    }

    match actor.role {
        Role::Student if !(from == BookingStatus::Requested && to == BookingStatus::Cancelled) => {
            return Err(EngineError::Forbidden("students may only withdraw their own requests"));
        }
        _ => {}
    }
    if !acts_for(&booking.participants, actor) {
        return Err(EngineError::Forbidden("booking belongs to someone else"));
    }

    match to {
        BookingStatus::Ongoing if now < booking.span.start => Err(EngineError::TooEarly {
            to,
            not_before: booking.span.start,
        }),
        BookingStatus::Completed if now < booking.span.end => Err(EngineError::TooEarly {
            to,
            not_before: booking.span.end,
        }),
        _ => Ok(()),
    }
}

/// Student-originated bookings start as requests; instructors and admins may
/// create confirmed (`Pending`) bookings directly.
pub(crate) fn check_create(new: &NewBooking, actor: &Actor) -> Result<(), EngineError> {
    match new.status {
        BookingStatus::Requested | BookingStatus::Pending => {}
        other => {
            return Err(EngineError::Validation(format!(
                "a booking cannot be created as {other}"
            )));
        }
    }
    if actor.role == Role::Student && new.status != BookingStatus::Requested {
        return Err(EngineError::Forbidden("students can only request sessions"));
    }
    if !acts_for(&new.participants, actor) {
        return Err(EngineError::Forbidden("cannot book on behalf of someone else"));
    }
    Ok(())
}

/// Edits are allowed until the session starts. Students may only reshape their
/// own open requests.
pub(crate) fn check_update(
    booking: &Booking,
    participants: &Participants,
    actor: &Actor,
) -> Result<(), EngineError> {
    if !matches!(booking.status, BookingStatus::Requested | BookingStatus::Pending) {
        return Err(EngineError::NotEditable(booking.status));
    }
    if actor.role == Role::Student && booking.status != BookingStatus::Requested {
        return Err(EngineError::Forbidden("confirmed sessions are changed by staff"));
    }
    if !acts_for(&booking.participants, actor) || !acts_for(participants, actor) {
        return Err(EngineError::Forbidden("booking belongs to someone else"));
    }
    Ok(())
}
