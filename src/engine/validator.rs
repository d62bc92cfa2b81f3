use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::calendar::ResourceCalendar;
use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    if span.start >= span.end {
        return Err(EngineError::Validation("session must end after it starts".into()));
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("session too long"));
    }
    Ok(())
}

/// Shape rules that do not depend on other bookings.
pub(crate) fn validate_participants(
    participants: &Participants,
    status: BookingStatus,
) -> Result<(), EngineError> {
    if participants.is_empty() {
        return Err(EngineError::Validation(
            "select at least one of student, instructor or aircraft".into(),
        ));
    }
    if status != BookingStatus::Requested
        && (participants.student.is_none() || participants.instructor.is_none())
    {
        return Err(EngineError::Validation(
            "a confirmed booking needs a student and an instructor".into(),
        ));
    }
    Ok(())
}

/// Check a proposed booking against the calendars of every resource it names.
///
/// Must run while the caller holds the write locks of those calendars, right
/// before the booking is committed. Resources are checked student, instructor,
/// aircraft; the first busy one is reported. `exclude` is the booking's own id
/// when an existing booking is being moved.
pub(crate) fn validate_booking<'a>(
    calendar: impl Fn(&ResourceRef) -> Option<&'a ResourceCalendar>,
    span: &Span,
    participants: &Participants,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    validate_span(span)?;
    for resource in participants.resources() {
        if let Some(cal) = calendar(&resource)
            && let Some(booking) = cal.first_conflict(span, exclude)
        {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL, "kind" => resource.kind.to_string())
                .increment(1);
            return Err(EngineError::Conflict { resource, booking });
        }
    }
    Ok(())
}
