use chrono::{FixedOffset, NaiveDate, NaiveTime, TimeZone};

use crate::limits::*;
use crate::model::*;

use super::calendar::ResourceCalendar;
use super::EngineError;

/// Inputs to slot enumeration for one day.
#[derive(Debug, Clone, Copy)]
pub struct SlotRequest {
    pub date: NaiveDate,
    pub duration_minutes: u32,
    pub working_hours: WorkingHours,
    pub granularity_minutes: u32,
    pub utc_offset: FixedOffset,
}

fn local_instant(date: NaiveDate, time: NaiveTime, offset: FixedOffset) -> Result<Ms, EngineError> {
    offset
        .from_local_datetime(&date.and_time(time))
        .single()
        .map(|dt| dt.timestamp_millis())
        .ok_or_else(|| EngineError::Validation(format!("{date} {time} is not a valid local time")))
}

/// The working-hour window of `date` as absolute instants.
pub fn day_window(
    date: NaiveDate,
    hours: &WorkingHours,
    offset: FixedOffset,
) -> Result<Span, EngineError> {
    let start = local_instant(date, hours.start, offset)?;
    let end = local_instant(date, hours.end, offset)?;
    let window = Span::checked(start, end)
        .ok_or_else(|| EngineError::Validation("working hours must end after they start".into()))?;
    // Slots outside this range could never be booked.
    if window.start < MIN_VALID_TIMESTAMP_MS || window.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("date out of range"));
    }
    Ok(window)
}

pub fn validate_granularity(minutes: u32) -> Result<(), EngineError> {
    if !(MIN_SLOT_GRANULARITY_MIN..=MAX_SLOT_GRANULARITY_MIN).contains(&minutes) {
        return Err(EngineError::Validation(format!(
            "slot granularity must be between {MIN_SLOT_GRANULARITY_MIN} and {MAX_SLOT_GRANULARITY_MIN} minutes"
        )));
    }
    Ok(())
}

/// Candidate session starts on `request.date`, stepping by the granularity from the
/// start of working hours, for which `[start, start + duration)` fits inside working
/// hours and is free in every supplied calendar.
///
/// Only the calendars passed in are checked, so a partial query (say, instructor
/// only) ignores the other resource kinds. With no calendars every candidate is
/// returned. A duration longer than the working day yields no slots.
pub fn find_slots(
    request: &SlotRequest,
    calendars: &[ResourceCalendar],
) -> Result<Vec<Ms>, EngineError> {
    if request.duration_minutes == 0 {
        return Err(EngineError::Validation("duration must be positive".into()));
    }
    validate_granularity(request.granularity_minutes)?;

    let window = day_window(request.date, &request.working_hours, request.utc_offset)?;
    let duration = add_minutes(0, request.duration_minutes as i64);
    let step = add_minutes(0, request.granularity_minutes as i64);

    let mut slots = Vec::new();
    let mut start = window.start;
    while start + duration <= window.end {
        let candidate = Span::new(start, start + duration);
        if calendars.iter().all(|cal| cal.is_free(&candidate, None)) {
            slots.push(start);
        }
        start += step;
    }
    Ok(slots)
}
