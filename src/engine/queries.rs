use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::free_windows;
use super::calendar::ResourceCalendar;
use super::slots::{day_window, find_slots, SlotRequest};
use super::{Engine, EngineError};

impl Engine {
    pub fn get_booking(&self, id: &Ulid) -> Option<Booking> {
        self.bookings.get(id).map(|b| b.value().clone())
    }

    /// Point-in-time copy of a resource's calendar. Takes the read lock only
    /// for the duration of the clone.
    pub async fn calendar_snapshot(&self, resource: &ResourceRef) -> Option<ResourceCalendar> {
        let shared = self.calendars.get(resource).map(|e| e.value().clone())?;
        let guard = shared.read().await;
        Some(guard.clone())
    }

    async fn snapshots(&self, participants: &Participants) -> Vec<ResourceCalendar> {
        let mut calendars = Vec::new();
        for r in participants.resources() {
            if let Some(cal) = self.calendar_snapshot(&r).await {
                calendars.push(cal);
            }
        }
        calendars
    }

    /// Session starts on `date` where every resource named in `participants`
    /// is free for `duration_minutes`. Advisory: a concurrent write may take a
    /// returned slot before the caller books it.
    pub async fn search_availability(
        &self,
        date: NaiveDate,
        duration_minutes: u32,
        participants: &Participants,
    ) -> Result<Vec<Ms>, EngineError> {
        let request = SlotRequest {
            date,
            duration_minutes,
            working_hours: self.settings.working_hours,
            granularity_minutes: self.settings.granularity_minutes,
            utc_offset: self.settings.utc_offset,
        };
        let calendars = self.snapshots(participants).await;
        find_slots(&request, &calendars)
    }

    /// Stretches of `date`'s working hours during which `resource` holds no
    /// active booking.
    pub async fn free_windows(&self, resource: &ResourceRef, date: NaiveDate) -> Result<Vec<Span>, EngineError> {
        let window = day_window(date, &self.settings.working_hours, self.settings.utc_offset)?;
        let calendars: Vec<ResourceCalendar> = self.calendar_snapshot(resource).await.into_iter().collect();
        Ok(free_windows(&window, &calendars))
    }

    /// Every booking of any status that involves `resource` and touches `window`,
    /// in start order.
    pub fn resource_schedule(&self, resource: &ResourceRef, window: &Span) -> Result<Vec<Booking>, EngineError> {
        if window.start < MIN_VALID_TIMESTAMP_MS || window.end > MAX_VALID_TIMESTAMP_MS {
            return Err(EngineError::LimitExceeded("schedule window out of range"));
        }
        if window.duration_ms() > MAX_SCHEDULE_WINDOW_MS {
            return Err(EngineError::LimitExceeded("schedule window too wide"));
        }
        let mut bookings: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|e| e.participants.references(resource) && e.span.overlaps(window))
            .map(|e| e.value().clone())
            .collect();
        bookings.sort_by_key(|b| (b.span.start, b.id));
        Ok(bookings)
    }

    pub fn booking_count(&self) -> usize {
        self.bookings.len()
    }
}
