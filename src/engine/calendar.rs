use ulid::Ulid;

use crate::model::{ResourceRef, Span};

/// One active booking as seen from a single resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarEntry {
    pub booking_id: Ulid,
    pub span: Span,
}

/// Derived, start-ordered view of the active bookings holding one resource.
/// Rebuilt from the booking set on startup; never persisted.
#[derive(Debug, Clone)]
pub struct ResourceCalendar {
    pub resource: ResourceRef,
    /// Sorted by `span.start`.
    pub entries: Vec<CalendarEntry>,
}

impl ResourceCalendar {
    pub fn new(resource: ResourceRef) -> Self {
        Self {
            resource,
            entries: Vec::new(),
        }
    }

    pub fn insert(&mut self, booking_id: Ulid, span: Span) {
        let pos = self.entries.partition_point(|e| e.span.start <= span.start);
        self.entries.insert(pos, CalendarEntry { booking_id, span });
    }

    pub fn remove(&mut self, booking_id: Ulid) -> Option<CalendarEntry> {
        let pos = self.entries.iter().position(|e| e.booking_id == booking_id)?;
        Some(self.entries.remove(pos))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries whose span overlaps `query`. Entries starting at or after
    /// `query.end` are skipped by binary search.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &CalendarEntry> {
        let right_bound = self.entries.partition_point(|e| e.span.start < query.end);
        self.entries[..right_bound]
            .iter()
            .filter(move |e| e.span.end > query.start)
    }

    /// First active booking occupying `span`, ignoring `exclude` so a booking
    /// can be moved within its own slot.
    pub fn first_conflict(&self, span: &Span, exclude: Option<Ulid>) -> Option<Ulid> {
        self.overlapping(span)
            .find(|e| Some(e.booking_id) != exclude)
            .map(|e| e.booking_id)
    }

    pub fn is_free(&self, span: &Span, exclude: Option<Ulid>) -> bool {
        self.first_conflict(span, exclude).is_none()
    }

    /// Busy spans clipped to `window`, in start order.
    pub fn busy_within(&self, window: &Span) -> Vec<Span> {
        self.overlapping(window)
            .map(|e| Span::new(e.span.start.max(window.start), e.span.end.min(window.end)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Ms;

    const H: Ms = 3_600_000;

    fn calendar(spans: &[(Ms, Ms)]) -> (ResourceCalendar, Vec<Ulid>) {
        let mut cal = ResourceCalendar::new(ResourceRef::instructor(Ulid::new()));
        let ids: Vec<Ulid> = spans
            .iter()
            .map(|&(s, e)| {
                let id = Ulid::new();
                cal.insert(id, Span::new(s, e));
                id
            })
            .collect();
        (cal, ids)
    }

    #[test]
    fn insert_keeps_start_order() {
        let (cal, _) = calendar(&[(14 * H, 15 * H), (9 * H, 10 * H), (11 * H, 12 * H)]);
        let starts: Vec<Ms> = cal.entries.iter().map(|e| e.span.start).collect();
        assert_eq!(starts, vec![9 * H, 11 * H, 14 * H]);
    }

    #[test]
    fn boundary_touch_is_free() {
        let (cal, _) = calendar(&[(9 * H, 10 * H)]);
        assert!(cal.is_free(&Span::new(10 * H, 11 * H), None));
        assert!(cal.is_free(&Span::new(8 * H, 9 * H), None));
        assert!(!cal.is_free(&Span::new(9 * H + 59 * 60_000, 11 * H), None));
    }

    #[test]
    fn first_conflict_reports_earliest_overlap() {
        let (cal, ids) = calendar(&[(9 * H, 10 * H), (10 * H, 11 * H)]);
        assert_eq!(cal.first_conflict(&Span::new(9 * H, 12 * H), None), Some(ids[0]));
        assert_eq!(cal.first_conflict(&Span::new(10 * H, 12 * H), None), Some(ids[1]));
    }

    #[test]
    fn exclude_ignores_own_booking() {
        let (cal, ids) = calendar(&[(9 * H, 10 * H)]);
        let shifted = Span::new(9 * H + 30 * 60_000, 10 * H + 30 * 60_000);
        assert!(!cal.is_free(&shifted, None));
        assert!(cal.is_free(&shifted, Some(ids[0])));
        assert!(!cal.is_free(&shifted, Some(Ulid::new())));
    }

    #[test]
    fn long_entry_spanning_query_is_found() {
        let (cal, ids) = calendar(&[(6 * H, 18 * H)]);
        assert_eq!(cal.first_conflict(&Span::new(12 * H, 13 * H), None), Some(ids[0]));
    }

    #[test]
    fn remove_frees_the_slot() {
        let (mut cal, ids) = calendar(&[(9 * H, 10 * H), (12 * H, 13 * H)]);
        assert!(cal.remove(ids[0]).is_some());
        assert!(cal.remove(ids[0]).is_none());
        assert!(cal.is_free(&Span::new(9 * H, 10 * H), None));
        assert_eq!(cal.entries.len(), 1);
    }

    #[test]
    fn busy_within_clips_to_window() {
        let (cal, _) = calendar(&[(7 * H, 9 * H), (12 * H, 13 * H), (17 * H, 19 * H)]);
        let busy = cal.busy_within(&Span::new(8 * H, 18 * H));
        assert_eq!(
            busy,
            vec![Span::new(8 * H, 9 * H), Span::new(12 * H, 13 * H), Span::new(17 * H, 18 * H)]
        );
    }
}
