use std::fmt;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only instant type inside the engine.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;

pub fn add_minutes(t: Ms, minutes: i64) -> Ms {
    t + minutes * MINUTE_MS
}

/// Number of `granularity_minutes`-wide grid cells a span touches, rounded up.
/// A 90 minute lesson on a 60 minute grid spans 2 cells.
pub fn span_slots(span: &Span, granularity_minutes: u32) -> u32 {
    let cell = granularity_minutes.max(1) as Ms * MINUTE_MS;
    let duration = span.duration_ms().max(0);
    ((duration + cell - 1) / cell) as u32
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Build a span from untrusted bounds.
    pub fn checked(start: Ms, end: Ms) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration_ms(&self) -> Ms {
        self.end.saturating_sub(self.start)
    }

    /// Touching endpoints do not overlap: `[9,10)` and `[10,11)` are disjoint.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

// ── Resources ────────────────────────────────────────────────────

/// Declaration order is the validator's check order and the lock order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Student,
    Instructor,
    Aircraft,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceKind::Student => "student",
            ResourceKind::Instructor => "instructor",
            ResourceKind::Aircraft => "aircraft",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: Ulid,
}

impl ResourceRef {
    pub fn student(id: Ulid) -> Self {
        Self { kind: ResourceKind::Student, id }
    }

    pub fn instructor(id: Ulid) -> Self {
        Self { kind: ResourceKind::Instructor, id }
    }

    pub fn aircraft(id: Ulid) -> Self {
        Self { kind: ResourceKind::Aircraft, id }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// Who a booking consumes. Resources are referenced, never owned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participants {
    pub student: Option<Ulid>,
    pub instructor: Option<Ulid>,
    pub aircraft: Option<Ulid>,
}

impl Participants {
    /// Present resources in check order: student, instructor, aircraft.
    pub fn resources(&self) -> impl Iterator<Item = ResourceRef> {
        [
            self.student.map(ResourceRef::student),
            self.instructor.map(ResourceRef::instructor),
            self.aircraft.map(ResourceRef::aircraft),
        ]
        .into_iter()
        .flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.student.is_none() && self.instructor.is_none() && self.aircraft.is_none()
    }

    pub fn references(&self, resource: &ResourceRef) -> bool {
        self.resources().any(|r| r == *resource)
    }
}

// ── Bookings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// A student's ask. Holds nothing.
    Requested,
    Pending,
    Ongoing,
    Completed,
    Cancelled,
}

impl BookingStatus {
    /// Active bookings are the only ones that hold their resources.
    pub fn is_active(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Ongoing)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BookingStatus::Requested => "requested",
            BookingStatus::Pending => "pending",
            BookingStatus::Ongoing => "ongoing",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub span: Span,
    pub participants: Participants,
    pub status: BookingStatus,
    /// Lesson content template; opaque to scheduling.
    pub lesson_template: Option<Ulid>,
    pub created_at: Ms,
    pub updated_at: Ms,
}

/// Input to `Engine::create_booking`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub span: Span,
    pub participants: Participants,
    pub status: BookingStatus,
    pub lesson_template: Option<Ulid>,
}

/// Fields replaced by `Engine::update_booking`; `None` keeps the current value.
/// `participants` replaces the whole set, so a resource is dropped by leaving it
/// out. `Some(None)` clears the lesson template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingPatch {
    pub span: Option<Span>,
    pub participants: Option<Participants>,
    pub lesson_template: Option<Option<Ulid>>,
}

// ── Actors ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Instructor,
    Admin,
}

/// The caller on whose behalf an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub role: Role,
    #[serde(default)]
    pub id: Option<Ulid>,
}

impl Actor {
    pub fn student(id: Ulid) -> Self {
        Self { role: Role::Student, id: Some(id) }
    }

    pub fn instructor(id: Ulid) -> Self {
        Self { role: Role::Instructor, id: Some(id) }
    }

    pub fn admin() -> Self {
        Self { role: Role::Admin, id: None }
    }
}

// ── Working hours ────────────────────────────────────────────────

/// Daily window in the school's local time within which sessions may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
            end: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or_default(),
        }
    }
}

/// The event types, flat with no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BookingCreated {
        booking: Booking,
    },
    BookingUpdated {
        id: Ulid,
        span: Span,
        participants: Participants,
        lesson_template: Option<Ulid>,
        updated_at: Ms,
    },
    StatusChanged {
        id: Ulid,
        status: BookingStatus,
        updated_at: Ms,
    },
}

impl Event {
    pub fn booking_id(&self) -> Ulid {
        match self {
            Event::BookingCreated { booking } => booking.id,
            Event::BookingUpdated { id, .. } | Event::StatusChanged { id, .. } => *id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Ms = 3_600_000;

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(9 * H, 10 * H);
        let b = Span::new(9 * H + 30 * MINUTE_MS, 11 * H);
        let c = Span::new(10 * H, 11 * H);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn span_checked_rejects_empty_and_inverted() {
        assert!(Span::checked(100, 100).is_none());
        assert!(Span::checked(200, 100).is_none());
        assert_eq!(Span::checked(100, 200), Some(Span::new(100, 200)));
    }

    #[test]
    fn add_minutes_moves_forward_and_back() {
        assert_eq!(add_minutes(0, 90), 90 * MINUTE_MS);
        assert_eq!(add_minutes(H, -30), 30 * MINUTE_MS);
    }

    #[test]
    fn span_slots_rounds_up() {
        assert_eq!(span_slots(&Span::new(0, 90 * MINUTE_MS), 60), 2);
        assert_eq!(span_slots(&Span::new(0, 60 * MINUTE_MS), 60), 1);
        assert_eq!(span_slots(&Span::new(0, 30 * MINUTE_MS), 60), 1);
        assert_eq!(span_slots(&Span::new(0, 240 * MINUTE_MS), 60), 4);
        assert_eq!(span_slots(&Span::new(0, 61 * MINUTE_MS), 30), 3);
    }

    #[test]
    fn participants_resources_in_check_order() {
        let (s, i, a) = (Ulid::new(), Ulid::new(), Ulid::new());
        let p = Participants { student: Some(s), instructor: Some(i), aircraft: Some(a) };
        let refs: Vec<_> = p.resources().collect();
        assert_eq!(
            refs,
            vec![ResourceRef::student(s), ResourceRef::instructor(i), ResourceRef::aircraft(a)]
        );
        let mut sorted = refs.clone();
        sorted.sort();
        assert_eq!(sorted, refs);
    }

    #[test]
    fn participants_partial() {
        let a = Ulid::new();
        let p = Participants { aircraft: Some(a), ..Default::default() };
        assert!(!p.is_empty());
        assert!(p.references(&ResourceRef::aircraft(a)));
        assert!(!p.references(&ResourceRef::instructor(a)));
        assert!(Participants::default().is_empty());
    }

    #[test]
    fn status_activity() {
        assert!(!BookingStatus::Requested.is_active());
        assert!(BookingStatus::Pending.is_active());
        assert!(BookingStatus::Ongoing.is_active());
        assert!(!BookingStatus::Completed.is_active());
        assert!(!BookingStatus::Cancelled.is_active());
        assert!(BookingStatus::Completed.is_terminal());
        assert!(BookingStatus::Cancelled.is_terminal());
        assert!(!BookingStatus::Ongoing.is_terminal());
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingCreated {
            booking: Booking {
                id: Ulid::new(),
                span: Span::new(9 * H, 10 * H),
                participants: Participants {
                    student: Some(Ulid::new()),
                    instructor: Some(Ulid::new()),
                    aircraft: None,
                },
                status: BookingStatus::Pending,
                lesson_template: None,
                created_at: 1,
                updated_at: 1,
            },
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
