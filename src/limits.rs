use crate::model::{Ms, MINUTE_MS};

const DAY_MS: Ms = 24 * 60 * MINUTE_MS;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// A single training session never runs past a day.
pub const MAX_SPAN_DURATION_MS: Ms = DAY_MS;

pub const MIN_SLOT_GRANULARITY_MIN: u32 = 5;
pub const MAX_SLOT_GRANULARITY_MIN: u32 = 24 * 60;

/// Widest window accepted by schedule listings.
pub const MAX_SCHEDULE_WINDOW_MS: Ms = 93 * DAY_MS;

/// How many times a write re-acquires its lock set when the booking's
/// participants moved underneath it.
pub const MAX_LOCK_RETRIES: usize = 8;

/// Longest request line accepted by the TCP protocol.
pub const MAX_REQUEST_LINE_LEN: usize = 64 * 1024;
