use std::path::PathBuf;
use std::str::FromStr;

use chrono::{FixedOffset, NaiveTime};
use tracing::warn;

use crate::engine::ScheduleSettings;
use crate::limits::{MAX_SLOT_GRANULARITY_MIN, MIN_SLOT_GRANULARITY_MIN};
use crate::model::WorkingHours;

/// Process configuration, read once at startup from `SKYSLOT_*` variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub schedule: ScheduleSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 7878,
            data_dir: PathBuf::from("./data"),
            max_connections: 256,
            compact_threshold: 1000,
            metrics_port: None,
            schedule: ScheduleSettings::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Unparseable values fall back to the
    /// default with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let hours = WorkingHours {
            start: parsed(get("SKYSLOT_WORKDAY_START"), "SKYSLOT_WORKDAY_START", parse_time)
                .unwrap_or(d.schedule.working_hours.start),
            end: parsed(get("SKYSLOT_WORKDAY_END"), "SKYSLOT_WORKDAY_END", parse_time)
                .unwrap_or(d.schedule.working_hours.end),
        };
        let working_hours = if hours.start < hours.end {
            hours
        } else {
            warn!("SKYSLOT_WORKDAY_START must be before SKYSLOT_WORKDAY_END; using defaults");
            d.schedule.working_hours
        };

        let granularity_minutes = match number::<u32>(get("SKYSLOT_SLOT_GRANULARITY_MIN"), "SKYSLOT_SLOT_GRANULARITY_MIN") {
            Some(g) if (MIN_SLOT_GRANULARITY_MIN..=MAX_SLOT_GRANULARITY_MIN).contains(&g) => g,
            Some(g) => {
                warn!(
                    "SKYSLOT_SLOT_GRANULARITY_MIN={g} outside {MIN_SLOT_GRANULARITY_MIN}..={MAX_SLOT_GRANULARITY_MIN}; using {}",
                    d.schedule.granularity_minutes
                );
                d.schedule.granularity_minutes
            }
            None => d.schedule.granularity_minutes,
        };

        let utc_offset = number::<i32>(get("SKYSLOT_UTC_OFFSET_MIN"), "SKYSLOT_UTC_OFFSET_MIN")
            .and_then(|min| {
                let offset = min.checked_mul(60).and_then(FixedOffset::east_opt);
                if offset.is_none() {
                    warn!("SKYSLOT_UTC_OFFSET_MIN={min} is not a valid offset; using UTC");
                }
                offset
            })
            .unwrap_or(d.schedule.utc_offset);

        Self {
            bind: get("SKYSLOT_BIND").unwrap_or(d.bind),
            port: number(get("SKYSLOT_PORT"), "SKYSLOT_PORT").unwrap_or(d.port),
            data_dir: get("SKYSLOT_DATA_DIR").map(PathBuf::from).unwrap_or(d.data_dir),
            max_connections: number(get("SKYSLOT_MAX_CONNECTIONS"), "SKYSLOT_MAX_CONNECTIONS")
                .filter(|n| *n > 0)
                .unwrap_or(d.max_connections),
            compact_threshold: number(get("SKYSLOT_COMPACT_THRESHOLD"), "SKYSLOT_COMPACT_THRESHOLD")
                .unwrap_or(d.compact_threshold),
            metrics_port: number(get("SKYSLOT_METRICS_PORT"), "SKYSLOT_METRICS_PORT"),
            schedule: ScheduleSettings {
                working_hours,
                granularity_minutes,
                utc_offset,
            },
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("bookings.wal")
    }
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()
}

fn parsed<T>(raw: Option<String>, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let raw = raw?;
    let value = parse(&raw);
    if value.is_none() {
        warn!("ignoring {name}={raw:?}: not a valid value");
    }
    value
}

fn number<T: FromStr>(raw: Option<String>, name: &str) -> Option<T> {
    parsed(raw, name, |s| s.trim().parse().ok())
}
