mod availability;
mod calendar;
mod error;
mod lifecycle;
mod mutations;
mod queries;
mod slots;
mod validator;

pub use availability::{free_windows, merge_overlapping, subtract_intervals};
pub use calendar::{CalendarEntry, ResourceCalendar};
pub use error::EngineError;
pub use lifecycle::is_legal;
pub use slots::{day_window, find_slots, SlotRequest};

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{FixedOffset, Offset, Utc};
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, OwnedRwLockWriteGuard, RwLock};
use tracing::{info, warn};
use ulid::Ulid;

use crate::limits::MAX_LOCK_RETRIES;
use crate::model::*;
use crate::wal::Wal;

pub type SharedCalendar = Arc<RwLock<ResourceCalendar>>;

/// School-wide knobs for slot enumeration.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleSettings {
    pub working_hours: WorkingHours,
    pub granularity_minutes: u32,
    pub utc_offset: FixedOffset,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            working_hours: WorkingHours::default(),
            granularity_minutes: 60,
            utc_offset: Utc.fix(),
        }
    }
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Owns the WAL. Appends that queue up while a flush is in progress are
/// written together and share one fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };

        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            warn!("WAL flush of {} events failed: {e}", batch.len());
        }
        for (_, tx) in batch {
            let _ = tx.send(match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            });
        }

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

/// All or nothing: a failed batch is acked as failed and never applied, so
/// none of its records may survive on disk.
fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync());
    if result.is_err()
        && let Err(e) = wal.rollback()
    {
        warn!("WAL rollback after failed flush also failed: {e}");
    }
    result
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => {}
    }
}

// ── Locked resource sets ─────────────────────────────────

/// Write guards over every calendar a write touches, taken in `ResourceRef`
/// order so writers sharing more than one resource cannot deadlock.
pub(super) struct LockedCalendars {
    guards: Vec<OwnedRwLockWriteGuard<ResourceCalendar>>,
    index: HashMap<ResourceRef, usize>,
}

impl LockedCalendars {
    pub(super) fn get(&self, resource: &ResourceRef) -> Option<&ResourceCalendar> {
        self.index.get(resource).map(|&i| &*self.guards[i])
    }

    fn get_mut(&mut self, resource: &ResourceRef) -> Option<&mut ResourceCalendar> {
        let i = *self.index.get(resource)?;
        Some(&mut *self.guards[i])
    }

    /// Move a booking's calendar entries from its old state to its new one.
    fn reindex(&mut self, before: Option<&Booking>, after: &Booking) {
        if let Some(old) = before
            && old.status.is_active()
        {
            for r in old.participants.resources() {
                if let Some(cal) = self.get_mut(&r) {
                    cal.remove(old.id);
                }
            }
        }
        if after.status.is_active() {
            for r in after.participants.resources() {
                if let Some(cal) = self.get_mut(&r) {
                    cal.insert(after.id, after.span);
                }
            }
        }
    }
}

/// Apply an event to the booking records. Returns the record before and after.
fn apply_to_bookings(
    bookings: &DashMap<Ulid, Booking>,
    event: &Event,
) -> Option<(Option<Booking>, Booking)> {
    match event {
        Event::BookingCreated { booking } => {
            let before = bookings.insert(booking.id, booking.clone());
            Some((before, booking.clone()))
        }
        Event::BookingUpdated {
            id,
            span,
            participants,
            lesson_template,
            updated_at,
        } => {
            let mut entry = bookings.get_mut(id)?;
            let before = entry.value().clone();
            entry.span = *span;
            entry.participants = *participants;
            entry.lesson_template = *lesson_template;
            entry.updated_at = *updated_at;
            Some((Some(before), entry.value().clone()))
        }
        Event::StatusChanged {
            id,
            status,
            updated_at,
        } => {
            let mut entry = bookings.get_mut(id)?;
            let before = entry.value().clone();
            entry.status = *status;
            entry.updated_at = *updated_at;
            Some((Some(before), entry.value().clone()))
        }
    }
}

/// The scheduling service. Owns every booking; resource calendars are an
/// index over the active ones.
pub struct Engine {
    bookings: DashMap<Ulid, Booking>,
    calendars: DashMap<ResourceRef, SharedCalendar>,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Writers hold it shared from WAL append through apply; compaction takes it
    /// exclusively so its snapshot cannot miss an acknowledged append.
    commit_gate: RwLock<()>,
    settings: ScheduleSettings,
}

impl Engine {
    pub fn new(wal_path: PathBuf, settings: ScheduleSettings) -> io::Result<Self> {
        let replay = Wal::replay(&wal_path)?;
        let mut wal = Wal::open(&wal_path)?;
        if replay.discarded_tail {
            // New appends must not land behind unreadable bytes.
            warn!("{}: discarded torn record at end of log, rewriting", wal_path.display());
            Wal::write_compact_file(&wal_path, &replay.events)?;
            wal.swap_compact_file()?;
        }
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let bookings = DashMap::new();
        for event in &replay.events {
            if apply_to_bookings(&bookings, event).is_none() {
                warn!("replay: event for unknown booking {}", event.booking_id());
            }
        }

        // Calendars are derived: rebuild them from the active bookings.
        let mut rebuilt: HashMap<ResourceRef, ResourceCalendar> = HashMap::new();
        for entry in bookings.iter() {
            let booking = entry.value();
            if !booking.status.is_active() {
                continue;
            }
            for r in booking.participants.resources() {
                rebuilt
                    .entry(r)
                    .or_insert_with(|| ResourceCalendar::new(r))
                    .insert(booking.id, booking.span);
            }
        }
        let calendars = DashMap::new();
        for (r, cal) in rebuilt {
            calendars.insert(r, Arc::new(RwLock::new(cal)));
        }

        info!(
            "loaded {} bookings ({} events) across {} calendars",
            bookings.len(),
            replay.events.len(),
            calendars.len()
        );

        Ok(Self {
            bookings,
            calendars,
            wal_tx,
            commit_gate: RwLock::new(()),
            settings,
        })
    }

    pub fn settings(&self) -> &ScheduleSettings {
        &self.settings
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Persist, then apply to the booking set and the locked calendars.
    pub(super) async fn commit(
        &self,
        locked: &mut LockedCalendars,
        event: &Event,
    ) -> Result<Booking, EngineError> {
        let _gate = self.commit_gate.read().await;
        self.wal_append(event).await?;
        let (before, after) = apply_to_bookings(&self.bookings, event)
            .ok_or_else(|| EngineError::NotFound(event.booking_id()))?;
        locked.reindex(before.as_ref(), &after);
        Ok(after)
    }

    fn shared_calendar(&self, resource: ResourceRef) -> SharedCalendar {
        self.calendars
            .entry(resource)
            .or_insert_with(|| Arc::new(RwLock::new(ResourceCalendar::new(resource))))
            .value()
            .clone()
    }

    /// Acquire write locks on a resource set in canonical order.
    pub(super) async fn lock_resources(&self, mut resources: Vec<ResourceRef>) -> LockedCalendars {
        resources.sort();
        resources.dedup();

        let mut guards = Vec::with_capacity(resources.len());
        let mut index = HashMap::with_capacity(resources.len());
        for r in resources {
            let guard = self.shared_calendar(r).write_owned().await;
            index.insert(r, guards.len());
            guards.push(guard);
        }
        LockedCalendars { guards, index }
    }

    /// Lock the resources of an existing booking (plus `extra`) and return the
    /// booking as it stands under those locks.
    pub(super) async fn lock_booking(
        &self,
        id: Ulid,
        extra: Option<&Participants>,
    ) -> Result<(Booking, LockedCalendars), EngineError> {
        for attempt in 0..MAX_LOCK_RETRIES {
            let snapshot = self
                .bookings
                .get(&id)
                .map(|b| b.participants)
                .ok_or(EngineError::NotFound(id))?;

            let mut resources: Vec<ResourceRef> = snapshot.resources().collect();
            if let Some(p) = extra {
                resources.extend(p.resources());
            }
            let locked = self.lock_resources(resources).await;

            let current = self
                .bookings
                .get(&id)
                .map(|b| b.value().clone())
                .ok_or(EngineError::NotFound(id))?;
            if current.participants == snapshot {
                return Ok((current, locked));
            }
            tracing::debug!("booking {id} changed participants while locking (attempt {attempt})");
        }
        Err(EngineError::LimitExceeded("booking kept changing while locking"))
    }
}
