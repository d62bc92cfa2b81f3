use tokio::sync::oneshot;
use tracing::{debug, info};
use ulid::Ulid;

use crate::model::*;

use super::lifecycle::{check_create, check_transition, check_update};
use super::validator::{now_ms, validate_booking, validate_participants, validate_span};
use super::{Engine, EngineError, WalCommand};

impl Engine {
    /// Validate and commit a new booking as one atomic step with respect to
    /// every other write touching the same student, instructor or aircraft.
    pub async fn create_booking(&self, new: NewBooking, actor: Actor) -> Result<Booking, EngineError> {
        check_create(&new, &actor)?;
        validate_participants(&new.participants, new.status)?;
        validate_span(&new.span)?;

        let mut locked = self.lock_resources(new.participants.resources().collect()).await;
        validate_booking(|r| locked.get(r), &new.span, &new.participants, None)?;

        let now = now_ms();
        let event = Event::BookingCreated {
            booking: Booking {
                id: Ulid::new(),
                span: new.span,
                participants: new.participants,
                status: new.status,
                lesson_template: new.lesson_template,
                created_at: now,
                updated_at: now,
            },
        };
        let booking = self.commit(&mut locked, &event).await?;
        info!(
            "booking {} created as {} [{}, {})",
            booking.id, booking.status, booking.span.start, booking.span.end
        );
        Ok(booking)
    }

    /// Move a booking to `to`, reading the wall clock for time guards.
    pub async fn transition(&self, id: Ulid, to: BookingStatus, actor: Actor) -> Result<Booking, EngineError> {
        self.transition_at(id, to, actor, now_ms()).await
    }

    pub async fn transition_at(
        &self,
        id: Ulid,
        to: BookingStatus,
        actor: Actor,
        now: Ms,
    ) -> Result<Booking, EngineError> {
        let (booking, mut locked) = self.lock_booking(id, None).await?;
        check_transition(&booking, to, &actor, now)?;

        // A request starts holding its resources only once accepted, so the
        // slot may have been claimed since it was asked for.
        if to.is_active() && !booking.status.is_active() {
            validate_participants(&booking.participants, to)?;
            validate_booking(|r| locked.get(r), &booking.span, &booking.participants, Some(id))?;
        }

        let event = Event::StatusChanged {
            id,
            status: to,
            updated_at: now_ms(),
        };
        let updated = self.commit(&mut locked, &event).await?;
        info!("booking {id}: {} -> {}", booking.status, updated.status);
        Ok(updated)
    }

    /// Replace a booking's span and/or participants. Re-validated against every
    /// calendar involved, ignoring the booking's own current slot.
    pub async fn update_booking(
        &self,
        id: Ulid,
        patch: BookingPatch,
        actor: Actor,
    ) -> Result<Booking, EngineError> {
        if let Some(span) = &patch.span {
            validate_span(span)?;
        }

        let (booking, mut locked) = self.lock_booking(id, patch.participants.as_ref()).await?;
        let span = patch.span.unwrap_or(booking.span);
        let participants = patch.participants.unwrap_or(booking.participants);

        check_update(&booking, &participants, &actor)?;
        validate_participants(&participants, booking.status)?;
        validate_booking(|r| locked.get(r), &span, &participants, Some(id))?;

        let event = Event::BookingUpdated {
            id,
            span,
            participants,
            lesson_template: patch.lesson_template.unwrap_or(booking.lesson_template),
            updated_at: now_ms(),
        };
        let updated = self.commit(&mut locked, &event).await?;
        debug!("booking {id} moved to [{}, {})", updated.span.start, updated.span.end);
        Ok(updated)
    }

    /// Rewrite the WAL as one creation record per booking.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.commit_gate.write().await;

        let mut events: Vec<Event> = self
            .bookings
            .iter()
            .map(|entry| Event::BookingCreated {
                booking: entry.value().clone(),
            })
            .collect();
        events.sort_by_key(|e| e.booking_id());
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        info!("compacted WAL to {count} bookings");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
