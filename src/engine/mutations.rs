use std::collections::BTreeMap;

use chrono::NaiveDate;
use tokio::sync::oneshot;
use tracing::{info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::*;
use crate::policy::DenyReason;
use crate::slots::slot_grid;

use super::conflict::{check_no_conflict, validate_closed_reason};
use super::{Engine, BookingError, WalCommand};

impl Engine {
    /// Ledger insert: under the date's lock, check both mutual-exclusion keys
    /// and commit. Eligibility has already been decided by the caller.
    pub(super) async fn insert_reservation(
        &self,
        candidate: Reservation,
    ) -> Result<Reservation, BookingError> {
        let mut day = self.lock_day(candidate.date).await?;
        self.ensure_still_open(candidate.date)?;
        if day.len() >= MAX_RESERVATIONS_PER_DAY {
            return Err(BookingError::LimitExceeded("too many reservations on this date"));
        }
        check_no_conflict(&day, &candidate)?;

        let event = Event::ReservationCreated(candidate.clone());
        self.persist_and_apply(&mut day, &event).await?;
        metrics::counter!(RESERVATIONS_CREATED_TOTAL).increment(1);
        info!(
            id = %candidate.id,
            room = %candidate.room_id,
            user = %candidate.user_id,
            date = %candidate.date,
            slot = %candidate.slot,
            "reservation created"
        );
        Ok(candidate)
    }

    /// Ledger batch insert: every candidate is checked against the day and
    /// against the others before any is committed, then all land as one event.
    pub(super) async fn insert_reservations_atomic(
        &self,
        date: NaiveDate,
        candidates: Vec<Reservation>,
    ) -> Result<Vec<Reservation>, BookingError> {
        let mut day = self.lock_day(date).await?;
        self.ensure_still_open(date)?;
        if day.len() + candidates.len() > MAX_RESERVATIONS_PER_DAY {
            return Err(BookingError::LimitExceeded("too many reservations on this date"));
        }

        // Phase 1: validate against current state and within the batch.
        let mut staged = DayBook::new(date);
        for candidate in &candidates {
            check_no_conflict(&day, candidate)?;
            check_no_conflict(&staged, candidate)?;
            staged.insert(candidate.clone());
        }

        // Phase 2: commit as a unit.
        let event = Event::ReservationBatchCreated {
            date,
            reservations: candidates.clone(),
        };
        self.persist_and_apply(&mut day, &event).await?;
        metrics::counter!(RESERVATIONS_CREATED_TOTAL).increment(candidates.len() as u64);
        info!(%date, count = candidates.len(), "reservation batch created");
        Ok(candidates)
    }

    /// A closure committed after eligibility was checked still wins.
    fn ensure_still_open(&self, date: NaiveDate) -> Result<(), BookingError> {
        match self.closed_days.get(&date) {
            Some(closed) => Err(BookingError::EligibilityDenied(DenyReason::ClosedDay {
                reason: closed.reason.clone(),
            })),
            None => Ok(()),
        }
    }

    /// Cancel a reservation. Only its owner, admin, or staff may do so.
    pub async fn cancel_reservation(
        &self,
        id: Ulid,
        requester: &Identity,
    ) -> Result<Reservation, BookingError> {
        let date = self
            .index
            .date_of(&id)
            .ok_or_else(|| BookingError::not_found("reservation", id))?;
        let mut day = self.lock_day(date).await?;
        let reservation = day
            .get(id)
            .cloned()
            .ok_or_else(|| BookingError::not_found("reservation", id))?;
        if reservation.user_id != requester.user_id && !requester.role.is_staff() {
            return Err(BookingError::Forbidden(
                "only the owner, admin, or staff may cancel a reservation",
            ));
        }

        let event = Event::ReservationCancelled {
            id,
            date,
            cancelled_by: requester.user_id.clone(),
        };
        self.persist_and_apply(&mut day, &event).await?;
        metrics::counter!(RESERVATIONS_CANCELLED_TOTAL).increment(1);
        info!(%id, by = %requester.user_id, %date, "reservation cancelled");
        Ok(reservation)
    }

    /// Merge `patch` into the current settings and replace them wholesale.
    /// The merged settings must yield a non-empty slot grid.
    pub async fn update_settings(
        &self,
        patch: SettingsPatch,
    ) -> Result<ReservationSettings, BookingError> {
        let _writer = self.settings_writer.lock().await;
        let merged = patch.apply(&self.settings_snapshot());
        if slot_grid(&merged)?.is_empty() {
            return Err(BookingError::validation(
                "slot_minutes",
                "no slot fits within operating hours",
            ));
        }

        let event = Event::SettingsReplaced(merged.clone());
        {
            let _gate = self.compaction_gate.read().await;
            self.wal_append(&event).await?;
            self.replace_settings(merged.clone());
        }
        info!(?merged, "reservation settings replaced");
        Ok(merged)
    }

    /// Close `date`. Reservations already on it are kept and returned so an
    /// admin can follow up; closing never cascades.
    pub async fn add_closed_day(
        &self,
        date: NaiveDate,
        reason: Option<String>,
    ) -> Result<(ClosedDay, Vec<Reservation>), BookingError> {
        validate_closed_reason(reason.as_deref())?;
        // Taking the day lock orders this against in-flight inserts.
        let day = self.lock_day(date).await?;
        if self.closed_days.contains_key(&date) {
            return Err(BookingError::validation("date", format!("{date} is already closed")));
        }
        let closed = ClosedDay {
            id: Ulid::new(),
            date,
            reason,
            created_at: self.clock.now(),
        };
        let event = Event::ClosedDayAdded(closed.clone());
        self.wal_append(&event).await?;
        self.closed_days.insert(date, closed.clone());
        self.notify.send(&event);

        let existing = day.reservations.clone();
        if existing.is_empty() {
            info!(%date, reason = ?closed.reason, "closed day added");
        } else {
            warn!(%date, kept = existing.len(), "closed day added over existing reservations");
        }
        Ok((closed, existing))
    }

    pub async fn remove_closed_day(&self, date: NaiveDate) -> Result<ClosedDay, BookingError> {
        let _day = self.lock_day(date).await?;
        let closed = self
            .closed_days
            .get(&date)
            .map(|e| e.value().clone())
            .ok_or_else(|| BookingError::not_found("closed day", date))?;
        let event = Event::ClosedDayRemoved { date };
        self.wal_append(&event).await?;
        self.closed_days.remove(&date);
        self.notify.send(&event);
        info!(%date, "closed day removed");
        Ok(closed)
    }

    /// Rewrite the WAL with only the events needed to rebuild current state.
    pub async fn compact_wal(&self) -> Result<(), BookingError> {
        // Exclusive: no mutation is between its WAL append and its apply.
        let _gate = self.compaction_gate.write().await;

        let mut events = vec![Event::SettingsReplaced(
            self.settings_snapshot().as_ref().clone(),
        )];

        let closed: BTreeMap<NaiveDate, ClosedDay> = self
            .closed_days
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        events.extend(closed.into_values().map(Event::ClosedDayAdded));

        let books: BTreeMap<NaiveDate, _> = self
            .days
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        for book in books.into_values() {
            let guard = book.read().await;
            events.extend(guard.reservations.iter().cloned().map(Event::ReservationCreated));
        }
        // Drop books emptied by cancellations.
        self.days.retain(|_, book| book.try_read().map_or(true, |b| !b.is_empty()));

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| BookingError::Internal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| BookingError::Internal("WAL writer dropped response".into()))?
            .map_err(|e| BookingError::Internal(format!("WAL compaction failed: {e}")))?;
        metrics::counter!(WAL_COMPACTIONS_TOTAL).increment(1);
        Ok(())
    }
}
