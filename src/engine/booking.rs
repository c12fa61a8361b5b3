use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;
use ulid::Ulid;

use crate::limits::MAX_SLOTS_PER_REQUEST;
use crate::model::*;
use crate::observability::BOOKING_DENIED_TOTAL;
use crate::policy::{can_reserve, check_proxy, Decision};

use super::conflict::{validate_identity, validate_note, validate_slot};
use super::{BookingError, Engine};

/// One requested slot that was not booked, and why.
#[derive(Debug)]
pub struct SlotFailure {
    pub request: SlotRequest,
    pub error: BookingError,
}

/// Per-slot result of a multi-slot request. Slots are independent: a partial
/// success leaves the created reservations in place.
#[derive(Debug, Default)]
pub struct BookingOutcome {
    pub created: Vec<Reservation>,
    pub failed: Vec<SlotFailure>,
}

impl BookingOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Everything decided once per request, before any slot is touched.
struct Admission {
    settings: Arc<ReservationSettings>,
    now: NaiveDateTime,
    active_rooms: HashSet<RoomId>,
}

impl Engine {
    /// Request-level gate: proxy rights, input shape, then eligibility for the
    /// beneficiary's role (never the requester's).
    async fn admit(
        &self,
        requester: &Identity,
        beneficiary: &Identity,
        date: NaiveDate,
        slot_count: usize,
        note: Option<&str>,
    ) -> Result<Admission, BookingError> {
        check_proxy(requester, beneficiary)?;
        validate_identity(beneficiary)?;
        validate_note(note)?;
        if slot_count == 0 {
            return Err(BookingError::validation("slots", "at least one slot is required"));
        }
        if slot_count > MAX_SLOTS_PER_REQUEST {
            return Err(BookingError::LimitExceeded("too many slots in one request"));
        }

        let settings = self.settings_snapshot();
        let now = self.clock.now();
        let closed = self.closed_day(date);
        let decision = can_reserve(
            beneficiary.role,
            date,
            now,
            &settings,
            closed.as_ref(),
            self.options.advance_window,
        );
        if let Decision::Denied(reason) = decision {
            metrics::counter!(BOOKING_DENIED_TOTAL, "reason" => reason.label()).increment(1);
            debug!(user = %beneficiary.user_id, role = %beneficiary.role, %date, "booking denied: {reason}");
            return Err(BookingError::EligibilityDenied(reason));
        }

        let active_rooms = self
            .rooms
            .list_active_rooms()
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();
        Ok(Admission {
            settings,
            now,
            active_rooms,
        })
    }

    fn candidate(
        admission: &Admission,
        beneficiary: &Identity,
        date: NaiveDate,
        request: &SlotRequest,
        note: Option<&str>,
    ) -> Result<Reservation, BookingError> {
        if !admission.active_rooms.contains(&request.room_id) {
            return Err(BookingError::not_found("room", request.room_id));
        }
        validate_slot(&admission.settings, &request.slot)?;
        Ok(Reservation {
            id: Ulid::new(),
            room_id: request.room_id,
            user_id: beneficiary.user_id.clone(),
            user_name: beneficiary.display_name.clone(),
            user_role: beneficiary.role,
            date,
            slot: request.slot,
            created_at: admission.now,
            note: note.map(str::to_owned),
        })
    }

    /// Book several `(room, slot)` pairs on one date for `beneficiary`.
    ///
    /// Eligibility is decided once; if denied, nothing is attempted and the
    /// whole call fails. Otherwise each slot goes to the ledger on its own and
    /// the outcome reports every slot. There is no rollback of earlier slots
    /// when a later one fails; use [`Engine::book_atomic`] for that.
    pub async fn book(
        &self,
        requester: &Identity,
        beneficiary: &Identity,
        date: NaiveDate,
        requests: &[SlotRequest],
        note: Option<&str>,
    ) -> Result<BookingOutcome, BookingError> {
        let admission = self
            .admit(requester, beneficiary, date, requests.len(), note)
            .await?;

        let mut outcome = BookingOutcome::default();
        for request in requests {
            let result = match Self::candidate(&admission, beneficiary, date, request, note) {
                Ok(candidate) => self.insert_reservation(candidate).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(reservation) => outcome.created.push(reservation),
                Err(error) => {
                    debug!(room = %request.room_id, slot = %request.slot, "slot not booked: {error}");
                    outcome.failed.push(SlotFailure {
                        request: *request,
                        error,
                    });
                }
            }
        }
        Ok(outcome)
    }

    /// Single-slot booking. `requester` may differ from `beneficiary` only
    /// for admin and staff.
    pub async fn create_reservation(
        &self,
        room_id: RoomId,
        requester: &Identity,
        beneficiary: &Identity,
        date: NaiveDate,
        slot: TimeSlot,
        note: Option<&str>,
    ) -> Result<Reservation, BookingError> {
        let mut outcome = self
            .book(requester, beneficiary, date, &[SlotRequest { room_id, slot }], note)
            .await?;
        match (outcome.created.pop(), outcome.failed.pop()) {
            (Some(reservation), _) => Ok(reservation),
            (None, Some(failure)) => Err(failure.error),
            (None, None) => Err(BookingError::Internal("booking produced no result".into())),
        }
    }

    /// All-or-nothing variant of [`Engine::book`]: either every slot is
    /// reserved or none is, and the first problem found is returned.
    pub async fn book_atomic(
        &self,
        requester: &Identity,
        beneficiary: &Identity,
        date: NaiveDate,
        requests: &[SlotRequest],
        note: Option<&str>,
    ) -> Result<Vec<Reservation>, BookingError> {
        let admission = self
            .admit(requester, beneficiary, date, requests.len(), note)
            .await?;
        let candidates = requests
            .iter()
            .map(|request| Self::candidate(&admission, beneficiary, date, request, note))
            .collect::<Result<Vec<_>, _>>()?;
        self.insert_reservations_atomic(date, candidates).await
    }
}
