use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;
use crate::policy::{browse_horizon, can_reserve, Decision};
use crate::slots::slot_grid;

use super::{BookingError, Engine};

/// Free slots of one active room on one date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomAvailability {
    pub room: PracticeRoom,
    pub free: Vec<TimeSlot>,
}

impl Engine {
    /// Grid slots for `date` not yet reserved in `room_id`. Unknown and
    /// inactive rooms are `NotFound`.
    pub async fn list_available_slots(
        &self,
        room_id: RoomId,
        date: NaiveDate,
    ) -> Result<Vec<TimeSlot>, BookingError> {
        let rooms = self.rooms.list_active_rooms().await?;
        if !rooms.iter().any(|room| room.id == room_id) {
            return Err(BookingError::not_found("room", room_id));
        }
        let mut slots = slot_grid(&self.settings_snapshot())?;
        if let Some(book) = self.read_day(&date) {
            let day = book.read().await;
            slots.retain(|slot| day.room_holder(room_id, slot).is_none());
        }
        Ok(slots)
    }

    /// Free slots for every active room on `date`, in catalog order.
    pub async fn list_availability(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<RoomAvailability>, BookingError> {
        let rooms = self.rooms.list_active_rooms().await?;
        let grid = slot_grid(&self.settings_snapshot())?;
        let book = self.read_day(&date);
        let day = match &book {
            Some(b) => Some(b.read().await),
            None => None,
        };
        Ok(rooms
            .into_iter()
            .map(|room| {
                let free = grid
                    .iter()
                    .filter(|slot| {
                        day.as_ref()
                            .is_none_or(|d| d.room_holder(room.id, slot).is_none())
                    })
                    .copied()
                    .collect();
                RoomAvailability { room, free }
            })
            .collect())
    }

    /// Reservations on `date`, or on every date when `None`; ordered by
    /// date, start time, then room.
    pub async fn list_reservations(&self, date: Option<NaiveDate>) -> Vec<Reservation> {
        let books: BTreeMap<NaiveDate, _> = match date {
            Some(d) => self.read_day(&d).map(|b| (d, b)).into_iter().collect(),
            None => self
                .days
                .iter()
                .map(|e| (*e.key(), e.value().clone()))
                .collect(),
        };
        let mut out = Vec::new();
        for book in books.into_values() {
            out.extend(book.read().await.reservations.iter().cloned());
        }
        out
    }

    pub async fn list_reservations_for_user(&self, user_id: &str) -> Vec<Reservation> {
        let mut by_date: BTreeMap<NaiveDate, HashSet<Ulid>> = BTreeMap::new();
        for id in self.index.ids_for_user(user_id) {
            if let Some(date) = self.index.date_of(&id) {
                by_date.entry(date).or_default().insert(id);
            }
        }
        let mut out = Vec::new();
        for (date, ids) in by_date {
            let Some(book) = self.read_day(&date) else { continue };
            let day = book.read().await;
            out.extend(
                day.reservations
                    .iter()
                    .filter(|r| ids.contains(&r.id))
                    .cloned(),
            );
        }
        out
    }

    pub async fn list_room_reservations(&self, room_id: RoomId, date: NaiveDate) -> Vec<Reservation> {
        let Some(book) = self.read_day(&date) else {
            return Vec::new();
        };
        let day = book.read().await;
        day.for_room(room_id).cloned().collect()
    }

    pub async fn get_reservation(&self, id: Ulid) -> Option<Reservation> {
        let date = self.index.date_of(&id)?;
        let book = self.read_day(&date)?;
        let day = book.read().await;
        day.get(id).cloned()
    }

    pub fn reservation_count(&self) -> usize {
        self.index.len()
    }

    pub fn get_settings(&self) -> ReservationSettings {
        self.settings_snapshot().as_ref().clone()
    }

    pub fn list_closed_days(&self) -> Vec<ClosedDay> {
        let mut days: Vec<ClosedDay> = self.closed_days.iter().map(|e| e.value().clone()).collect();
        days.sort_by_key(|d| d.date);
        days
    }

    pub fn closed_day(&self, date: NaiveDate) -> Option<ClosedDay> {
        self.closed_days.get(&date).map(|e| e.value().clone())
    }

    /// Whether `who` could book on `date` right now, ignoring occupancy.
    pub fn check_eligibility(&self, who: &Identity, date: NaiveDate) -> Decision {
        let closed = self.closed_day(date);
        can_reserve(
            who.role,
            date,
            self.clock.now(),
            &self.settings_snapshot(),
            closed.as_ref(),
            self.options.advance_window,
        )
    }

    /// Last date `who` may browse, `None` when unbounded.
    pub fn browse_horizon_for(&self, who: &Identity) -> Option<NaiveDate> {
        browse_horizon(who.role, self.clock.now().date(), &self.settings_snapshot())
    }

    /// Resolve a session token through the identity collaborator.
    pub async fn resolve_identity(&self, token: &str) -> Result<Identity, BookingError> {
        self.identities.resolve_identity(token).await
    }
}
