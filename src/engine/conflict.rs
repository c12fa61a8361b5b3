use crate::limits::*;
use crate::model::*;
use crate::observability::CONFLICTS_TOTAL;
use crate::slots::is_grid_slot;

use super::BookingError;

/// Room check first, then user: a slot taken by someone else reads as a room
/// conflict even if the user is also busy elsewhere.
pub(super) fn check_no_conflict(day: &DayBook, candidate: &Reservation) -> Result<(), BookingError> {
    if let Some(existing) = day.room_holder(candidate.room_id, &candidate.slot) {
        metrics::counter!(CONFLICTS_TOTAL, "kind" => "room").increment(1);
        return Err(BookingError::RoomSlotConflict { existing: existing.id });
    }
    if let Some(existing) = day.user_holder(&candidate.user_id, &candidate.slot) {
        metrics::counter!(CONFLICTS_TOTAL, "kind" => "user").increment(1);
        return Err(BookingError::UserSlotConflict { existing: existing.id });
    }
    Ok(())
}

pub(super) fn validate_slot(settings: &ReservationSettings, slot: &TimeSlot) -> Result<(), BookingError> {
    if is_grid_slot(settings, slot) {
        return Ok(());
    }
    Err(BookingError::validation(
        "slot",
        format!(
            "{slot} is not a {}-minute slot between {} and {}",
            settings.slot_minutes,
            settings.operating_start.format("%H:%M"),
            settings.operating_end.format("%H:%M"),
        ),
    ))
}

pub(super) fn validate_identity(identity: &Identity) -> Result<(), BookingError> {
    if identity.user_id.trim().is_empty() {
        return Err(BookingError::validation("user_id", "must not be empty"));
    }
    if identity.user_id.len() > MAX_USER_ID_LEN {
        return Err(BookingError::LimitExceeded("user id too long"));
    }
    if identity.display_name.len() > MAX_DISPLAY_NAME_LEN {
        return Err(BookingError::LimitExceeded("display name too long"));
    }
    Ok(())
}

pub(super) fn validate_note(note: Option<&str>) -> Result<(), BookingError> {
    match note {
        Some(n) if n.len() > MAX_NOTE_LEN => Err(BookingError::LimitExceeded("note too long")),
        _ => Ok(()),
    }
}

pub(super) fn validate_closed_reason(reason: Option<&str>) -> Result<(), BookingError> {
    match reason {
        Some(r) if r.len() > MAX_CLOSED_REASON_LEN => {
            Err(BookingError::LimitExceeded("closed-day reason too long"))
        }
        _ => Ok(()),
    }
}
