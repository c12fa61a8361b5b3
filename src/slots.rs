use chrono::{Duration, NaiveTime};

use crate::engine::BookingError;
use crate::model::{ReservationSettings, TimeSlot};

const MINUTES_PER_DAY: i64 = 24 * 60;

/// Produce the canonical slot grid for one day.
///
/// Slots start at `start`, are exactly `minutes` long, and a slot is kept only
/// if it ends at or before `end`. A grid never wraps past midnight.
pub fn generate_slots(
    start: NaiveTime,
    end: NaiveTime,
    minutes: i64,
) -> Result<Vec<TimeSlot>, BookingError> {
    if end <= start || minutes <= 0 || minutes > MINUTES_PER_DAY {
        return Err(BookingError::InvalidRange);
    }
    let step = Duration::minutes(minutes);
    let mut slots = Vec::new();
    let mut cursor = start;
    loop {
        let (next, wrapped) = cursor.overflowing_add_signed(step);
        if wrapped != 0 || next > end {
            break;
        }
        let Some(slot) = TimeSlot::new(cursor, next) else {
            break;
        };
        slots.push(slot);
        cursor = next;
    }
    Ok(slots)
}

/// Slot grid for the given settings.
pub fn slot_grid(settings: &ReservationSettings) -> Result<Vec<TimeSlot>, BookingError> {
    generate_slots(
        settings.operating_start,
        settings.operating_end,
        settings.slot_minutes,
    )
}

/// Whether `slot` is exactly one of the grid's slots.
pub fn is_grid_slot(settings: &ReservationSettings, slot: &TimeSlot) -> bool {
    if slot.minutes() != settings.slot_minutes
        || slot.start < settings.operating_start
        || slot.end > settings.operating_end
    {
        return false;
    }
    let offset = (slot.start - settings.operating_start).num_minutes();
    offset % settings.slot_minutes == 0
}
