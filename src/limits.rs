pub const MAX_NOTE_LEN: usize = 500;
pub const MAX_USER_ID_LEN: usize = 128;
pub const MAX_DISPLAY_NAME_LEN: usize = 128;
pub const MAX_CLOSED_REASON_LEN: usize = 200;
/// Slots in one booking request. A full day of 30-minute slots fits.
pub const MAX_SLOTS_PER_REQUEST: usize = 48;
pub const MAX_RESERVATIONS_PER_DAY: usize = 10_000;
