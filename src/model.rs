use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Practice rooms are owned by the room catalog; we only ever see their ids.
pub type RoomId = Ulid;

/// User ids come from the identity resolver and are opaque here.
pub type UserId = String;

/// Privilege tiers, most privileged first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Staff,
    Teacher,
    StudentVip,
    Student,
    StudentPending,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Staff => "staff",
            Role::Teacher => "teacher",
            Role::StudentVip => "student_vip",
            Role::Student => "student",
            Role::StudentPending => "student_pending",
        }
    }

    /// Admin and staff may act on other users' reservations.
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Staff)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct ParseRoleError(pub String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "staff" => Ok(Role::Staff),
            "teacher" => Ok(Role::Teacher),
            "student_vip" => Ok(Role::StudentVip),
            "student" => Ok(Role::Student),
            "student_pending" => Ok(Role::StudentPending),
            other => Err(ParseRoleError(other.to_string())),
        }
    }
}

/// A resolved caller: who they are and which tier they act in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
    pub display_name: String,
}

impl Identity {
    pub fn new(user_id: impl Into<UserId>, role: Role, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            display_name: display_name.into(),
        }
    }
}

/// Half-open wall-clock interval `[start, end)` within one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeSlot {
    /// `None` unless `start` is strictly before `end`.
    pub fn new(start: NaiveTime, end: NaiveTime) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    /// Parse `"HH:MM"` bounds. Returns `None` for malformed or inverted input.
    pub fn parse(start: &str, end: &str) -> Option<Self> {
        Self::new(parse_hhmm(start)?, parse_hhmm(end)?)
    }

    pub fn minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

/// Parse a `"HH:MM"` wall-clock string.
pub fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub room_id: RoomId,
    pub user_id: UserId,
    /// Display name at booking time; not re-resolved.
    pub user_name: String,
    /// Role at booking time; not re-resolved.
    pub user_role: Role,
    pub date: NaiveDate,
    pub slot: TimeSlot,
    pub created_at: NaiveDateTime,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedDay {
    pub id: Ulid,
    pub date: NaiveDate,
    pub reason: Option<String>,
    pub created_at: NaiveDateTime,
}

/// Admin-configurable booking rules. Replaced wholesale on update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationSettings {
    /// Wall-clock time from which plain students may book tomorrow.
    pub student_open_time: NaiveTime,
    pub vip_advance_days: u32,
    pub teacher_advance_days: u32,
    pub operating_start: NaiveTime,
    pub operating_end: NaiveTime,
    pub slot_minutes: i64,
}

impl Default for ReservationSettings {
    fn default() -> Self {
        Self {
            student_open_time: hm(18, 0),
            vip_advance_days: 7,
            teacher_advance_days: 14,
            operating_start: hm(9, 0),
            operating_end: hm(22, 0),
            slot_minutes: 30,
        }
    }
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
}

/// Partial settings update. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsPatch {
    pub student_open_time: Option<NaiveTime>,
    pub vip_advance_days: Option<u32>,
    pub teacher_advance_days: Option<u32>,
    pub operating_start: Option<NaiveTime>,
    pub operating_end: Option<NaiveTime>,
    pub slot_minutes: Option<i64>,
}

impl SettingsPatch {
    pub fn apply(&self, base: &ReservationSettings) -> ReservationSettings {
        ReservationSettings {
            student_open_time: self.student_open_time.unwrap_or(base.student_open_time),
            vip_advance_days: self.vip_advance_days.unwrap_or(base.vip_advance_days),
            teacher_advance_days: self.teacher_advance_days.unwrap_or(base.teacher_advance_days),
            operating_start: self.operating_start.unwrap_or(base.operating_start),
            operating_end: self.operating_end.unwrap_or(base.operating_end),
            slot_minutes: self.slot_minutes.unwrap_or(base.slot_minutes),
        }
    }
}

/// Room metadata from the catalog. Capacity is informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PracticeRoom {
    pub id: RoomId,
    pub name: String,
    pub kind: Option<String>,
    pub description: Option<String>,
    pub capacity: u32,
    pub active: bool,
}

impl PracticeRoom {
    /// An active single-occupant room with a fresh id.
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: Ulid::new(),
            name: name.into(),
            kind: Some(kind.into()),
            description: None,
            capacity: 1,
            active: true,
        }
    }
}

/// One `(room, slot)` pair within a booking request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotRequest {
    pub room_id: RoomId,
    pub slot: TimeSlot,
}

/// All reservations on one calendar date, sorted by `(slot.start, room_id)`.
#[derive(Debug, Clone)]
pub struct DayBook {
    pub date: NaiveDate,
    pub reservations: Vec<Reservation>,
}

impl DayBook {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            reservations: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }

    /// Insert keeping sort order. Replay may deliver the same id twice; the
    /// second copy is ignored.
    pub fn insert(&mut self, reservation: Reservation) {
        if self.get(reservation.id).is_some() {
            return;
        }
        let key = (reservation.slot.start, reservation.room_id);
        let pos = self
            .reservations
            .partition_point(|r| (r.slot.start, r.room_id) <= key);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove(&mut self, id: Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    pub fn get(&self, id: Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    /// Reservations whose slot overlaps `slot`.
    /// Binary search skips everything starting at or after `slot.end`.
    pub fn overlapping(&self, slot: &TimeSlot) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.slot.start < slot.end);
        let start = slot.start;
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.slot.end > start)
    }

    pub fn room_holder(&self, room_id: RoomId, slot: &TimeSlot) -> Option<&Reservation> {
        self.overlapping(slot).find(|r| r.room_id == room_id)
    }

    pub fn user_holder(&self, user_id: &str, slot: &TimeSlot) -> Option<&Reservation> {
        self.overlapping(slot).find(|r| r.user_id == user_id)
    }

    pub fn for_room(&self, room_id: RoomId) -> impl Iterator<Item = &Reservation> {
        self.reservations.iter().filter(move |r| r.room_id == room_id)
    }
}

/// Durable log record. Every state change is one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReservationCreated(Reservation),
    /// All-or-nothing multi-slot booking; one record so it is durable as a unit.
    ReservationBatchCreated {
        date: NaiveDate,
        reservations: Vec<Reservation>,
    },
    ReservationCancelled {
        id: Ulid,
        date: NaiveDate,
        cancelled_by: UserId,
    },
    SettingsReplaced(ReservationSettings),
    ClosedDayAdded(ClosedDay),
    ClosedDayRemoved {
        date: NaiveDate,
    },
}

impl Event {
    /// The calendar date this event touches, if any.
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Event::ReservationCreated(r) => Some(r.date),
            Event::ReservationBatchCreated { date, .. }
            | Event::ReservationCancelled { date, .. }
            | Event::ClosedDayRemoved { date } => Some(*date),
            Event::ClosedDayAdded(day) => Some(day.date),
            Event::SettingsReplaced(_) => None,
        }
    }
}
