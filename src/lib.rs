//! Practice-room booking: a day-sliced reservation ledger with role-based
//! eligibility, closed days, and a write-ahead log.

pub mod clock;
pub mod collab;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod policy;
pub mod slots;
pub mod startup;
pub mod wal;

pub use config::Config;
pub use engine::{
    BookingError, BookingOutcome, Collaborators, Engine, EngineOptions, ErrorKind,
    RoomAvailability, SlotFailure,
};
