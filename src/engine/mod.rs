mod booking;
mod conflict;
mod error;
mod mutations;
mod queries;

pub use booking::{BookingOutcome, SlotFailure};
pub use error::{BookingError, ErrorKind};
pub use queries::RoomAvailability;

use std::collections::{HashMap, HashSet};
use std::io;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedRwLockWriteGuard, RwLock, RwLockReadGuard};
use tracing::{error, info, warn};
use ulid::Ulid;

use crate::clock::{Clock, SystemClock};
use crate::collab::{IdentityResolver, RoomCatalog};
use crate::config::Config;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability::*;
use crate::policy::AdvanceWindow;
use crate::wal::Wal;

pub type SharedDayBook = Arc<RwLock<DayBook>>;

const WAL_RETRY_BACKOFF: Duration = Duration::from_millis(20);

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

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit:
/// block for the first append, drain whatever else is already queued, then
/// flush once and answer every sender with the shared result.
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
                    // Anything else must observe the batch as committed.
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        commit_batch(&mut wal, &mut batch);
        if let Some(other) = deferred {
            handle_non_append(&mut wal, other);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();

    let mut result = Ok(());
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            result = Err(e);
            break;
        }
    }
    if result.is_ok() {
        result = wal.flush_sync();
    }
    // Nothing from a failed batch may stay in the log: a retry appended
    // after a torn frame would be lost on replay.
    if let Err(e) = &result {
        warn!(events = batch.len(), "WAL batch failed, discarding it: {e}");
        if let Err(e) = wal.discard_uncommitted() {
            error!("could not truncate WAL after failed batch: {e}");
        }
    }
    metrics::histogram!(WAL_FLUSH_DURATION_SECONDS).record(flush_start.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
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
        WalCommand::Append { event, response } => {
            commit_batch(wal, &mut vec![(event, response)]);
        }
    }
}

// ── Indexes ──────────────────────────────────────────────

/// Reverse lookups kept alongside the day books. Only touched while the
/// owning day's write lock is held (or during single-threaded replay).
#[derive(Default)]
pub(super) struct LedgerIndex {
    dates: DashMap<Ulid, NaiveDate>,
    by_user: DashMap<UserId, HashSet<Ulid>>,
}

impl LedgerIndex {
    fn record(&self, reservation: &Reservation) {
        self.dates.insert(reservation.id, reservation.date);
        self.by_user
            .entry(reservation.user_id.clone())
            .or_default()
            .insert(reservation.id);
    }

    fn forget(&self, reservation: &Reservation) {
        self.dates.remove(&reservation.id);
        if let Some(mut ids) = self.by_user.get_mut(&reservation.user_id) {
            ids.remove(&reservation.id);
        }
        self.by_user.remove_if(&reservation.user_id, |_, ids| ids.is_empty());
    }

    pub(super) fn date_of(&self, id: &Ulid) -> Option<NaiveDate> {
        self.dates.get(id).map(|e| *e.value())
    }

    pub(super) fn ids_for_user(&self, user_id: &str) -> Vec<Ulid> {
        self.by_user
            .get(user_id)
            .map(|e| e.value().iter().copied().collect())
            .unwrap_or_default()
    }

    pub(super) fn len(&self) -> usize {
        self.dates.len()
    }
}

/// Apply a reservation event to its day (caller holds the lock). Replays may
/// repeat events after a retried append, so this is idempotent.
fn apply_to_day(day: &mut DayBook, event: &Event, index: &LedgerIndex) {
    match event {
        Event::ReservationCreated(r) => insert_into(day, r, index),
        Event::ReservationBatchCreated { reservations, .. } => {
            for r in reservations {
                insert_into(day, r, index);
            }
        }
        Event::ReservationCancelled { id, .. } => {
            if let Some(r) = day.remove(*id) {
                index.forget(&r);
                metrics::gauge!(RESERVATIONS_ACTIVE).decrement(1.0);
            }
        }
        // Settings and closed days live outside the day books.
        Event::SettingsReplaced(_) | Event::ClosedDayAdded(_) | Event::ClosedDayRemoved { .. } => {}
    }
}

fn insert_into(day: &mut DayBook, reservation: &Reservation, index: &LedgerIndex) {
    if day.get(reservation.id).is_none() {
        day.insert(reservation.clone());
        index.record(reservation);
        metrics::gauge!(RESERVATIONS_ACTIVE).increment(1.0);
    }
}

// ── Engine ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub lock_timeout: Duration,
    pub wal_retries: u32,
    pub advance_window: AdvanceWindow,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for EngineOptions {
    fn from(config: &Config) -> Self {
        Self {
            lock_timeout: config.lock_timeout,
            wal_retries: config.wal_retries,
            advance_window: config.advance_window,
        }
    }
}

/// External services the engine consults.
#[derive(Clone)]
pub struct Collaborators {
    pub clock: Arc<dyn Clock>,
    pub rooms: Arc<dyn RoomCatalog>,
    pub identities: Arc<dyn IdentityResolver>,
}

impl Collaborators {
    /// System clock at the configured offset, plus the given catalog and resolver.
    pub fn system(
        config: &Config,
        rooms: Arc<dyn RoomCatalog>,
        identities: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            clock: Arc::new(SystemClock::new(config.utc_offset_minutes)),
            rooms,
            identities,
        }
    }
}

/// The reservation ledger plus the settings and closed-day calendar it is
/// checked against.
///
/// Both mutual-exclusion keys (room×date×slot and user×date×slot) live on a
/// single date, so one write lock per date serializes every check-then-insert.
pub struct Engine {
    pub(super) days: DashMap<NaiveDate, SharedDayBook>,
    pub(super) index: LedgerIndex,
    pub(super) settings: StdRwLock<Arc<ReservationSettings>>,
    /// Serializes read-merge-replace of settings.
    pub(super) settings_writer: Mutex<()>,
    pub(super) closed_days: DashMap<NaiveDate, ClosedDay>,
    /// Mutations hold this shared from before their WAL append until applied;
    /// compaction takes it exclusively so its snapshot misses nothing.
    pub(super) compaction_gate: RwLock<()>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) rooms: Arc<dyn RoomCatalog>,
    pub(super) identities: Arc<dyn IdentityResolver>,
    pub(super) options: EngineOptions,
}

/// Exclusive access to one day's book. Holds the compaction gate shared.
pub(super) struct DayWrite<'a> {
    _gate: RwLockReadGuard<'a, ()>,
    day: OwnedRwLockWriteGuard<DayBook>,
}

impl Deref for DayWrite<'_> {
    type Target = DayBook;

    fn deref(&self) -> &DayBook {
        &self.day
    }
}

impl DerefMut for DayWrite<'_> {
    fn deref_mut(&mut self) -> &mut DayBook {
        &mut self.day
    }
}

impl Engine {
    /// Open the engine on `wal_path`, replaying whatever it holds.
    /// Must run inside a tokio runtime: the WAL writer is spawned here.
    pub fn new(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        collaborators: Collaborators,
        options: EngineOptions,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        // Replay into plain maps; nothing else can see them yet.
        let index = LedgerIndex::default();
        let mut books: HashMap<NaiveDate, DayBook> = HashMap::new();
        let mut settings = ReservationSettings::default();
        let closed_days = DashMap::new();
        for event in &events {
            match event {
                Event::SettingsReplaced(s) => settings = s.clone(),
                Event::ClosedDayAdded(day) => {
                    closed_days.insert(day.date, day.clone());
                }
                Event::ClosedDayRemoved { date } => {
                    closed_days.remove(date);
                }
                Event::ReservationCreated(Reservation { date, .. })
                | Event::ReservationBatchCreated { date, .. }
                | Event::ReservationCancelled { date, .. } => {
                    let book = books.entry(*date).or_insert_with(|| DayBook::new(*date));
                    apply_to_day(book, event, &index);
                }
            }
        }
        info!(
            "replayed {} events from {}: {} reservations, {} closed days",
            events.len(),
            wal_path.display(),
            index.len(),
            closed_days.len()
        );

        Ok(Self {
            days: books
                .into_iter()
                .map(|(date, book)| (date, Arc::new(RwLock::new(book))))
                .collect(),
            index,
            settings: StdRwLock::new(Arc::new(settings)),
            settings_writer: Mutex::new(()),
            closed_days,
            compaction_gate: RwLock::new(()),
            wal_tx,
            notify,
            clock: collaborators.clock,
            rooms: collaborators.rooms,
            identities: collaborators.identities,
            options,
        })
    }

    /// Create the data directory and open the engine it holds.
    pub fn open(config: &Config, collaborators: Collaborators) -> io::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        Self::new(
            config.wal_path(),
            Arc::new(NotifyHub::new()),
            collaborators,
            EngineOptions::from(config),
        )
    }

    /// One consistent settings snapshot; hold it for a whole request.
    pub fn settings_snapshot(&self) -> Arc<ReservationSettings> {
        let guard = self.settings.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub(super) fn replace_settings(&self, settings: ReservationSettings) {
        let mut guard = self.settings.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(settings);
    }

    pub(super) fn read_day(&self, date: &NaiveDate) -> Option<SharedDayBook> {
        self.days.get(date).map(|e| e.value().clone())
    }

    /// Write-lock `date`'s book, creating it if needed. Waits at most
    /// `lock_timeout`, then fails with `Contended`.
    pub(super) async fn lock_day(&self, date: NaiveDate) -> Result<DayWrite<'_>, BookingError> {
        let acquire = async move {
            // Gate first: compaction may drop empty books while it holds the gate.
            let gate = self.compaction_gate.read().await;
            let book = self
                .days
                .entry(date)
                .or_insert_with(|| Arc::new(RwLock::new(DayBook::new(date))))
                .value()
                .clone();
            let day = book.write_owned().await;
            DayWrite { _gate: gate, day }
        };
        tokio::time::timeout(self.options.lock_timeout, acquire)
            .await
            .map_err(|_| {
                metrics::counter!(LOCK_TIMEOUTS_TOTAL).increment(1);
                warn!(%date, "timed out waiting for day lock");
                BookingError::Contended
            })
    }

    async fn wal_send(&self, event: &Event) -> io::Result<()> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| io::Error::other("WAL writer shut down"))?;
        rx.await
            .map_err(|_| io::Error::other("WAL writer dropped response"))?
    }

    /// Durably append `event`, retrying I/O failures a bounded number of times.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), BookingError> {
        let mut attempt = 0u32;
        loop {
            match self.wal_send(event).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.options.wal_retries => {
                    attempt += 1;
                    metrics::counter!(WAL_RETRIES_TOTAL).increment(1);
                    warn!(attempt, "WAL append failed, retrying: {e}");
                    tokio::time::sleep(WAL_RETRY_BACKOFF * attempt).await;
                }
                Err(e) => return Err(BookingError::Internal(format!("WAL append failed: {e}"))),
            }
        }
    }

    /// WAL-append, apply to the locked day, then notify.
    pub(super) async fn persist_and_apply(
        &self,
        day: &mut DayBook,
        event: &Event,
    ) -> Result<(), BookingError> {
        self.wal_append(event).await?;
        apply_to_day(day, event, &self.index);
        self.notify.send(event);
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
