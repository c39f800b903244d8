mod availability;
mod booking;
mod conflict;
mod error;
mod mutations;
mod queries;
mod recurrence;
mod store;

pub use availability::{
    free_slots, merge_overlapping, merged_timeline, next_free_at, snapshot, subtract_intervals,
};
pub use booking::{book, cancel, commit, plan_booking, plan_cancel, plan_reschedule, reschedule};
pub use conflict::{check_conflict, check_occurrences};
pub use error::BookingError;
pub use recurrence::expand;
pub use store::ReservationStore;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{info, warn};
use ulid::Ulid;

use crate::config::Config;
use crate::journal::Journal;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability;

// ── Journal writer channel ───────────────────────────────

enum JournalCommand {
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

/// Owns the journal. Each append is written and fsynced before its sender hears
/// back; mutations already hold the store write lock across that wait, so at
/// most one append is ever in flight.
async fn journal_writer_loop(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            JournalCommand::Append { event, response } => {
                let started = std::time::Instant::now();
                let result = journal.append(&event);
                metrics::histogram!(observability::JOURNAL_FLUSH_DURATION_SECONDS)
                    .record(started.elapsed().as_secs_f64());
                if let Err(e) = &result {
                    warn!("journal append failed: {e}");
                }
                let _ = response.send(result);
            }
            JournalCommand::Compact { events, response } => {
                let result = Journal::write_compact_file(journal.path(), &events)
                    .and_then(|()| journal.swap_compact_file());
                let _ = response.send(result);
            }
            JournalCommand::AppendsSinceCompact { response } => {
                let _ = response.send(journal.appends_since_compact());
            }
        }
    }
}

/// Async front of the booking core.
///
/// All mutations take the store write lock and hold it across plan, journal
/// append and apply, so a conflict check can never be invalidated before its
/// booking lands. Reads share the lock.
pub struct Engine {
    rooms: DashMap<Ulid, Room>,
    store: RwLock<ReservationStore>,
    journal_tx: mpsc::Sender<JournalCommand>,
    pub notify: Arc<NotifyHub>,
}

/// Apply an event to in-memory state (caller holds the store write lock).
fn apply_event(store: &mut ReservationStore, rooms: &DashMap<Ulid, Room>, event: &Event) {
    match event {
        Event::RoomCreated { room } | Event::RoomUpdated { room } => {
            rooms.insert(room.id, room.clone());
        }
        Event::RoomDeleted { id } => {
            rooms.remove(id);
        }
        Event::Booked { reservations, .. } => {
            for reservation in reservations {
                if let Err(e) = store.insert(reservation.clone()) {
                    warn!(reservation_id = %reservation.id, "skipping reservation: {e}");
                }
            }
        }
        Event::Cancelled { ids, .. } => {
            for id in ids {
                store.remove(*id);
            }
        }
        Event::Rescheduled { id, span, .. } => {
            store.reschedule(*id, *span);
        }
    }
}

impl Engine {
    /// Replay the journal at `journal_path` and start its writer task.
    /// Must be called inside a tokio runtime.
    pub fn open(journal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let (journal, events) = Journal::recover(&journal_path)?;
        let (journal_tx, journal_rx) = mpsc::channel(4096);
        tokio::spawn(journal_writer_loop(journal, journal_rx));

        let rooms = DashMap::new();
        let mut store = ReservationStore::new();
        for event in &events {
            apply_event(&mut store, &rooms, event);
        }
        info!(
            events = events.len(),
            rooms = rooms.len(),
            reservations = store.len(),
            path = %journal_path.display(),
            "journal replayed"
        );
        metrics::gauge!(observability::ROOMS_ACTIVE).set(rooms.len() as f64);
        metrics::gauge!(observability::RESERVATIONS_ACTIVE).set(store.len() as f64);

        Ok(Self {
            rooms,
            store: RwLock::new(store),
            journal_tx,
            notify,
        })
    }

    /// Open the engine described by `config` and start background compaction.
    pub fn from_config(config: &Config) -> io::Result<Arc<Self>> {
        std::fs::create_dir_all(&config.data_dir)?;
        let engine = Arc::new(Self::open(config.journal_path(), Arc::new(NotifyHub::new()))?);

        let compactor = engine.clone();
        let threshold = config.compact_threshold;
        let every = config.compact_interval;
        tokio::spawn(async move {
            crate::maintenance::run_compactor(compactor, threshold, every).await;
        });
        Ok(engine)
    }

    /// Write an event through the journal writer and wait until it is durable.
    async fn journal_append(&self, event: &Event) -> Result<(), BookingError> {
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| BookingError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| BookingError::JournalError("journal writer dropped response".into()))?
            .map_err(|e| BookingError::JournalError(e.to_string()))
    }

    /// Journal, apply, notify. Nothing is applied if the journal append fails.
    pub(super) async fn persist_and_apply(
        &self,
        store: &mut ReservationStore,
        event: &Event,
    ) -> Result<(), BookingError> {
        self.journal_append(event).await?;
        apply_event(store, &self.rooms, event);
        self.notify.send(event);
        metrics::gauge!(observability::RESERVATIONS_ACTIVE).set(store.len() as f64);
        metrics::gauge!(observability::ROOMS_ACTIVE).set(self.rooms.len() as f64);
        Ok(())
    }
}
