mod aggregate;
mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod slots;
mod store;

pub use aggregate::aggregate;
pub use availability::plan_day;
pub use conflict::{check_availability, Admission, Rejection};
pub use error::{EngineError, ErrorKind};
pub use mutations::NewBooking;
pub use slots::SlotCalendar;
pub use store::{SharedResourceState, Store};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::warn;
use ulid::Ulid;

use crate::access::{AccessPolicy, StaffPolicy};
use crate::model::*;
use crate::notify::{LogNotifier, Notifier, NotifyHub};
use crate::tasks::{NoTasks, TaskFeed};
use crate::wal::Wal;

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

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends.
/// 4. One flush_sync for the whole batch.
/// 5. Answer every sender with the batch result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
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
            other => handle_non_append(&mut wal, other),
        }
    }
}

type Pending = (Event, oneshot::Sender<io::Result<()>>);

fn commit_batch(wal: &mut Wal, batch: &mut Vec<Pending>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(ref e) = result {
        warn!("journal flush failed for {} events: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[Pending]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so half-written bytes never leak
    // into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let mut batch = vec![(event, response)];
            commit_batch(wal, &mut batch);
        }
    }
}

/// External systems the engine talks to. Defaults: staff-only management,
/// log-only notifications, no task feed.
#[derive(Clone)]
pub struct Collaborators {
    pub notifier: Arc<dyn Notifier>,
    pub tasks: Arc<dyn TaskFeed>,
    pub policy: Arc<dyn AccessPolicy>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            notifier: Arc::new(LogNotifier),
            tasks: Arc::new(NoTasks),
            policy: Arc::new(StaffPolicy),
        }
    }
}

/// Scheduling engine for one dealership.
pub struct Engine {
    pub store: Store,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pub(super) notifier: Arc<dyn Notifier>,
    pub(super) tasks: Arc<dyn TaskFeed>,
    pub(super) policy: Arc<dyn AccessPolicy>,
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        Self::with_collaborators(wal_path, notify, Collaborators::default())
    }

    pub fn with_collaborators(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        collaborators: Collaborators,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            store: Store::new(),
            wal_tx,
            notify,
            notifier: collaborators.notifier,
            tasks: collaborators.tasks,
            policy: collaborators.policy,
        };
        engine.replay(&events)?;
        Ok(engine)
    }

    /// Rebuild state from journal events. Nothing else holds these locks
    /// yet, so `try_write` always succeeds. Never block here: this may run
    /// inside an async context (lazy tenant creation).
    fn replay(&self, events: &[Event]) -> io::Result<()> {
        let contended = || io::Error::other("replay: state lock contended");
        for event in events {
            match event {
                Event::ResourceRegistered { id, kind, name } => {
                    self.store.insert_resource(ResourceState::new(*id, *kind, name.clone()));
                }
                Event::WindowAdded { .. }
                | Event::WindowUpdated { .. }
                | Event::WindowRetired { .. }
                | Event::HolidayAdded { .. }
                | Event::HolidayRemoved { .. } => {
                    self.store.calendar().try_write().map_err(|_| contended())?.apply(event);
                }
                Event::BookingCreated { booking } => {
                    self.replay_ledger(booking.resource_id, event, contended)?;
                }
                Event::BookingStatusChanged { resource_id, .. } | Event::BookingRescheduled { resource_id, .. } => {
                    self.replay_ledger(*resource_id, event, contended)?;
                }
            }
        }
        Ok(())
    }

    fn replay_ledger(&self, resource_id: Ulid, event: &Event, contended: impl Fn() -> io::Error) -> io::Result<()> {
        match self.store.get_resource(&resource_id) {
            Some(rs) => {
                let mut guard = rs.try_write().map_err(|_| contended())?;
                self.store.apply_event(&mut guard, event);
            }
            None => warn!("replay: event for unknown resource {resource_id} skipped"),
        }
        Ok(())
    }

    /// Write event to the journal via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Journal, apply and broadcast a ledger event. Caller holds the write lock.
    pub(super) async fn persist_and_apply(
        &self,
        resource_id: Ulid,
        rs: &mut ResourceState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_event(rs, event);
        self.notify.send(resource_id, event);
        Ok(())
    }

    /// Journal and apply a slot configuration event. Caller holds the calendar write lock.
    pub(super) async fn persist_config(&self, calendar: &mut SlotCalendar, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        calendar.apply(event);
        Ok(())
    }

    /// Lookup booking → resource, acquire the resource write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<ResourceState>), EngineError> {
        let resource_id = self
            .store
            .resource_for_booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let rs = self
            .store
            .get_resource(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let guard = rs.write_owned().await;
        Ok((resource_id, guard))
    }

    // ── Compaction ───────────────────────────────────────────

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

    /// Rewrite the journal as the minimal event list for the current state.
    ///
    /// Every resource and the calendar stay read-locked until the new file
    /// is in place, so no mutation can journal an event the snapshot misses.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _registry = self.store.registry().lock().await;

        let mut guards = Vec::new();
        for id in self.store.resource_ids() {
            if let Some(rs) = self.store.get_resource(&id) {
                guards.push(rs.read_owned().await);
            }
        }
        let calendar = self.store.calendar().read().await;

        let mut events = Vec::new();
        for w in calendar.windows() {
            events.push(Event::WindowAdded { window: w.clone() });
        }
        for h in calendar.holidays() {
            events.push(Event::HolidayAdded { holiday: h.clone() });
        }
        for rs in &guards {
            events.push(Event::ResourceRegistered {
                id: rs.id,
                kind: rs.kind,
                name: rs.name.clone(),
            });
            for b in &rs.bookings {
                events.push(Event::BookingCreated { booking: b.clone() });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;

        drop(calendar);
        drop(guards);
        Ok(())
    }
}
