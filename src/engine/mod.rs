mod availability;
mod booking;
pub mod calendar;
mod clock;
mod compaction;
mod error;
mod queries;
mod slots;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedRwLockWriteGuard, RwLock};
use tracing::debug;
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

/// Per-professional state behind its own lock. Holding the write half is the
/// professional lock: bookings and availability writes for one professional
/// run one at a time, different professionals never contend.
pub type SharedProfessionalState = Arc<RwLock<ProfessionalState>>;

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

/// Background task that owns the WAL and batches appends for group commit.
/// Blocks for the first append, drains whatever else is already queued, then
/// does a single fsync for the whole batch and answers every sender.
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
    debug!("WAL writer stopped");
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    // A record that fails to encode is refused alone; the rest of the batch still commits.
    let mut outcomes: Vec<io::Result<()>> = batch
        .iter()
        .map(|(event, _)| wal.append_buffered(event))
        .collect();
    // A failed flush is rolled back inside the WAL, so nothing buffered became durable.
    if let Err(e) = wal.flush_sync() {
        for outcome in outcomes.iter_mut().filter(|o| o.is_ok()) {
            *outcome = Err(io::Error::new(e.kind(), e.to_string()));
        }
    }

    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for ((_, tx), outcome) in batch.drain(..).zip(outcomes) {
        let _ = tx.send(outcome);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result =
                Wal::write_snapshot(wal.path(), &events).and_then(|()| wal.install_snapshot());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

pub struct Engine {
    pub state: DashMap<Ulid, SharedProfessionalState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub(super) clock: Arc<dyn Clock>,
    /// Reverse lookup: rule/appointment id → professional id
    pub(super) entity_to_professional: DashMap<Ulid, Ulid>,
    /// Held while registering a new professional and for the whole of a compaction.
    pub(super) registry_lock: Mutex<()>,
}

/// Apply an event to a professional's state (no locking — caller holds the lock).
fn apply_to_professional(
    ps: &mut ProfessionalState,
    event: &Event,
    entity_map: &DashMap<Ulid, Ulid>,
) {
    match event {
        Event::ProfessionalConfigured { config, .. } => {
            ps.config = config.clone();
        }
        Event::RulesReplaced { professional_id, rules } => {
            for old in ps.replace_rules(rules.clone()) {
                entity_map.remove(&old.id);
            }
            for rule in rules {
                entity_map.insert(rule.id, *professional_id);
            }
        }
        Event::RuleAdded { rule } => {
            ps.insert_rule(rule.clone());
            entity_map.insert(rule.id, rule.professional_id);
        }
        Event::RuleRemoved { id, .. } => {
            ps.remove_rule(*id);
            entity_map.remove(id);
        }
        Event::AppointmentBooked { appointment } => {
            ps.insert_appointment(appointment.clone());
            entity_map.insert(appointment.id, appointment.professional_id);
        }
        Event::AppointmentCanceled { id, .. } => {
            ps.remove_appointment(*id);
            entity_map.remove(id);
        }
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, clock: Arc<dyn Clock>) -> io::Result<Self> {
        let (wal, events) = Wal::open::<Event>(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            clock,
            entity_to_professional: DashMap::new(),
            registry_lock: Mutex::new(()),
        };

        // Sole owner of every Arc during replay, so try_write never contends. Blocking
        // lock calls are off-limits here because this runs inside the runtime.
        for event in &events {
            let pid = event.professional_id();
            if let Event::ProfessionalConfigured { id, config } = event
                && !engine.state.contains_key(id)
            {
                let ps = ProfessionalState::new(*id, config.clone());
                engine.state.insert(*id, Arc::new(RwLock::new(ps)));
                continue;
            }
            if let Some(entry) = engine.state.get(&pid) {
                let ps = entry.value().clone();
                let mut guard = ps.try_write().expect("replay: uncontended write");
                apply_to_professional(&mut guard, event, &engine.entity_to_professional);
            }
        }

        metrics::gauge!(crate::observability::PROFESSIONALS_ACTIVE).set(engine.state.len() as f64);
        Ok(engine)
    }

    pub fn open(wal_path: PathBuf) -> io::Result<Self> {
        Self::new(wal_path, Arc::new(SystemClock))
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_professional(&self, id: &Ulid) -> Option<SharedProfessionalState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn get_professional_for_entity(&self, entity_id: &Ulid) -> Option<Ulid> {
        self.entity_to_professional.get(entity_id).map(|e| *e.value())
    }

    /// Durable append first, then apply. A failed append leaves state untouched.
    pub(super) async fn persist_and_apply(
        &self,
        ps: &mut ProfessionalState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_professional(ps, event, &self.entity_to_professional);
        Ok(())
    }

    /// Take the professional lock.
    pub(super) async fn lock_professional(
        &self,
        id: Ulid,
    ) -> Result<OwnedRwLockWriteGuard<ProfessionalState>, EngineError> {
        let ps = self
            .get_professional(&id)
            .ok_or(EngineError::ProfessionalNotFound(id))?;
        Ok(ps.write_owned().await)
    }

    /// Lookup entity → professional, then take that professional's lock.
    pub(super) async fn lock_entity_owner(
        &self,
        entity_id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<ProfessionalState>, EngineError> {
        let pid = self
            .get_professional_for_entity(entity_id)
            .ok_or(EngineError::NotFound(*entity_id))?;
        self.lock_professional(pid).await
    }
}
