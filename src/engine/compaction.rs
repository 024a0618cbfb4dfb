use tokio::sync::oneshot;

use crate::model::*;

use super::{Engine, EngineError, WalCommand};

/// Minimal event list that rebuilds the given professionals: config, rule set and
/// remaining appointments for each.
fn snapshot_events<'a>(professionals: impl IntoIterator<Item = &'a ProfessionalState>) -> Vec<Event> {
    let mut events = Vec::new();
    for ps in professionals {
        events.push(Event::ProfessionalConfigured {
            id: ps.id,
            config: ps.config.clone(),
        });
        if !ps.rules.is_empty() {
            events.push(Event::RulesReplaced {
                professional_id: ps.id,
                rules: ps.rules.clone(),
            });
        }
        events.extend(ps.appointments.iter().map(|a| Event::AppointmentBooked {
            appointment: a.clone(),
        }));
    }
    events
}

impl Engine {
    /// Rewrite the WAL as a snapshot of the current state.
    ///
    /// Every professional stays read-locked, and no new professional can be registered,
    /// until the snapshot has replaced the log; otherwise an append landing between
    /// snapshot and swap would be lost.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _registry = self.registry_lock.lock().await;
        let professionals: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut guards = Vec::with_capacity(professionals.len());
        for ps in professionals {
            guards.push(ps.read_owned().await);
        }
        let events = snapshot_events(guards.iter().map(|g| &**g));

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
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
