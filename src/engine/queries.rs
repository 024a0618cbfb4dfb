use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::calendar;
use super::slots::open_slots;
use super::{Engine, EngineError};

impl Engine {
    /// Open slots for one local day of the professional.
    pub async fn available_slots(
        &self,
        professional_id: Ulid,
        date: NaiveDate,
    ) -> Result<Vec<DateTime<Utc>>, EngineError> {
        let ps = self
            .get_professional(&professional_id)
            .ok_or(EngineError::ProfessionalNotFound(professional_id))?;
        let guard = ps.read().await;
        metrics::counter!(crate::observability::SLOT_QUERIES_TOTAL).increment(1);
        open_slots(&guard, date, self.clock.now())
    }

    /// Create or update the scheduling fields fed in from the profile service.
    pub async fn configure_professional(
        &self,
        id: Ulid,
        config: ScheduleConfig,
    ) -> Result<(), EngineError> {
        if let Some(minutes) = config.appointment_duration_minutes
            && (minutes == 0 || minutes > MAX_APPOINTMENT_MINUTES)
        {
            return Err(EngineError::InvalidInput(format!(
                "appointment duration must be between 1 and {MAX_APPOINTMENT_MINUTES} minutes"
            )));
        }
        if let Some(zone) = config.timezone.as_deref() {
            if zone.len() > MAX_TIMEZONE_NAME_LEN {
                return Err(EngineError::LimitExceeded("timezone name too long"));
            }
            if calendar::parse_timezone(zone).is_none() {
                return Err(EngineError::InvalidInput(format!("unknown timezone: {zone}")));
            }
        }

        let _registry = match self.state.contains_key(&id) {
            true => None,
            false => Some(self.registry_lock.lock().await),
        };
        let mut created = false;
        let ps = self
            .state
            .entry(id)
            .or_insert_with(|| {
                created = true;
                Arc::new(RwLock::new(ProfessionalState::new(id, ScheduleConfig::default())))
            })
            .value()
            .clone();
        let mut guard = ps.write().await;

        let event = Event::ProfessionalConfigured { id, config };
        if let Err(e) = self.persist_and_apply(&mut guard, &event).await {
            if created {
                self.state.remove(&id);
            }
            return Err(e);
        }
        metrics::gauge!(crate::observability::PROFESSIONALS_ACTIVE).set(self.state.len() as f64);
        info!(professional = %id, "schedule configured");
        Ok(())
    }

    pub async fn schedule(&self, id: Ulid) -> Result<ScheduleConfig, EngineError> {
        let ps = self
            .get_professional(&id)
            .ok_or(EngineError::ProfessionalNotFound(id))?;
        let config = ps.read().await.config.clone();
        Ok(config)
    }

    /// One appointment, visible only to its client and professional.
    pub async fn get_appointment(
        &self,
        appointment_id: Ulid,
        caller_id: Ulid,
    ) -> Result<Appointment, EngineError> {
        let pid = self
            .get_professional_for_entity(&appointment_id)
            .ok_or(EngineError::NotFound(appointment_id))?;
        let ps = self
            .get_professional(&pid)
            .ok_or(EngineError::NotFound(appointment_id))?;
        let guard = ps.read().await;
        let appointment = guard
            .appointment(appointment_id)
            .ok_or(EngineError::NotFound(appointment_id))?;
        if !appointment.involves(caller_id) {
            return Err(EngineError::Forbidden(appointment_id));
        }
        Ok(appointment.clone())
    }

    /// Every appointment the user takes part in, as client or professional, by start time.
    pub async fn list_appointments(&self, user_id: Ulid) -> Vec<Appointment> {
        let professionals: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut found = Vec::new();
        for ps in professionals {
            let guard = ps.read().await;
            found.extend(guard.appointments.iter().filter(|a| a.involves(user_id)).cloned());
        }
        found.sort_by_key(|a| (a.start_time, a.id));
        found
    }
}
