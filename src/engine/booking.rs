use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use ulid::Ulid;

use crate::model::*;
use crate::observability::BOOKINGS_TOTAL;

use super::calendar;
use super::slots::open_slots;
use super::{Engine, EngineError};

impl Engine {
    /// Book `start` with `professional_id` for `client_id`.
    ///
    /// The requested start is revalidated against slots recomputed under the
    /// professional lock, so of two racing requests for one slot the second sees the
    /// first's appointment and is refused.
    pub async fn create_appointment(
        &self,
        client_id: Ulid,
        professional_id: Ulid,
        start: DateTime<Utc>,
    ) -> Result<Appointment, EngineError> {
        let mut guard = self.lock_professional(professional_id).await?;

        let (Some(minutes), Some(zone)) = (
            guard.config.appointment_duration_minutes,
            guard.config.timezone.clone(),
        ) else {
            return Err(EngineError::NotConfigured(professional_id));
        };
        let tz = calendar::parse_timezone(&zone)
            .ok_or_else(|| EngineError::InvalidInput(format!("unknown timezone: {zone}")))?;

        let now = self.clock.now();
        let date = calendar::local_date_of(start, tz);
        let slots = open_slots(&guard, date, now)?;
        if slots.binary_search(&start).is_err() {
            metrics::counter!(BOOKINGS_TOTAL, "outcome" => "rejected").increment(1);
            warn!(
                professional = %professional_id,
                client = %client_id,
                start = %start.to_rfc3339(),
                "booking rejected: slot not open"
            );
            return Err(EngineError::SlotUnavailable(start));
        }

        let status = if guard.config.auto_confirm_appointments {
            AppointmentStatus::Scheduled
        } else {
            AppointmentStatus::Pending
        };
        let appointment = Appointment {
            id: Ulid::new(),
            client_id,
            professional_id,
            start_time: start,
            end_time: start + Duration::minutes(i64::from(minutes)),
            status,
            created_at: now,
        };

        let event = Event::AppointmentBooked {
            appointment: appointment.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;

        metrics::counter!(BOOKINGS_TOTAL, "outcome" => "booked").increment(1);
        info!(
            appointment = %appointment.id,
            professional = %professional_id,
            client = %client_id,
            start = %start.to_rfc3339(),
            status = ?status,
            "appointment booked"
        );
        Ok(appointment)
    }

    /// Delete an appointment on behalf of one of its two participants.
    pub async fn cancel_appointment(
        &self,
        appointment_id: Ulid,
        caller_id: Ulid,
    ) -> Result<Appointment, EngineError> {
        let mut guard = self.lock_entity_owner(&appointment_id).await?;
        let appointment = guard
            .appointment(appointment_id)
            .cloned()
            .ok_or(EngineError::NotFound(appointment_id))?;
        if !appointment.involves(caller_id) {
            return Err(EngineError::Forbidden(appointment_id));
        }

        let event = Event::AppointmentCanceled {
            id: appointment_id,
            professional_id: appointment.professional_id,
        };
        self.persist_and_apply(&mut guard, &event).await?;

        metrics::counter!(BOOKINGS_TOTAL, "outcome" => "canceled").increment(1);
        info!(
            appointment = %appointment_id,
            by = %caller_id,
            "appointment canceled"
        );
        Ok(appointment)
    }
}
