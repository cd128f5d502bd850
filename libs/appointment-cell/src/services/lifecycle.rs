// libs/appointment-cell/src/services/lifecycle.rs
use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::json;
use tracing::{debug, info, warn};

use queue_cell::{DomainEvent, EventDispatcher};
use shared_database::{tables, Query, Store};
use shared_utils::locks::KeyedLocks;

use crate::models::{Appointment, AppointmentError, AppointmentStatus};

/// Lock key shared by booking and consultation start for one doctor's day.
pub fn doctor_day_key(clinic_id: &str, doctor_id: &str, date: NaiveDate) -> String {
    format!("{}:{}:{}", clinic_id, doctor_id, date)
}

/// The appointment state machine. Every status write is conditional on the
/// status that was read, so a request that lost a race changes nothing and
/// gets a Conflict.
pub struct AppointmentLifecycleService {
    store: Arc<dyn Store>,
    locks: Arc<KeyedLocks>,
    events: EventDispatcher,
}

impl AppointmentLifecycleService {
    pub fn new(store: Arc<dyn Store>, locks: Arc<KeyedLocks>, events: EventDispatcher) -> Self {
        Self { store, locks, events }
    }

    pub async fn get_appointment(&self, clinic_id: &str, appointment_id: &str) -> Result<Appointment, AppointmentError> {
        let row = self.store
            .find_one(
                tables::APPOINTMENTS,
                &Query::new().eq("id", appointment_id).eq("clinic_id", clinic_id),
            )
            .await?
            .ok_or(AppointmentError::NotFound("Appointment"))?;

        Ok(serde_json::from_value(row)?)
    }

    pub async fn transition(
        &self,
        clinic_id: &str,
        appointment_id: &str,
        new_status: &str,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get_appointment(clinic_id, appointment_id).await?;
        let next: AppointmentStatus = new_status.parse()?;

        let updated = self.commit(&current, next).await?;
        self.announce(&current, &updated);
        Ok(updated)
    }

    /// Writes the new status without emitting events. Callers that pair the
    /// status change with another write announce it once both succeeded.
    pub(crate) async fn commit(
        &self,
        current: &Appointment,
        next: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        if !current.status.can_transition_to(next) {
            warn!(
                "Rejected transition {} -> {} for appointment {}",
                current.status, next, current.id
            );
            return Err(AppointmentError::invalid_transition(current.status, next));
        }

        let _guard = match next {
            AppointmentStatus::InConsultation => {
                let guard = self.locks
                    .lock(&doctor_day_key(&current.clinic_id, &current.doctor_id, current.appointment_date))
                    .await;
                self.ensure_doctor_free(current).await?;
                Some(guard)
            }
            _ => None,
        };

        self.write_status(current, current.status, next)
            .await?
            .ok_or_else(|| {
                AppointmentError::Conflict(format!(
                    "Appointment {} was changed by another request. Reload and try again",
                    current.id
                ))
            })
    }

    /// Puts the status back after a paired write failed.
    pub(crate) async fn revert(&self, reverted: &Appointment, original: AppointmentStatus) {
        match self.write_status(reverted, reverted.status, original).await {
            Ok(Some(_)) => debug!("Reverted appointment {} to {}", reverted.id, original),
            Ok(None) => warn!("Appointment {} moved on before it could be reverted", reverted.id),
            Err(e) => warn!("Failed to revert appointment {}: {}", reverted.id, e),
        }
    }

    pub(crate) fn announce(&self, before: &Appointment, after: &Appointment) {
        info!(
            "Appointment {} ({}) moved {} -> {}",
            after.id, after.token_number, before.status, after.status
        );
        self.events.publish(DomainEvent::StatusChanged {
            clinic_id: after.clinic_id.clone(),
            appointment_id: after.id.clone(),
            appointment_date: after.appointment_date,
            token_number: after.token_number.clone(),
            old_status: before.status.to_string(),
            new_status: after.status.to_string(),
        });
    }

    async fn write_status(
        &self,
        appointment: &Appointment,
        expected: AppointmentStatus,
        next: AppointmentStatus,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let guard = Query::new()
            .eq("clinic_id", appointment.clinic_id.as_str())
            .eq("status", expected.as_str());

        let row = self.store
            .update_where(tables::APPOINTMENTS, &appointment.id, &guard, json!({ "status": next.as_str() }))
            .await?;

        match row {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }

    /// One consultation at a time per doctor and day.
    async fn ensure_doctor_free(&self, appointment: &Appointment) -> Result<(), AppointmentError> {
        let busy = self.store
            .find(
                tables::APPOINTMENTS,
                &Query::new()
                    .eq("clinic_id", appointment.clinic_id.as_str())
                    .eq("doctor_id", appointment.doctor_id.as_str())
                    .eq("appointment_date", appointment.appointment_date.to_string())
                    .eq("status", AppointmentStatus::InConsultation.as_str())
                    .neq("id", appointment.id.as_str()),
            )
            .await?;

        match busy.first() {
            Some(other) => {
                let token = other
                    .get("token_number")
                    .and_then(|t| t.as_str())
                    .unwrap_or("another patient");
                Err(AppointmentError::Conflict(format!(
                    "Doctor is already in consultation with {}. Complete it first",
                    token
                )))
            }
            None => Ok(()),
        }
    }

    /// Marks every appointment still booked or queued on `date` as no-show.
    /// Appointments that move on concurrently are skipped.
    pub async fn sweep_no_shows(&self, clinic_id: Option<&str>, date: NaiveDate) -> Result<usize, AppointmentError> {
        let mut query = Query::new()
            .eq("appointment_date", date.to_string())
            .in_list(
                "status",
                [AppointmentStatus::Booked.as_str(), AppointmentStatus::InQueue.as_str()],
            );
        if let Some(clinic_id) = clinic_id {
            query = query.eq("clinic_id", clinic_id);
        }

        let rows = self.store.find(tables::APPOINTMENTS, &query).await?;
        let mut swept = 0;

        for row in rows {
            let appointment: Appointment = serde_json::from_value(row)?;
            match self.commit(&appointment, AppointmentStatus::NoShow).await {
                Ok(updated) => {
                    self.announce(&appointment, &updated);
                    swept += 1;
                }
                Err(AppointmentError::Conflict(_)) | Err(AppointmentError::InvalidTransition { .. }) => {
                    debug!("Skipping appointment {} in no-show sweep", appointment.id);
                }
                Err(e) => return Err(e),
            }
        }

        info!("No-show sweep for {} marked {} appointments", date, swept);
        Ok(swept)
    }
}
