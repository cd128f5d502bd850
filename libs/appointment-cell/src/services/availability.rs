// libs/appointment-cell/src/services/availability.rs
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use tracing::debug;

use doctor_cell::{Doctor, DoctorService};
use shared_database::{tables, Query, Store};
use shared_models::time_format;
use shared_utils::clock::Clock;

use crate::models::{AppointmentError, AppointmentStatus};

/// Checks a requested slot before a booking is written. Checks run in a
/// fixed order and the first failure is returned.
pub struct AvailabilityValidator {
    store: Arc<dyn Store>,
    doctors: Arc<DoctorService>,
    clock: Arc<dyn Clock>,
}

impl AvailabilityValidator {
    pub fn new(store: Arc<dyn Store>, doctors: Arc<DoctorService>, clock: Arc<dyn Clock>) -> Self {
        Self { store, doctors, clock }
    }

    /// Returns the doctor and the parsed time on success.
    pub async fn validate(
        &self,
        clinic_id: &str,
        doctor_id: &str,
        date: NaiveDate,
        time: &str,
    ) -> Result<(Doctor, NaiveTime), AppointmentError> {
        let time = time.trim();
        if time.is_empty() {
            return Err(AppointmentError::ValidationError("Appointment time is required".to_string()));
        }
        let time = time_format::parse_hhmm(time).ok_or_else(|| {
            AppointmentError::ValidationError(format!("Invalid time '{}'. Use HH:MM", time))
        })?;

        let today = self.clock.today();
        if date < today {
            return Err(AppointmentError::ValidationError(
                "Cannot book appointments in the past".to_string(),
            ));
        }
        if date == today && time <= self.clock.now_time() {
            return Err(AppointmentError::ValidationError(format!(
                "Time {} has already passed today",
                time_format::format_hhmm(&time)
            )));
        }

        let doctor = self.doctors.get_doctor(clinic_id, doctor_id).await?;

        if !doctor.is_active() {
            return Err(AppointmentError::Conflict(format!(
                "Dr. {} is not currently available",
                doctor.name
            )));
        }

        if !doctor.works_at(time) {
            return Err(AppointmentError::ValidationError(format!(
                "Dr. {} is only available {}",
                doctor.name,
                doctor.hours_label()
            )));
        }

        let taken = self.store
            .count(
                tables::APPOINTMENTS,
                &Query::new()
                    .eq("clinic_id", clinic_id)
                    .eq("doctor_id", doctor_id)
                    .eq("appointment_date", date.to_string())
                    .eq("appointment_time", time_format::format_hhmm(&time))
                    .neq("status", AppointmentStatus::Cancelled.as_str()),
            )
            .await?;
        if taken > 0 {
            return Err(AppointmentError::Conflict(format!(
                "The {} slot with Dr. {} is already booked",
                time_format::format_hhmm(&time),
                doctor.name
            )));
        }

        debug!("Slot {} {} with doctor {} is available", date, time, doctor_id);
        Ok((doctor, time))
    }
}
