// libs/appointment-cell/src/services/booking.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use clinic_cell::{Clinic, ClinicService};
use patient_cell::{CreatePatientRequest, Patient, PatientService};
use queue_cell::{DomainEvent, EventDispatcher};
use shared_database::{tables, Query, Store};
use shared_models::time_format;
use shared_utils::clock::Clock;
use shared_utils::locks::KeyedLocks;

use crate::models::{
    parse_date_or, Appointment, AppointmentError, AppointmentStatus, AppointmentView,
    BookAppointmentRequest, PatientAppointment, PublicBookingRequest,
};
use crate::services::availability::AvailabilityValidator;
use crate::services::directory;
use crate::services::lifecycle::doctor_day_key;
use crate::services::token::TokenGenerator;

/// Who the appointment is for.
enum PatientRef {
    Registered(String),
    SelfService(CreatePatientRequest),
}

/// Creates appointments. Validation, token assignment and the insert run
/// under the doctor's day lock, so two requests for the same slot cannot
/// both pass the double-booking check.
pub struct AppointmentBookingService {
    store: Arc<dyn Store>,
    clinics: Arc<ClinicService>,
    patients: Arc<PatientService>,
    validator: AvailabilityValidator,
    tokens: TokenGenerator,
    clock: Arc<dyn Clock>,
    locks: Arc<KeyedLocks>,
    events: EventDispatcher,
}

impl AppointmentBookingService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        clinics: Arc<ClinicService>,
        patients: Arc<PatientService>,
        validator: AvailabilityValidator,
        tokens: TokenGenerator,
        clock: Arc<dyn Clock>,
        locks: Arc<KeyedLocks>,
        events: EventDispatcher,
    ) -> Self {
        Self { store, clinics, patients, validator, tokens, clock, locks, events }
    }

    /// Staff booking for a registered patient.
    pub async fn book(&self, clinic_id: &str, request: BookAppointmentRequest) -> Result<Appointment, AppointmentError> {
        let date = parse_date_or(request.appointment_date.as_deref(), self.clock.today())?;

        self.book_slot(
            clinic_id,
            &request.doctor_id,
            date,
            &request.appointment_time,
            request.notes,
            PatientRef::Registered(request.patient_id),
        )
        .await
    }

    /// Self-service booking by clinic slug. The patient is matched by phone
    /// within the clinic and registered on first visit.
    pub async fn book_public(&self, request: PublicBookingRequest) -> Result<(Appointment, Clinic), AppointmentError> {
        if request.clinic_slug.trim().is_empty() || request.doctor_id.trim().is_empty() {
            return Err(AppointmentError::ValidationError(
                "Clinic and doctor are required".to_string(),
            ));
        }
        if request.patient_name.trim().is_empty() || request.patient_phone.trim().is_empty() {
            return Err(AppointmentError::ValidationError(
                "Patient name and phone are required".to_string(),
            ));
        }

        let clinic = self.clinics.get_by_slug(&request.clinic_slug).await?;
        let date = parse_date_or(request.appointment_date.as_deref(), self.clock.today())?;

        let patient = CreatePatientRequest {
            name: request.patient_name,
            phone: request.patient_phone,
            email: request.patient_email.filter(|e| !e.trim().is_empty()),
            age: request.age,
            gender: request.gender,
            ..Default::default()
        };

        let appointment = self
            .book_slot(
                &clinic.id,
                &request.doctor_id,
                date,
                &request.appointment_time,
                request.notes,
                PatientRef::SelfService(patient),
            )
            .await?;

        Ok((appointment, clinic))
    }

    async fn book_slot(
        &self,
        clinic_id: &str,
        doctor_id: &str,
        date: NaiveDate,
        time: &str,
        notes: Option<String>,
        patient: PatientRef,
    ) -> Result<Appointment, AppointmentError> {
        let _guard = self.locks.lock(&doctor_day_key(clinic_id, doctor_id, date)).await;

        let (doctor, time) = self.validator.validate(clinic_id, doctor_id, date, time).await?;
        let patient = self.resolve_patient(clinic_id, patient).await?;
        let token_number = self.tokens.generate(clinic_id, date, Some(&doctor.name)).await;

        let row = self.store
            .insert(
                tables::APPOINTMENTS,
                json!({
                    "clinic_id": clinic_id,
                    "doctor_id": doctor.id,
                    "patient_id": patient.id,
                    "appointment_date": date.to_string(),
                    "appointment_time": time_format::format_hhmm(&time),
                    "status": AppointmentStatus::Booked.as_str(),
                    "token_number": token_number,
                    "notes": notes.filter(|n| !n.trim().is_empty()),
                }),
            )
            .await?;
        let appointment: Appointment = serde_json::from_value(row)?;

        info!(
            "Booked appointment {} token {} with doctor {} on {} {}",
            appointment.id, appointment.token_number, doctor.id, date, appointment.time_label()
        );

        self.events.publish(DomainEvent::AppointmentBooked {
            clinic_id: clinic_id.to_string(),
            appointment_id: appointment.id.clone(),
            appointment_date: date,
            appointment_time: appointment.time_label(),
            token_number: appointment.token_number.clone(),
            doctor_name: doctor.name,
            patient_name: patient.name,
            patient_email: patient.email,
            patient_phone: Some(patient.phone),
        });

        Ok(appointment)
    }

    async fn resolve_patient(&self, clinic_id: &str, patient: PatientRef) -> Result<Patient, AppointmentError> {
        match patient {
            PatientRef::Registered(patient_id) => Ok(self.patients.get_patient(clinic_id, &patient_id).await?),
            PatientRef::SelfService(request) => {
                let (patient, created) = self.patients.find_or_create_by_phone(clinic_id, request).await?;
                if created {
                    debug!("Registered patient {} from self-service booking", patient.id);
                }
                Ok(patient)
            }
        }
    }

    /// The day's appointments by time, with doctor and patient names.
    pub async fn list_appointments(&self, clinic_id: &str, date: NaiveDate) -> Result<Vec<AppointmentView>, AppointmentError> {
        let rows = self.store
            .find(
                tables::APPOINTMENTS,
                &Query::new()
                    .eq("clinic_id", clinic_id)
                    .eq("appointment_date", date.to_string())
                    .order_by("appointment_time", true)
                    .order_by("token_number", true),
            )
            .await?;

        let appointments = rows
            .into_iter()
            .map(serde_json::from_value::<Appointment>)
            .collect::<Result<Vec<_>, _>>()?;

        let doctors = directory::doctor_names(self.store.as_ref(), clinic_id).await?;
        let patients = directory::patient_contacts(
            self.store.as_ref(),
            clinic_id,
            appointments.iter().map(|a| a.patient_id.as_str()),
        )
        .await?;

        Ok(appointments
            .into_iter()
            .map(|appointment| {
                let contact = patients.get(&appointment.patient_id).cloned().unwrap_or_default();
                AppointmentView {
                    doctor_name: directory::name_or_unknown(&doctors, &appointment.doctor_id),
                    patient_name: if contact.name.is_empty() { directory::UNKNOWN.to_string() } else { contact.name },
                    patient_phone: contact.phone,
                    appointment,
                }
            })
            .collect())
    }

    /// Every appointment booked under this phone number, in any clinic,
    /// newest first.
    pub async fn my_appointments(&self, phone: &str) -> Result<Vec<PatientAppointment>, AppointmentError> {
        let phone = phone.trim();
        if phone.is_empty() {
            return Err(AppointmentError::ValidationError("Phone number is required".to_string()));
        }

        let patients = self.store
            .find(tables::PATIENTS, &Query::new().eq("phone", phone))
            .await?
            .into_iter()
            .map(serde_json::from_value::<Patient>)
            .collect::<Result<Vec<_>, _>>()?;

        let mut history = Vec::new();
        for patient in patients {
            let clinic = match self.clinics.get_clinic(&patient.clinic_id).await {
                Ok(clinic) => clinic,
                Err(e) => {
                    warn!("Skipping patient {} whose clinic is unavailable: {}", patient.id, e);
                    continue;
                }
            };

            let appointments = self.store
                .find(
                    tables::APPOINTMENTS,
                    &Query::new().eq("clinic_id", clinic.id.as_str()).eq("patient_id", patient.id.as_str()),
                )
                .await?
                .into_iter()
                .map(serde_json::from_value::<Appointment>)
                .collect::<Result<Vec<_>, _>>()?;
            if appointments.is_empty() {
                continue;
            }

            let doctors = directory::doctor_names(self.store.as_ref(), &clinic.id).await?;
            let prescriptions = self.prescription_ids(&clinic.id, &appointments).await?;

            history.extend(appointments.into_iter().map(|appointment| PatientAppointment {
                clinic_name: clinic.name.clone(),
                clinic_slug: clinic.slug.clone(),
                doctor_name: directory::name_or_unknown(&doctors, &appointment.doctor_id),
                appointment_date: appointment.appointment_date,
                appointment_time: appointment.time_label(),
                status: appointment.status,
                token_number: appointment.token_number,
                feedback_score: appointment.feedback_score,
                has_prescription: prescriptions.contains_key(&appointment.id),
                prescription_id: prescriptions.get(&appointment.id).cloned(),
                id: appointment.id,
            }));
        }

        history.sort_by(|a, b| {
            (b.appointment_date, &b.appointment_time).cmp(&(a.appointment_date, &a.appointment_time))
        });
        debug!("Found {} appointments for a phone lookup", history.len());
        Ok(history)
    }

    /// Appointment id to prescription id, for the completed appointments.
    async fn prescription_ids(
        &self,
        clinic_id: &str,
        appointments: &[Appointment],
    ) -> Result<HashMap<String, String>, AppointmentError> {
        let completed: Vec<&str> = appointments
            .iter()
            .filter(|a| a.status == AppointmentStatus::Completed)
            .map(|a| a.id.as_str())
            .collect();
        if completed.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = self.store
            .find(
                tables::PRESCRIPTIONS,
                &Query::new().eq("clinic_id", clinic_id).in_list("appointment_id", completed),
            )
            .await?;

        let text = |row: &Value, column: &str| row.get(column).and_then(Value::as_str).map(str::to_string);
        Ok(rows
            .iter()
            .filter_map(|row| Some((text(row, "appointment_id")?, text(row, "id")?)))
            .collect())
    }
}
