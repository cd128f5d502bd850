// libs/appointment-cell/src/services/prescription.rs
use std::sync::Arc;

use serde_json::json;
use tracing::{error, info, warn};

use clinic_cell::ClinicService;
use doctor_cell::DoctorService;
use patient_cell::PatientService;
use queue_cell::{DomainEvent, EventDispatcher};
use shared_database::{tables, Query, Store};

use crate::models::{
    AppointmentError, AppointmentStatus, CreatePrescriptionRequest, Prescription, PublicPrescription,
};
use crate::services::lifecycle::AppointmentLifecycleService;

/// Prescriptions close a consultation: writing one completes the
/// appointment, and the two writes succeed or fail together.
pub struct PrescriptionService {
    store: Arc<dyn Store>,
    lifecycle: Arc<AppointmentLifecycleService>,
    clinics: Arc<ClinicService>,
    doctors: Arc<DoctorService>,
    patients: Arc<PatientService>,
    events: EventDispatcher,
}

impl PrescriptionService {
    pub fn new(
        store: Arc<dyn Store>,
        lifecycle: Arc<AppointmentLifecycleService>,
        clinics: Arc<ClinicService>,
        doctors: Arc<DoctorService>,
        patients: Arc<PatientService>,
        events: EventDispatcher,
    ) -> Self {
        Self { store, lifecycle, clinics, doctors, patients, events }
    }

    pub async fn create_prescription(
        &self,
        clinic_id: &str,
        request: CreatePrescriptionRequest,
    ) -> Result<Prescription, AppointmentError> {
        let appointment_id = request.appointment_id.trim();
        let diagnosis = request.diagnosis.trim();
        if appointment_id.is_empty() || diagnosis.is_empty() {
            return Err(AppointmentError::ValidationError(
                "Appointment ID and diagnosis are required".to_string(),
            ));
        }
        if request.medicines.iter().any(|m| m.name.trim().is_empty()) {
            return Err(AppointmentError::ValidationError("Every medicine needs a name".to_string()));
        }
        let follow_up_date = match request.follow_up_date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(raw) => Some(chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                AppointmentError::ValidationError(format!("Invalid follow-up date '{}'. Use YYYY-MM-DD", raw))
            })?),
            None => None,
        };

        let appointment = self.lifecycle.get_appointment(clinic_id, appointment_id).await?;

        let existing = self.store
            .count(
                tables::PRESCRIPTIONS,
                &Query::new().eq("clinic_id", clinic_id).eq("appointment_id", appointment_id),
            )
            .await?;
        if existing > 0 {
            return Err(AppointmentError::Conflict(
                "A prescription already exists for this appointment".to_string(),
            ));
        }

        let completed = self.lifecycle.commit(&appointment, AppointmentStatus::Completed).await?;

        let inserted = self.store
            .insert(
                tables::PRESCRIPTIONS,
                json!({
                    "clinic_id": clinic_id,
                    "appointment_id": appointment.id,
                    "doctor_id": appointment.doctor_id,
                    "patient_id": appointment.patient_id,
                    "diagnosis": diagnosis,
                    "medicines": request.medicines,
                    "advice": request.advice.filter(|a| !a.trim().is_empty()),
                    "follow_up_date": follow_up_date.map(|d| d.to_string()),
                }),
            )
            .await
            .map_err(AppointmentError::from)
            .and_then(|row| Ok(serde_json::from_value::<Prescription>(row)?));

        let prescription = match inserted {
            Ok(prescription) => prescription,
            Err(e) => {
                error!("Prescription for appointment {} failed, reopening consultation: {}", appointment.id, e);
                self.lifecycle.revert(&completed, appointment.status).await;
                return Err(e);
            }
        };

        info!("Prescription {} issued for appointment {}", prescription.id, appointment.id);
        self.lifecycle.announce(&appointment, &completed);

        let patient = match self.patients.get_patient(clinic_id, &appointment.patient_id).await {
            Ok(patient) => Some(patient),
            Err(e) => {
                warn!("Patient {} unavailable for prescription notice: {}", appointment.patient_id, e);
                None
            }
        };
        self.events.publish(DomainEvent::PrescriptionIssued {
            clinic_id: clinic_id.to_string(),
            appointment_id: appointment.id.clone(),
            prescription_id: prescription.id.clone(),
            patient_name: patient.as_ref().map(|p| p.name.clone()).unwrap_or_default(),
            patient_email: patient.as_ref().and_then(|p| p.email.clone()),
            patient_phone: patient.as_ref().map(|p| p.phone.clone()),
            diagnosis: prescription.diagnosis.clone(),
        });

        Ok(prescription)
    }

    pub async fn get_prescription(&self, clinic_id: &str, prescription_id: &str) -> Result<Prescription, AppointmentError> {
        let row = self.store
            .find_one(
                tables::PRESCRIPTIONS,
                &Query::new().eq("id", prescription_id).eq("clinic_id", clinic_id),
            )
            .await?
            .ok_or(AppointmentError::NotFound("Prescription"))?;

        Ok(serde_json::from_value(row)?)
    }

    /// The patient's copy, reachable by id alone.
    pub async fn public_prescription(&self, prescription_id: &str) -> Result<PublicPrescription, AppointmentError> {
        let row = self.store
            .find_one(tables::PRESCRIPTIONS, &Query::new().eq("id", prescription_id))
            .await?
            .ok_or(AppointmentError::NotFound("Prescription"))?;
        let prescription: Prescription = serde_json::from_value(row)?;
        let clinic_id = prescription.clinic_id.as_str();

        let clinic = self.clinics.get_clinic(clinic_id).await.map_err(|e| {
            warn!("Clinic {} unavailable for prescription {}: {}", clinic_id, prescription.id, e);
        });
        let doctor = self.doctors.get_doctor(clinic_id, &prescription.doctor_id).await.map_err(|e| {
            warn!("Doctor {} unavailable for prescription {}: {}", prescription.doctor_id, prescription.id, e);
        });
        let patient = self.patients.get_patient(clinic_id, &prescription.patient_id).await.map_err(|e| {
            warn!("Patient {} unavailable for prescription {}: {}", prescription.patient_id, prescription.id, e);
        });

        let (clinic_name, clinic_address, clinic_phone) = match clinic {
            Ok(c) => (c.name, c.address, c.phone),
            Err(()) => Default::default(),
        };
        let (doctor_name, doctor_specialty) = match doctor {
            Ok(d) => (d.name, d.specialty),
            Err(()) => Default::default(),
        };
        let (patient_name, patient_age, patient_gender) = match patient {
            Ok(p) => (p.name, p.age, p.gender),
            Err(()) => Default::default(),
        };

        Ok(PublicPrescription {
            id: prescription.id,
            clinic_name,
            clinic_address,
            clinic_phone,
            doctor_name,
            doctor_specialty,
            patient_name,
            patient_age,
            patient_gender,
            diagnosis: prescription.diagnosis,
            medicines: prescription.medicines.into_iter().map(Into::into).collect(),
            advice: prescription.advice,
            follow_up_date: prescription.follow_up_date,
            created_at: prescription.created_at,
        })
    }

    /// Newest first.
    pub async fn list_for_patient(&self, clinic_id: &str, patient_id: &str) -> Result<Vec<Prescription>, AppointmentError> {
        let rows = self.store
            .find(
                tables::PRESCRIPTIONS,
                &Query::new()
                    .eq("clinic_id", clinic_id)
                    .eq("patient_id", patient_id)
                    .order_by("created_at", false),
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(serde_json::from_value::<Prescription>)
            .collect::<Result<Vec<_>, _>>()?)
    }
}
