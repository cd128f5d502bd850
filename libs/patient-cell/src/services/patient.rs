use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, info};

use shared_database::{tables, Query, Store};
use shared_utils::locks::KeyedLocks;

use crate::models::{CreatePatientRequest, Patient, PatientError, UpdatePatientRequest};

/// Patient registry. Phone numbers are unique within a clinic; every write
/// that can introduce a phone holds the `(clinic, phone)` lock across the
/// existence check and the insert.
pub struct PatientService {
    store: Arc<dyn Store>,
    phone_locks: KeyedLocks,
}

impl PatientService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            phone_locks: KeyedLocks::new(),
        }
    }

    pub async fn create_patient(
        &self,
        clinic_id: &str,
        request: CreatePatientRequest,
    ) -> Result<Patient, PatientError> {
        let name = request.name.trim().to_string();
        let phone = request.phone.trim().to_string();
        if name.is_empty() || phone.is_empty() {
            return Err(PatientError::ValidationError(
                "Patient name and phone are required".to_string(),
            ));
        }

        let _guard = self.phone_locks.lock(&phone_key(clinic_id, &phone)).await;

        if self.find_by_phone(clinic_id, &phone).await?.is_some() {
            return Err(PatientError::PhoneAlreadyExists { phone });
        }

        self.insert(clinic_id, CreatePatientRequest { name, phone, ..request }).await
    }

    /// Self-service booking path: reuse the clinic's patient with this phone
    /// or register a new one. Returns the patient and whether it was created.
    pub async fn find_or_create_by_phone(
        &self,
        clinic_id: &str,
        request: CreatePatientRequest,
    ) -> Result<(Patient, bool), PatientError> {
        let name = request.name.trim().to_string();
        let phone = request.phone.trim().to_string();
        if name.is_empty() || phone.is_empty() {
            return Err(PatientError::ValidationError(
                "Patient name and phone are required".to_string(),
            ));
        }

        let _guard = self.phone_locks.lock(&phone_key(clinic_id, &phone)).await;

        if let Some(existing) = self.find_by_phone(clinic_id, &phone).await? {
            debug!("Reusing patient {} for phone in clinic {}", existing.id, clinic_id);
            return Ok((existing, false));
        }

        let patient = self.insert(clinic_id, CreatePatientRequest { name, phone, ..request }).await?;
        Ok((patient, true))
    }

    pub async fn get_patient(&self, clinic_id: &str, patient_id: &str) -> Result<Patient, PatientError> {
        let row = self.store
            .find_one(tables::PATIENTS, &Query::new().eq("id", patient_id).eq("clinic_id", clinic_id))
            .await?
            .ok_or(PatientError::NotFound)?;

        Ok(serde_json::from_value(row)?)
    }

    /// Newest registrations first.
    pub async fn list_patients(&self, clinic_id: &str) -> Result<Vec<Patient>, PatientError> {
        let rows = self.store
            .find(tables::PATIENTS, &Query::new().eq("clinic_id", clinic_id).order_by("created_at", false))
            .await?;

        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(PatientError::from))
            .collect()
    }

    pub async fn search_patients(&self, clinic_id: &str, needle: &str) -> Result<Vec<Patient>, PatientError> {
        let rows = self.store
            .find(tables::PATIENTS, &Query::new().eq("clinic_id", clinic_id).order_by("name", true))
            .await?;

        let mut patients = Vec::new();
        for row in rows {
            let patient: Patient = serde_json::from_value(row)?;
            if patient.matches(needle) {
                patients.push(patient);
            }
        }
        Ok(patients)
    }

    pub async fn update_patient(
        &self,
        clinic_id: &str,
        patient_id: &str,
        request: UpdatePatientRequest,
    ) -> Result<Patient, PatientError> {
        let current = self.get_patient(clinic_id, patient_id).await?;
        let mut fields = Map::new();

        if let Some(name) = request.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(PatientError::ValidationError("Patient name cannot be empty".to_string()));
            }
            fields.insert("name".to_string(), json!(name));
        }
        if let Some(email) = request.email {
            fields.insert("email".to_string(), json!(email));
        }
        if let Some(age) = request.age {
            fields.insert("age".to_string(), json!(age));
        }
        if let Some(gender) = request.gender {
            fields.insert("gender".to_string(), json!(gender));
        }
        if let Some(blood_group) = request.blood_group {
            fields.insert("blood_group".to_string(), json!(blood_group));
        }
        if let Some(history) = request.medical_history {
            fields.insert("medical_history".to_string(), json!(history));
        }

        let new_phone = request
            .phone
            .map(|p| p.trim().to_string())
            .filter(|p| *p != current.phone);

        let Some(phone) = new_phone else {
            if fields.is_empty() {
                return Ok(current);
            }
            return self.write(clinic_id, patient_id, Value::Object(fields)).await;
        };

        if phone.is_empty() {
            return Err(PatientError::ValidationError("Phone cannot be empty".to_string()));
        }

        let _guard = self.phone_locks.lock(&phone_key(clinic_id, &phone)).await;
        if self.find_by_phone(clinic_id, &phone).await?.is_some() {
            return Err(PatientError::PhoneAlreadyExists { phone });
        }
        fields.insert("phone".to_string(), json!(phone));
        self.write(clinic_id, patient_id, Value::Object(fields)).await
    }

    async fn find_by_phone(&self, clinic_id: &str, phone: &str) -> Result<Option<Patient>, PatientError> {
        let row = self.store
            .find_one(tables::PATIENTS, &Query::new().eq("clinic_id", clinic_id).eq("phone", phone))
            .await?;

        row.map(serde_json::from_value).transpose().map_err(PatientError::from)
    }

    async fn insert(&self, clinic_id: &str, request: CreatePatientRequest) -> Result<Patient, PatientError> {
        let row = self.store.insert(tables::PATIENTS, json!({
            "clinic_id": clinic_id,
            "name": request.name,
            "phone": request.phone,
            "email": request.email,
            "age": request.age,
            "gender": request.gender,
            "blood_group": request.blood_group,
            "medical_history": request.medical_history,
        })).await?;

        let patient: Patient = serde_json::from_value(row)?;
        info!("Registered patient {} in clinic {}", patient.id, clinic_id);
        Ok(patient)
    }

    async fn write(&self, clinic_id: &str, patient_id: &str, fields: Value) -> Result<Patient, PatientError> {
        let row = self.store
            .update_where(tables::PATIENTS, patient_id, &Query::new().eq("clinic_id", clinic_id), fields)
            .await?
            .ok_or(PatientError::NotFound)?;

        Ok(serde_json::from_value(row)?)
    }
}

fn phone_key(clinic_id: &str, phone: &str) -> String {
    format!("{}:{}", clinic_id, phone)
}
