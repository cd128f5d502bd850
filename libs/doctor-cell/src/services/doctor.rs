use std::sync::Arc;

use chrono::NaiveTime;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use shared_database::{tables, Query, Store};
use shared_models::time_format::{format_hhmm, parse_hhmm};

use crate::models::{
    CreateDoctorRequest, Doctor, DoctorError, DoctorStatus, UpdateDoctorRequest,
    DEFAULT_AVAILABLE_FROM, DEFAULT_AVAILABLE_TO, DEFAULT_CONSULTATION_FEE,
};

pub struct DoctorService {
    store: Arc<dyn Store>,
}

impl DoctorService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create_doctor(
        &self,
        clinic_id: &str,
        request: CreateDoctorRequest,
    ) -> Result<Doctor, DoctorError> {
        let name = request.name.trim();
        let specialty = request.specialty.trim();
        if name.is_empty() || specialty.is_empty() {
            return Err(DoctorError::ValidationError(
                "Doctor name and specialty are required".to_string(),
            ));
        }

        let from = parse_hours_field("available_from", request.available_from.as_deref(), DEFAULT_AVAILABLE_FROM)?;
        let to = parse_hours_field("available_to", request.available_to.as_deref(), DEFAULT_AVAILABLE_TO)?;
        validate_hours(from, to)?;

        let fee = request.consultation_fee.unwrap_or(DEFAULT_CONSULTATION_FEE);
        validate_fee(fee)?;

        debug!("Creating doctor {} for clinic {}", name, clinic_id);

        let row = self.store.insert(tables::DOCTORS, json!({
            "clinic_id": clinic_id,
            "name": name,
            "specialty": specialty,
            "email": request.email.unwrap_or_default(),
            "phone": request.phone.unwrap_or_default(),
            "available_from": format_hhmm(&from),
            "available_to": format_hhmm(&to),
            "consultation_fee": fee,
            "status": DoctorStatus::Active.as_str(),
        })).await?;

        let doctor: Doctor = serde_json::from_value(row)?;
        info!("Doctor {} added to clinic {}", doctor.id, clinic_id);
        Ok(doctor)
    }

    pub async fn get_doctor(&self, clinic_id: &str, doctor_id: &str) -> Result<Doctor, DoctorError> {
        let row = self.store
            .find_one(tables::DOCTORS, &Query::new().eq("id", doctor_id).eq("clinic_id", clinic_id))
            .await?
            .ok_or(DoctorError::NotFound)?;

        Ok(serde_json::from_value(row)?)
    }

    pub async fn list_doctors(&self, clinic_id: &str, active_only: bool) -> Result<Vec<Doctor>, DoctorError> {
        let mut query = Query::new().eq("clinic_id", clinic_id);
        if active_only {
            query = query.eq("status", DoctorStatus::Active.as_str());
        }

        let rows = self.store.find(tables::DOCTORS, &query.order_by("name", true)).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(DoctorError::from))
            .collect()
    }

    /// Partial update. Working hours are validated against the merged
    /// result so a single bound can be moved without resending the other.
    pub async fn update_doctor(
        &self,
        clinic_id: &str,
        doctor_id: &str,
        request: UpdateDoctorRequest,
    ) -> Result<Doctor, DoctorError> {
        let current = self.get_doctor(clinic_id, doctor_id).await?;
        let mut fields = Map::new();

        if let Some(name) = request.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(DoctorError::ValidationError("Doctor name cannot be empty".to_string()));
            }
            fields.insert("name".to_string(), json!(name));
        }
        if let Some(specialty) = request.specialty {
            let specialty = specialty.trim().to_string();
            if specialty.is_empty() {
                return Err(DoctorError::ValidationError("Specialty cannot be empty".to_string()));
            }
            fields.insert("specialty".to_string(), json!(specialty));
        }
        if let Some(email) = request.email {
            fields.insert("email".to_string(), json!(email));
        }
        if let Some(phone) = request.phone {
            fields.insert("phone".to_string(), json!(phone));
        }
        if let Some(fee) = request.consultation_fee {
            validate_fee(fee)?;
            fields.insert("consultation_fee".to_string(), json!(fee));
        }

        if request.available_from.is_some() || request.available_to.is_some() {
            let from = match request.available_from.as_deref() {
                Some(raw) => require_hhmm("available_from", raw)?,
                None => current.available_from.unwrap_or(default_time(DEFAULT_AVAILABLE_FROM)),
            };
            let to = match request.available_to.as_deref() {
                Some(raw) => require_hhmm("available_to", raw)?,
                None => current.available_to.unwrap_or(default_time(DEFAULT_AVAILABLE_TO)),
            };
            validate_hours(from, to)?;
            fields.insert("available_from".to_string(), json!(format_hhmm(&from)));
            fields.insert("available_to".to_string(), json!(format_hhmm(&to)));
        }

        if fields.is_empty() {
            return Ok(current);
        }

        self.write(clinic_id, doctor_id, Value::Object(fields)).await
    }

    /// Soft enable/disable. Inactive doctors stay listed but cannot be booked.
    pub async fn set_status(
        &self,
        clinic_id: &str,
        doctor_id: &str,
        status: DoctorStatus,
    ) -> Result<Doctor, DoctorError> {
        self.get_doctor(clinic_id, doctor_id).await?;
        info!("Setting doctor {} status to {}", doctor_id, status);
        self.write(clinic_id, doctor_id, json!({ "status": status.as_str() })).await
    }

    async fn write(&self, clinic_id: &str, doctor_id: &str, fields: Value) -> Result<Doctor, DoctorError> {
        let row = self.store
            .update_where(tables::DOCTORS, doctor_id, &Query::new().eq("clinic_id", clinic_id), fields)
            .await?
            .ok_or(DoctorError::NotFound)?;

        Ok(serde_json::from_value(row)?)
    }
}

fn default_time(raw: &str) -> NaiveTime {
    parse_hhmm(raw).unwrap_or(NaiveTime::MIN)
}

fn require_hhmm(field: &str, raw: &str) -> Result<NaiveTime, DoctorError> {
    parse_hhmm(raw).ok_or_else(|| {
        DoctorError::ValidationError(format!("{} must be a time in HH:MM format", field))
    })
}

fn parse_hours_field(field: &str, raw: Option<&str>, default: &str) -> Result<NaiveTime, DoctorError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(default_time(default)),
        Some(value) => require_hhmm(field, value),
    }
}

/// Overnight shifts are not modelled; the start must not be after the end.
pub fn validate_hours(from: NaiveTime, to: NaiveTime) -> Result<(), DoctorError> {
    if from > to {
        return Err(DoctorError::ValidationError(format!(
            "available_from ({}) must not be later than available_to ({})",
            format_hhmm(&from),
            format_hhmm(&to)
        )));
    }
    Ok(())
}

fn validate_fee(fee: f64) -> Result<(), DoctorError> {
    if !fee.is_finite() || fee < 0.0 {
        return Err(DoctorError::ValidationError(
            "consultation_fee must be a non-negative amount".to_string(),
        ));
    }
    Ok(())
}
