use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use doctor_cell::{Doctor, DoctorService};
use shared_database::{tables, Query, Store};

use crate::models::{Clinic, ClinicError, PublicClinic, RegisterClinicRequest, UpdateClinicRequest};

/// Tenant registry. Slugs are globally unique and each user owns at most one
/// clinic; registrations are serialised so both checks hold.
pub struct ClinicService {
    store: Arc<dyn Store>,
    registration: Mutex<()>,
}

impl ClinicService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            registration: Mutex::new(()),
        }
    }

    pub async fn register_clinic(
        &self,
        owner_user_id: &str,
        request: RegisterClinicRequest,
    ) -> Result<Clinic, ClinicError> {
        let name = request.name.trim().to_string();
        let slug = normalize_slug(request.slug.as_deref().unwrap_or(&name));
        if name.is_empty() || slug.is_empty() {
            return Err(ClinicError::ValidationError(
                "Clinic name and slug are required".to_string(),
            ));
        }

        let _guard = self.registration.lock().await;

        if self.get_clinic_for_owner(owner_user_id).await?.is_some() {
            return Err(ClinicError::AlreadyRegistered);
        }
        if self.store.find_one(tables::CLINICS, &Query::new().eq("slug", slug.as_str())).await?.is_some() {
            return Err(ClinicError::SlugTaken { slug });
        }

        let row = self.store.insert(tables::CLINICS, json!({
            "name": name,
            "slug": slug,
            "owner_user_id": owner_user_id,
            "address": request.address.unwrap_or_default(),
            "phone": request.phone.unwrap_or_default(),
            "email": request.email.unwrap_or_default(),
            "logo_url": "",
        })).await?;

        let clinic: Clinic = serde_json::from_value(row)?;
        info!("Registered clinic {} ({}) for user {}", clinic.id, clinic.slug, owner_user_id);
        Ok(clinic)
    }

    pub async fn get_clinic_for_owner(&self, owner_user_id: &str) -> Result<Option<Clinic>, ClinicError> {
        let row = self.store
            .find_one(tables::CLINICS, &Query::new().eq("owner_user_id", owner_user_id))
            .await?;
        Ok(row.map(serde_json::from_value).transpose()?)
    }

    pub async fn get_clinic(&self, clinic_id: &str) -> Result<Clinic, ClinicError> {
        let row = self.store
            .find_one(tables::CLINICS, &Query::new().eq("id", clinic_id))
            .await?
            .ok_or(ClinicError::NotFound)?;
        Ok(serde_json::from_value(row)?)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Clinic, ClinicError> {
        let slug = normalize_slug(slug);
        let row = self.store
            .find_one(tables::CLINICS, &Query::new().eq("slug", slug.as_str()))
            .await?
            .ok_or(ClinicError::NotFound)?;
        Ok(serde_json::from_value(row)?)
    }

    /// The slug is the clinic's public address and is not editable.
    pub async fn update_clinic(
        &self,
        clinic_id: &str,
        request: UpdateClinicRequest,
    ) -> Result<Clinic, ClinicError> {
        let mut fields = Map::new();
        if let Some(name) = request.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ClinicError::ValidationError("Clinic name cannot be empty".to_string()));
            }
            fields.insert("name".to_string(), json!(name));
        }
        for (key, value) in [
            ("address", request.address),
            ("phone", request.phone),
            ("email", request.email),
            ("logo_url", request.logo_url),
        ] {
            if let Some(value) = value {
                fields.insert(key.to_string(), json!(value));
            }
        }

        if fields.is_empty() {
            return self.get_clinic(clinic_id).await;
        }

        debug!("Updating clinic {}: {:?}", clinic_id, fields.keys().collect::<Vec<_>>());
        let row = self.store
            .update(tables::CLINICS, clinic_id, Value::Object(fields))
            .await?
            .ok_or(ClinicError::NotFound)?;
        Ok(serde_json::from_value(row)?)
    }

    /// Directory of every clinic with its number of active doctors.
    pub async fn list_public(&self) -> Result<Vec<PublicClinic>, ClinicError> {
        let clinics = self.store
            .find(tables::CLINICS, &Query::new().order_by("name", true))
            .await?;
        let doctors = self.store
            .find(tables::DOCTORS, &Query::new().eq("status", "active"))
            .await?;

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for doctor in &doctors {
            if let Some(clinic_id) = doctor.get("clinic_id").and_then(Value::as_str) {
                *counts.entry(clinic_id).or_default() += 1;
            }
        }

        clinics
            .into_iter()
            .map(|row| {
                let clinic: Clinic = serde_json::from_value(row)?;
                let mut public = PublicClinic::from(&clinic);
                public.doctor_count = Some(counts.get(clinic.id.as_str()).copied().unwrap_or(0));
                Ok(public)
            })
            .collect()
    }

    /// Public booking page: the clinic and its bookable doctors.
    pub async fn public_profile(&self, slug: &str) -> Result<(PublicClinic, Vec<Doctor>), ClinicError> {
        let clinic = self.get_by_slug(slug).await?;
        let doctors = DoctorService::new(self.store.clone())
            .list_doctors(&clinic.id, true)
            .await
            .map_err(|e| ClinicError::DatabaseError(e.to_string()))?;

        let mut public = PublicClinic::from(&clinic);
        public.doctor_count = Some(doctors.len());
        Ok((public, doctors))
    }
}

/// Lowercase, hyphen-separated `[a-z0-9-]` form of a clinic name or slug.
pub fn normalize_slug(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    for c in raw.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if (c.is_whitespace() || c == '-' || c == '_') && !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}
