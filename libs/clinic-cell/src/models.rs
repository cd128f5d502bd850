use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shared_models::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clinic {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub owner_user_id: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// What anonymous visitors may see of a clinic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicClinic {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub logo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctor_count: Option<usize>,
}

impl From<&Clinic> for PublicClinic {
    fn from(clinic: &Clinic) -> Self {
        Self {
            id: clinic.id.clone(),
            name: clinic.name.clone(),
            slug: clinic.slug.clone(),
            address: clinic.address.clone(),
            phone: clinic.phone.clone(),
            email: clinic.email.clone(),
            logo_url: clinic.logo_url.clone(),
            doctor_count: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterClinicRequest {
    pub name: String,
    /// Derived from `name` when omitted.
    pub slug: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateClinicRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub logo_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ClinicError {
    #[error("Clinic not found")]
    NotFound,

    #[error("You already have a registered clinic")]
    AlreadyRegistered,

    #[error("The slug '{slug}' is already taken")]
    SlugTaken { slug: String },

    #[error("{0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<anyhow::Error> for ClinicError {
    fn from(e: anyhow::Error) -> Self {
        ClinicError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for ClinicError {
    fn from(e: serde_json::Error) -> Self {
        ClinicError::DatabaseError(format!("Malformed clinic row: {}", e))
    }
}

impl From<ClinicError> for AppError {
    fn from(e: ClinicError) -> Self {
        match e {
            ClinicError::NotFound => AppError::NotFound("Clinic not found".to_string()),
            ClinicError::AlreadyRegistered | ClinicError::SlugTaken { .. } => AppError::Conflict(e.to_string()),
            ClinicError::ValidationError(msg) => AppError::ValidationError(msg),
            ClinicError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
