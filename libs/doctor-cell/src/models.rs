use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use shared_models::error::AppError;
use shared_models::time_format;

pub const DEFAULT_AVAILABLE_FROM: &str = "09:00";
pub const DEFAULT_AVAILABLE_TO: &str = "17:00";
pub const DEFAULT_CONSULTATION_FEE: f64 = 500.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: String,
    pub clinic_id: String,
    pub name: String,
    pub specialty: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, with = "time_format::option")]
    pub available_from: Option<NaiveTime>,
    #[serde(default, with = "time_format::option")]
    pub available_to: Option<NaiveTime>,
    #[serde(default)]
    pub consultation_fee: f64,
    #[serde(default)]
    pub status: DoctorStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Doctor {
    pub fn is_active(&self) -> bool {
        self.status == DoctorStatus::Active
    }

    /// Whether `time` falls inside the working hours, boundaries included.
    /// A doctor without both bounds set accepts any time.
    pub fn works_at(&self, time: NaiveTime) -> bool {
        match (self.available_from, self.available_to) {
            (Some(from), Some(to)) => from <= time && time <= to,
            _ => true,
        }
    }

    pub fn hours_label(&self) -> String {
        match (self.available_from, self.available_to) {
            (Some(from), Some(to)) => format!(
                "{} - {}",
                time_format::format_hhmm(&from),
                time_format::format_hhmm(&to)
            ),
            _ => "any time".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DoctorStatus {
    #[default]
    Active,
    Inactive,
}

impl DoctorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DoctorStatus::Active => "active",
            DoctorStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for DoctorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DoctorStatus {
    type Err = DoctorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "active" => Ok(DoctorStatus::Active),
            "inactive" => Ok(DoctorStatus::Inactive),
            other => Err(DoctorError::ValidationError(format!(
                "Invalid doctor status '{}'. Use active or inactive", other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDoctorRequest {
    pub name: String,
    pub specialty: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub available_from: Option<String>,
    pub available_to: Option<String>,
    pub consultation_fee: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateDoctorRequest {
    pub name: Option<String>,
    pub specialty: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub available_from: Option<String>,
    pub available_to: Option<String>,
    pub consultation_fee: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetDoctorStatusRequest {
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DoctorListQuery {
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DoctorError {
    #[error("Doctor not found")]
    NotFound,

    #[error("{0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<anyhow::Error> for DoctorError {
    fn from(e: anyhow::Error) -> Self {
        DoctorError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for DoctorError {
    fn from(e: serde_json::Error) -> Self {
        DoctorError::DatabaseError(format!("Malformed doctor row: {}", e))
    }
}

impl From<DoctorError> for AppError {
    fn from(e: DoctorError) -> Self {
        match e {
            DoctorError::NotFound => AppError::NotFound("Doctor not found".to_string()),
            DoctorError::ValidationError(msg) => AppError::ValidationError(msg),
            DoctorError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
