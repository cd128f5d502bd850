// libs/appointment-cell/src/models.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use clinic_cell::ClinicError;
use doctor_cell::DoctorError;
use patient_cell::PatientError;
use shared_models::error::AppError;
use shared_models::time_format;

// ==============================================================================
// APPOINTMENT STATUS
// ==============================================================================

/// Persisted status values. The literal strings are read by clients.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentStatus {
    Booked,
    InQueue,
    InConsultation,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 6] = [
        AppointmentStatus::Booked,
        AppointmentStatus::InQueue,
        AppointmentStatus::InConsultation,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::NoShow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Booked => "booked",
            AppointmentStatus::InQueue => "in-queue",
            AppointmentStatus::InConsultation => "in-consultation",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no-show",
        }
    }

    /// Statuses reachable in one step.
    pub fn allowed_transitions(&self) -> &'static [AppointmentStatus] {
        match self {
            AppointmentStatus::Booked => &[
                AppointmentStatus::InQueue,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::InQueue => &[
                AppointmentStatus::InConsultation,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::InConsultation => &[AppointmentStatus::Completed],
            // Terminal states
            AppointmentStatus::Completed
            | AppointmentStatus::Cancelled
            | AppointmentStatus::NoShow => &[],
        }
    }

    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = AppointmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        AppointmentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| {
                AppointmentError::ValidationError(format!(
                    "Invalid status '{}'. Valid statuses: {}",
                    wanted,
                    format_statuses(&AppointmentStatus::ALL)
                ))
            })
    }
}

/// `["in-queue","cancelled"]`, the form clients display.
pub fn format_statuses(statuses: &[AppointmentStatus]) -> String {
    let names: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
    serde_json::to_string(&names).unwrap_or_default()
}

// ==============================================================================
// ENTITIES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub clinic_id: String,
    pub doctor_id: String,
    pub patient_id: String,
    pub appointment_date: NaiveDate,
    #[serde(with = "time_format")]
    pub appointment_time: NaiveTime,
    pub status: AppointmentStatus,
    pub token_number: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub feedback_score: Option<u8>,
    #[serde(default)]
    pub feedback_text: Option<String>,
    #[serde(default)]
    pub feedback_sentiment: Option<String>,
    /// Comma separated.
    #[serde(default)]
    pub feedback_keywords: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Appointment {
    pub fn has_feedback(&self) -> bool {
        self.feedback_score.is_some()
    }

    pub fn time_label(&self) -> String {
        time_format::format_hhmm(&self.appointment_time)
    }
}

/// An appointment with the display names the front desk needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentView {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub doctor_name: String,
    pub patient_name: String,
    #[serde(default)]
    pub patient_phone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Medicine {
    pub name: String,
    #[serde(default)]
    pub dosage: String,
    #[serde(default)]
    pub morning: bool,
    #[serde(default)]
    pub afternoon: bool,
    #[serde(default)]
    pub night: bool,
    /// `before_meal` or `after_meal`.
    #[serde(default)]
    pub when: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Medicine {
    /// Morning-afternoon-night pattern such as `1-0-1`.
    pub fn schedule(&self) -> String {
        let flag = |b: bool| if b { "1" } else { "0" };
        format!("{}-{}-{}", flag(self.morning), flag(self.afternoon), flag(self.night))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prescription {
    pub id: String,
    pub clinic_id: String,
    pub appointment_id: String,
    pub doctor_id: String,
    pub patient_id: String,
    pub diagnosis: String,
    #[serde(default)]
    pub medicines: Vec<Medicine>,
    #[serde(default)]
    pub advice: Option<String>,
    #[serde(default)]
    pub follow_up_date: Option<NaiveDate>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A medicine line as printed for the patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MedicineLine {
    #[serde(flatten)]
    pub medicine: Medicine,
    pub schedule: String,
}

impl From<Medicine> for MedicineLine {
    fn from(medicine: Medicine) -> Self {
        Self { schedule: medicine.schedule(), medicine }
    }
}

/// The patient's copy of a prescription, with clinic, doctor and patient
/// details filled in. Missing joins are left blank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicPrescription {
    pub id: String,
    pub clinic_name: String,
    pub clinic_address: Option<String>,
    pub clinic_phone: Option<String>,
    pub doctor_name: String,
    pub doctor_specialty: String,
    pub patient_name: String,
    pub patient_age: Option<u32>,
    pub patient_gender: Option<String>,
    pub diagnosis: String,
    pub medicines: Vec<MedicineLine>,
    pub advice: Option<String>,
    pub follow_up_date: Option<NaiveDate>,
    pub created_at: Option<DateTime<Utc>>,
}

/// One row of a patient's appointment history, across clinics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientAppointment {
    pub id: String,
    pub clinic_name: String,
    pub clinic_slug: String,
    pub doctor_name: String,
    pub appointment_date: NaiveDate,
    pub appointment_time: String,
    pub status: AppointmentStatus,
    pub token_number: String,
    pub feedback_score: Option<u8>,
    pub has_prescription: bool,
    pub prescription_id: Option<String>,
}

// ==============================================================================
// QUEUE & DASHBOARD VIEWS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueEntry {
    pub id: String,
    pub token_number: String,
    pub status: AppointmentStatus,
    pub doctor_name: String,
    pub patient_name: String,
    /// Only set for waiting entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueSnapshot {
    pub date: NaiveDate,
    pub now_serving: Vec<QueueEntry>,
    pub waiting: Vec<QueueEntry>,
    pub total_waiting: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoctorPerformance {
    pub id: String,
    pub name: String,
    pub total: usize,
    pub completed: usize,
    pub in_consultation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HourCount {
    pub hour: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SentimentBreakdown {
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub day: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecentActivity {
    pub id: String,
    pub patient_name: String,
    pub doctor_name: String,
    pub status: AppointmentStatus,
    pub token_number: String,
    pub appointment_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardStats {
    pub date: NaiveDate,
    pub total_appointments_today: usize,
    pub booked: usize,
    pub in_queue: usize,
    pub in_consultation: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub no_show: usize,
    /// Percentage, 0 to 100.
    pub completion_rate: u32,
    pub total_patients: usize,
    pub total_doctors: usize,
    pub prescriptions_today: usize,
    pub avg_feedback_score: f64,
    pub total_feedback_count: usize,
    pub sentiment_breakdown: SentimentBreakdown,
    pub doctor_performance: Vec<DoctorPerformance>,
    pub peak_hours: Vec<HourCount>,
    pub recent_activity: Vec<RecentActivity>,
    pub weekly_trend: Vec<TrendPoint>,
}

// ==============================================================================
// REQUESTS
// ==============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub doctor_id: String,
    pub patient_id: String,
    /// `YYYY-MM-DD`; today when omitted.
    #[serde(default)]
    pub appointment_date: Option<String>,
    #[serde(default)]
    pub appointment_time: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublicBookingRequest {
    pub clinic_slug: String,
    pub doctor_id: String,
    pub patient_name: String,
    pub patient_phone: String,
    #[serde(default)]
    pub patient_email: Option<String>,
    #[serde(default)]
    pub appointment_date: Option<String>,
    #[serde(default)]
    pub appointment_time: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// `score` stays untyped so that a missing or non-integer score is reported
/// as a validation failure rather than a body rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedbackRequest {
    #[serde(default)]
    pub score: Value,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackOutcome {
    pub appointment_id: String,
    pub score: u8,
    pub sentiment: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreatePrescriptionRequest {
    pub appointment_id: String,
    pub diagnosis: String,
    #[serde(default)]
    pub medicines: Vec<Medicine>,
    #[serde(default)]
    pub advice: Option<String>,
    #[serde(default)]
    pub follow_up_date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MyAppointmentsRequest {
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DateQuery {
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoShowSweepRequest {
    pub date: Option<String>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    ValidationError(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Cannot change from '{from}' to '{to}'. Allowed: {}", format_statuses(.allowed))]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
        allowed: Vec<AppointmentStatus>,
    },

    #[error("{0}")]
    InvalidState(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl AppointmentError {
    pub fn invalid_transition(from: AppointmentStatus, to: AppointmentStatus) -> Self {
        AppointmentError::InvalidTransition {
            from,
            to,
            allowed: from.allowed_transitions().to_vec(),
        }
    }
}

impl From<anyhow::Error> for AppointmentError {
    fn from(e: anyhow::Error) -> Self {
        AppointmentError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for AppointmentError {
    fn from(e: serde_json::Error) -> Self {
        AppointmentError::DatabaseError(format!("Malformed row: {}", e))
    }
}

impl From<DoctorError> for AppointmentError {
    fn from(e: DoctorError) -> Self {
        match e {
            DoctorError::NotFound => AppointmentError::NotFound("Doctor"),
            DoctorError::ValidationError(msg) => AppointmentError::ValidationError(msg),
            DoctorError::DatabaseError(msg) => AppointmentError::DatabaseError(msg),
        }
    }
}

impl From<PatientError> for AppointmentError {
    fn from(e: PatientError) -> Self {
        match e {
            PatientError::NotFound => AppointmentError::NotFound("Patient"),
            PatientError::PhoneAlreadyExists { .. } => AppointmentError::Conflict(e.to_string()),
            PatientError::ValidationError(msg) => AppointmentError::ValidationError(msg),
            PatientError::DatabaseError(msg) => AppointmentError::DatabaseError(msg),
        }
    }
}

impl From<ClinicError> for AppointmentError {
    fn from(e: ClinicError) -> Self {
        match e {
            ClinicError::NotFound => AppointmentError::NotFound("Clinic"),
            ClinicError::ValidationError(msg) => AppointmentError::ValidationError(msg),
            ClinicError::DatabaseError(msg) => AppointmentError::DatabaseError(msg),
            other => AppointmentError::Conflict(other.to_string()),
        }
    }
}

impl From<AppointmentError> for AppError {
    fn from(e: AppointmentError) -> Self {
        match e {
            AppointmentError::NotFound(_) => AppError::NotFound(e.to_string()),
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::Conflict(msg) => AppError::Conflict(msg),
            AppointmentError::InvalidTransition { .. } => AppError::InvalidTransition(e.to_string()),
            AppointmentError::InvalidState(msg) => AppError::InvalidTransition(msg),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

/// `YYYY-MM-DD`, or `default` when absent or blank.
pub fn parse_date_or(raw: Option<&str>, default: NaiveDate) -> Result<NaiveDate, AppointmentError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(default),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
            AppointmentError::ValidationError(format!("Invalid date '{}'. Use YYYY-MM-DD", s))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn status_strings_are_stable() {
        let json = serde_json::to_string(&AppointmentStatus::InConsultation).unwrap();
        assert_eq!(json, "\"in-consultation\"");
        assert_eq!("no-show".parse::<AppointmentStatus>().unwrap(), AppointmentStatus::NoShow);
        assert_matches!("done".parse::<AppointmentStatus>(), Err(AppointmentError::ValidationError(_)));
    }

    #[test]
    fn transition_table() {
        use AppointmentStatus::*;

        for from in AppointmentStatus::ALL {
            for to in AppointmentStatus::ALL {
                let expected = matches!(
                    (from, to),
                    (Booked, InQueue) | (Booked, Cancelled) | (Booked, NoShow)
                        | (InQueue, InConsultation) | (InQueue, Cancelled) | (InQueue, NoShow)
                        | (InConsultation, Completed)
                );
                assert_eq!(from.can_transition_to(to), expected, "{} -> {}", from, to);
            }
        }

        for terminal in [Completed, Cancelled, NoShow] {
            assert!(terminal.allowed_transitions().is_empty(), "{}", terminal);
        }
    }

    #[test]
    fn invalid_transition_lists_allowed_statuses() {
        let err = AppointmentError::invalid_transition(AppointmentStatus::Booked, AppointmentStatus::Completed);
        assert_eq!(
            err.to_string(),
            "Cannot change from 'booked' to 'completed'. Allowed: [\"in-queue\",\"cancelled\",\"no-show\"]"
        );
    }

    #[test]
    fn medicine_schedule_pattern() {
        let medicine = Medicine { name: "Cetirizine".into(), night: true, morning: true, ..Default::default() };
        assert_eq!(medicine.schedule(), "1-0-1");

        let line = serde_json::to_value(MedicineLine::from(medicine)).unwrap();
        assert_eq!(line["name"], "Cetirizine");
        assert_eq!(line["schedule"], "1-0-1");
    }

    #[test]
    fn parses_dates_with_default() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(parse_date_or(None, today).unwrap(), today);
        assert_eq!(parse_date_or(Some(" "), today).unwrap(), today);
        assert_eq!(parse_date_or(Some("2024-03-05"), today).unwrap().to_string(), "2024-03-05");
        assert_matches!(parse_date_or(Some("05/03/2024"), today), Err(AppointmentError::ValidationError(_)));
    }
}
