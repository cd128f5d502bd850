use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Facts emitted after an appointment write has committed. Delivery to
/// caches, displays and patients happens afterwards and never feeds back
/// into the write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    AppointmentBooked {
        clinic_id: String,
        appointment_id: String,
        appointment_date: NaiveDate,
        appointment_time: String,
        token_number: String,
        doctor_name: String,
        patient_name: String,
        patient_email: Option<String>,
        patient_phone: Option<String>,
    },
    StatusChanged {
        clinic_id: String,
        appointment_id: String,
        appointment_date: NaiveDate,
        token_number: String,
        old_status: String,
        new_status: String,
    },
    FeedbackReceived {
        clinic_id: String,
        appointment_id: String,
        score: u8,
        sentiment: String,
    },
    PrescriptionIssued {
        clinic_id: String,
        appointment_id: String,
        prescription_id: String,
        patient_name: String,
        patient_email: Option<String>,
        patient_phone: Option<String>,
        diagnosis: String,
    },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::AppointmentBooked { .. } => "booked",
            DomainEvent::StatusChanged { .. } => "status_changed",
            DomainEvent::FeedbackReceived { .. } => "feedback_received",
            DomainEvent::PrescriptionIssued { .. } => "prescription_issued",
        }
    }

    pub fn clinic_id(&self) -> &str {
        match self {
            DomainEvent::AppointmentBooked { clinic_id, .. }
            | DomainEvent::StatusChanged { clinic_id, .. }
            | DomainEvent::FeedbackReceived { clinic_id, .. }
            | DomainEvent::PrescriptionIssued { clinic_id, .. } => clinic_id,
        }
    }

    pub fn appointment_id(&self) -> &str {
        match self {
            DomainEvent::AppointmentBooked { appointment_id, .. }
            | DomainEvent::StatusChanged { appointment_id, .. }
            | DomainEvent::FeedbackReceived { appointment_id, .. }
            | DomainEvent::PrescriptionIssued { appointment_id, .. } => appointment_id,
        }
    }

    /// The queue day whose projection this event invalidates, if any.
    pub fn queue_date(&self) -> Option<NaiveDate> {
        match self {
            DomainEvent::AppointmentBooked { appointment_date, .. }
            | DomainEvent::StatusChanged { appointment_date, .. } => Some(*appointment_date),
            _ => None,
        }
    }

    pub fn payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

pub fn queue_topic(clinic_id: &str) -> String {
    format!("queue_{}", clinic_id)
}

pub fn appointments_topic(clinic_id: &str) -> String {
    format!("appointments_{}", clinic_id)
}
