use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::services::{EventBus, Notifier, PostCommitHook};
use crate::{appointments_topic, queue_topic, DomainEvent, QueueError};

/// Sends booking confirmations and prescription notices to patients.
pub struct NotificationHook {
    notifier: Arc<dyn Notifier>,
}

impl NotificationHook {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl PostCommitHook for NotificationHook {
    fn name(&self) -> &'static str {
        "notification"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), QueueError> {
        let (kind, reachable) = match event {
            DomainEvent::AppointmentBooked { patient_email, patient_phone, .. } => {
                ("booking_confirmation", has_contact(patient_email, patient_phone))
            }
            DomainEvent::PrescriptionIssued { patient_email, patient_phone, .. } => {
                ("prescription_issued", has_contact(patient_email, patient_phone))
            }
            _ => return Ok(()),
        };

        if !reachable {
            debug!("No contact details for appointment {}; skipping {}", event.appointment_id(), kind);
            return Ok(());
        }

        if self.notifier.notify(kind, &event.payload()).await {
            Ok(())
        } else {
            Err(QueueError::HookFailed {
                hook: self.name(),
                message: format!("{} was not accepted", kind),
            })
        }
    }
}

fn has_contact(email: &Option<String>, phone: &Option<String>) -> bool {
    [email, phone]
        .iter()
        .any(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()))
}

/// Pushes every event to the clinic's appointment topic, and queue
/// movements to its queue topic.
pub struct SignalHook {
    bus: Arc<dyn EventBus>,
}

impl SignalHook {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl PostCommitHook for SignalHook {
    fn name(&self) -> &'static str {
        "signal"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), QueueError> {
        let clinic_id = event.clinic_id();

        if let DomainEvent::StatusChanged { appointment_id, token_number, old_status, new_status, .. } = event {
            self.bus
                .publish(&queue_topic(clinic_id), json!({
                    "appointment_id": appointment_id,
                    "token_number": token_number,
                    "old_status": old_status,
                    "new_status": new_status,
                }))
                .await?;
        }

        self.bus.publish(&appointments_topic(clinic_id), event.payload()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::BroadcastEventBus;
    use assert_matches::assert_matches;
    use chrono::NaiveDate;
    use serde_json::Value;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for Recording {
        async fn notify(&self, event: &str, _payload: &Value) -> bool {
            self.sent.lock().await.push(event.to_string());
            true
        }
    }

    fn booked(email: Option<&str>) -> DomainEvent {
        DomainEvent::AppointmentBooked {
            clinic_id: "c1".to_string(),
            appointment_id: "a1".to_string(),
            appointment_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            appointment_time: "10:30".to_string(),
            token_number: "AS-001".to_string(),
            doctor_name: "Alok Shukla".to_string(),
            patient_name: "Riya Sen".to_string(),
            patient_email: email.map(str::to_string),
            patient_phone: None,
        }
    }

    #[tokio::test]
    async fn confirmation_only_sent_with_contact_details() {
        let notifier = Arc::new(Recording::default());
        let hook = NotificationHook::new(notifier.clone());

        hook.handle(&booked(None)).await.unwrap();
        hook.handle(&booked(Some("riya@example.com"))).await.unwrap();

        assert_eq!(*notifier.sent.lock().await, vec!["booking_confirmation"]);
    }

    struct Refusing;

    #[async_trait]
    impl Notifier for Refusing {
        async fn notify(&self, _event: &str, _payload: &Value) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn rejected_notification_fails_the_hook() {
        let hook = NotificationHook::new(Arc::new(Refusing));

        assert_matches!(
            hook.handle(&booked(Some("riya@example.com"))).await,
            Err(QueueError::HookFailed { hook: "notification", .. })
        );
    }

    #[tokio::test]
    async fn status_changes_reach_queue_and_appointment_topics() {
        let bus = Arc::new(BroadcastEventBus::new(8));
        let mut queue = bus.subscribe("queue_c1").await;
        let mut appointments = bus.subscribe("appointments_c1").await;
        let hook = SignalHook::new(bus.clone());

        hook.handle(&DomainEvent::StatusChanged {
            clinic_id: "c1".to_string(),
            appointment_id: "a1".to_string(),
            appointment_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            token_number: "AS-001".to_string(),
            old_status: "booked".to_string(),
            new_status: "in-queue".to_string(),
        })
        .await
        .unwrap();

        let q: Value = serde_json::from_str(&queue.recv().await.unwrap()).unwrap();
        assert_eq!(q["old_status"], "booked");
        assert_eq!(q["new_status"], "in-queue");

        let a: Value = serde_json::from_str(&appointments.recv().await.unwrap()).unwrap();
        assert_eq!(a["event"], "status_changed");
    }
}
