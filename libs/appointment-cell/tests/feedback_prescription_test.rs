mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use serde_json::json;

use appointment_cell::models::{
    Appointment, AppointmentError, AppointmentStatus, CreatePrescriptionRequest, FeedbackRequest,
    Medicine,
};
use common::{setup, setup_with, Harness, StubAnalytics};
use queue_cell::DomainEvent;

async fn completed(h: &Harness, phone: &str, time: &str) -> Appointment {
    let appointment = h.booked(phone, time).await;
    h.move_through(&appointment.id, &["in-queue", "in-consultation", "completed"]).await
}

fn feedback(score: serde_json::Value, text: &str) -> FeedbackRequest {
    FeedbackRequest { score, text: Some(text.to_string()) }
}

#[tokio::test]
async fn feedback_needs_a_completed_visit() {
    let h = setup().await;
    let appointment = h.booked("9000000001", "10:00").await;

    assert_matches!(
        h.state.feedback.record_feedback(&appointment.id, feedback(json!(5), "Great")).await,
        Err(AppointmentError::InvalidState(_))
    );
    assert_matches!(
        h.state.feedback.record_feedback("missing", feedback(json!(5), "Great")).await,
        Err(AppointmentError::NotFound("Appointment"))
    );
}

#[tokio::test]
async fn feedback_is_analysed_and_written_once() {
    let h = setup_with(Arc::new(StubAnalytics {
        sentiment: "POSITIVE".to_string(),
        keywords: vec!["friendly".to_string(), "quick".to_string()],
        fail: false,
    }))
    .await;
    let appointment = completed(&h, "9000000001", "10:00").await;

    let outcome = h.state
        .feedback
        .record_feedback(&appointment.id, feedback(json!("5"), "Friendly and quick"))
        .await
        .unwrap();
    assert_eq!(outcome.score, 5);
    assert_eq!(outcome.sentiment, "positive");
    assert_eq!(outcome.keywords, vec!["friendly", "quick"]);

    let stored = h.reload(&appointment.id).await;
    assert_eq!(stored.feedback_score, Some(5));
    assert_eq!(stored.feedback_sentiment.as_deref(), Some("positive"));
    assert_eq!(stored.feedback_keywords.as_deref(), Some("friendly,quick"));

    assert_matches!(
        h.state.feedback.record_feedback(&appointment.id, feedback(json!(1), "Changed my mind")).await,
        Err(AppointmentError::Conflict(_))
    );
    let unchanged = h.reload(&appointment.id).await;
    assert_eq!(unchanged.feedback_score, Some(5));
    assert_eq!(unchanged.feedback_text.as_deref(), Some("Friendly and quick"));

    h.events.flush().await;
    assert!(h.recorder.names().await.contains(&"feedback_received"));
}

#[tokio::test]
async fn invalid_scores_store_nothing() {
    let h = setup().await;
    let appointment = completed(&h, "9000000001", "10:00").await;

    for score in [json!(0), json!(6), json!("five"), json!(3.5), serde_json::Value::Null] {
        assert_matches!(
            h.state.feedback.record_feedback(&appointment.id, feedback(score, "ok")).await,
            Err(AppointmentError::ValidationError(_))
        );
    }
    assert_eq!(h.reload(&appointment.id).await.feedback_score, None);
}

#[tokio::test]
async fn analytics_failure_falls_back_to_neutral() {
    let h = setup_with(Arc::new(StubAnalytics {
        sentiment: "positive".to_string(),
        keywords: vec!["ignored".to_string()],
        fail: true,
    }))
    .await;
    let appointment = completed(&h, "9000000001", "10:00").await;

    let outcome = h.state
        .feedback
        .record_feedback(&appointment.id, feedback(json!(3), "It was fine"))
        .await
        .unwrap();

    assert_eq!(outcome.sentiment, "neutral");
    assert!(outcome.keywords.is_empty());
    assert_eq!(h.reload(&appointment.id).await.feedback_score, Some(3));
}

fn prescription_for(appointment_id: &str) -> CreatePrescriptionRequest {
    CreatePrescriptionRequest {
        appointment_id: appointment_id.to_string(),
        diagnosis: "Acute pharyngitis".to_string(),
        medicines: vec![Medicine {
            name: "Amoxicillin 500mg".to_string(),
            dosage: "1 tablet".to_string(),
            morning: true,
            night: true,
            when: Some("after_meal".to_string()),
            duration: Some("5 days".to_string()),
            ..Default::default()
        }],
        advice: Some("Warm fluids".to_string()),
        follow_up_date: Some("2024-03-09".to_string()),
    }
}

#[tokio::test]
async fn prescribing_completes_the_consultation() {
    let h = setup().await;
    let appointment = h.booked("9000000001", "10:00").await;
    h.move_through(&appointment.id, &["in-queue", "in-consultation"]).await;

    let prescription = h.state
        .prescriptions
        .create_prescription(h.clinic_id(), prescription_for(&appointment.id))
        .await
        .unwrap();

    assert_eq!(prescription.appointment_id, appointment.id);
    assert_eq!(prescription.patient_id, appointment.patient_id);
    assert_eq!(prescription.medicines[0].schedule(), "1-0-1");
    assert_eq!(prescription.follow_up_date.map(|d| d.to_string()).as_deref(), Some("2024-03-09"));
    assert_eq!(h.reload(&appointment.id).await.status, AppointmentStatus::Completed);

    let fetched = h.state.prescriptions.get_prescription(h.clinic_id(), &prescription.id).await.unwrap();
    assert_eq!(fetched.diagnosis, "Acute pharyngitis");

    let listed = h.state
        .prescriptions
        .list_for_patient(h.clinic_id(), &appointment.patient_id)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);

    assert_matches!(
        h.state.prescriptions.create_prescription(h.clinic_id(), prescription_for(&appointment.id)).await,
        Err(AppointmentError::Conflict(_))
    );

    h.events.flush().await;
    let events = h.recorder.events.lock().await;
    assert_matches!(
        events.last(),
        Some(DomainEvent::PrescriptionIssued { patient_email: Some(email), .. })
            if email == "9000000001@example.com"
    );
    assert!(events.iter().any(|e| matches!(
        e,
        DomainEvent::StatusChanged { new_status, .. } if new_status == "completed"
    )));
}

#[tokio::test]
async fn prescription_requires_an_open_consultation() {
    let h = setup().await;
    let appointment = h.booked("9000000001", "10:00").await;

    assert_matches!(
        h.state.prescriptions.create_prescription(h.clinic_id(), prescription_for(&appointment.id)).await,
        Err(AppointmentError::InvalidTransition { from: AppointmentStatus::Booked, .. })
    );
    assert!(h.state
        .prescriptions
        .list_for_patient(h.clinic_id(), &appointment.patient_id)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(h.reload(&appointment.id).await.status, AppointmentStatus::Booked);
}

#[tokio::test]
async fn prescription_input_is_validated() {
    let h = setup().await;
    let appointment = h.booked("9000000001", "10:00").await;
    h.move_through(&appointment.id, &["in-queue", "in-consultation"]).await;

    let no_diagnosis = CreatePrescriptionRequest { diagnosis: "  ".to_string(), ..prescription_for(&appointment.id) };
    assert_matches!(
        h.state.prescriptions.create_prescription(h.clinic_id(), no_diagnosis).await,
        Err(AppointmentError::ValidationError(_))
    );

    let bad_follow_up = CreatePrescriptionRequest {
        follow_up_date: Some("next week".to_string()),
        ..prescription_for(&appointment.id)
    };
    assert_matches!(
        h.state.prescriptions.create_prescription(h.clinic_id(), bad_follow_up).await,
        Err(AppointmentError::ValidationError(_))
    );

    assert_matches!(
        h.state.prescriptions.create_prescription("other-clinic", prescription_for(&appointment.id)).await,
        Err(AppointmentError::NotFound("Appointment"))
    );
    assert_matches!(
        h.state.prescriptions.get_prescription(h.clinic_id(), "missing").await,
        Err(AppointmentError::NotFound("Prescription"))
    );

    assert_eq!(h.reload(&appointment.id).await.status, AppointmentStatus::InConsultation);
}
