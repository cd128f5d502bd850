mod common;

use assert_matches::assert_matches;
use futures::future::join;

use appointment_cell::models::{AppointmentError, AppointmentStatus};
use common::{day, setup};
use queue_cell::DomainEvent;

#[tokio::test]
async fn booked_cannot_jump_to_completed() {
    let h = setup().await;
    let appointment = h.booked("9000000001", "10:00").await;

    let err = h.state
        .lifecycle
        .transition(h.clinic_id(), &appointment.id, "completed")
        .await
        .unwrap_err();

    assert_matches!(
        &err,
        AppointmentError::InvalidTransition { from: AppointmentStatus::Booked, to: AppointmentStatus::Completed, allowed }
            if allowed == &[AppointmentStatus::InQueue, AppointmentStatus::Cancelled, AppointmentStatus::NoShow]
    );
    assert!(err.to_string().contains(r#"["in-queue","cancelled","no-show"]"#));
    assert_eq!(h.reload(&appointment.id).await.status, AppointmentStatus::Booked);
}

#[tokio::test]
async fn follows_the_queue_to_completion() {
    let h = setup().await;
    let appointment = h.booked("9000000001", "10:00").await;

    let done = h.move_through(&appointment.id, &["in-queue", "in-consultation", "completed"]).await;
    assert_eq!(done.status, AppointmentStatus::Completed);

    for next in ["booked", "in-queue", "cancelled", "no-show"] {
        assert_matches!(
            h.state.lifecycle.transition(h.clinic_id(), &appointment.id, next).await,
            Err(AppointmentError::InvalidTransition { .. })
        );
    }
    assert_eq!(h.reload(&appointment.id).await.status, AppointmentStatus::Completed);
}

#[tokio::test]
async fn cancelled_and_no_show_are_terminal() {
    let h = setup().await;
    let cancelled = h.booked("9000000001", "10:00").await;
    let missed = h.booked("9000000002", "10:30").await;

    h.move_through(&cancelled.id, &["cancelled"]).await;
    h.move_through(&missed.id, &["in-queue", "no-show"]).await;

    for id in [&cancelled.id, &missed.id] {
        assert_matches!(
            h.state.lifecycle.transition(h.clinic_id(), id, "in-queue").await,
            Err(AppointmentError::InvalidTransition { allowed, .. }) if allowed.is_empty()
        );
    }
}

#[tokio::test]
async fn unknown_status_and_foreign_appointments() {
    let h = setup().await;
    let appointment = h.booked("9000000001", "10:00").await;

    assert_matches!(
        h.state.lifecycle.transition(h.clinic_id(), &appointment.id, "waiting").await,
        Err(AppointmentError::ValidationError(_))
    );
    assert_matches!(
        h.state.lifecycle.transition("other-clinic", &appointment.id, "in-queue").await,
        Err(AppointmentError::NotFound("Appointment"))
    );
    assert_matches!(
        h.state.lifecycle.transition(h.clinic_id(), "missing", "in-queue").await,
        Err(AppointmentError::NotFound("Appointment"))
    );
}

#[tokio::test]
async fn one_consultation_per_doctor_at_a_time() {
    let h = setup().await;
    let first = h.booked("9000000001", "10:00").await;
    let second = h.booked("9000000002", "10:30").await;
    h.move_through(&first.id, &["in-queue", "in-consultation"]).await;
    h.move_through(&second.id, &["in-queue"]).await;

    assert_matches!(
        h.state.lifecycle.transition(h.clinic_id(), &second.id, "in-consultation").await,
        Err(AppointmentError::Conflict(msg)) if msg.contains("AS-001")
    );
    assert_eq!(h.reload(&second.id).await.status, AppointmentStatus::InQueue);

    h.move_through(&first.id, &["completed"]).await;
    let started = h.move_through(&second.id, &["in-consultation"]).await;
    assert_eq!(started.status, AppointmentStatus::InConsultation);
}

#[tokio::test]
async fn other_doctors_consult_independently() {
    let h = setup().await;
    let priya = h.add_doctor("Priya Nair").await;
    let first = h.booked("9000000001", "10:00").await;
    let patient = h.add_patient("Kabir Das", "9000000002").await;
    let second = h.book_with(&priya, &patient, common::DAY, "10:00").await.unwrap();

    h.move_through(&first.id, &["in-queue", "in-consultation"]).await;
    let started = h.move_through(&second.id, &["in-queue", "in-consultation"]).await;
    assert_eq!(started.status, AppointmentStatus::InConsultation);
}

#[tokio::test]
async fn concurrent_consultation_starts_admit_one() {
    let h = setup().await;
    let first = h.booked("9000000001", "10:00").await;
    let second = h.booked("9000000002", "10:30").await;
    h.move_through(&first.id, &["in-queue"]).await;
    h.move_through(&second.id, &["in-queue"]).await;

    let (a, b) = join(
        h.state.lifecycle.transition(h.clinic_id(), &first.id, "in-consultation"),
        h.state.lifecycle.transition(h.clinic_id(), &second.id, "in-consultation"),
    )
    .await;

    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(r, Err(AppointmentError::Conflict(_)))));

    let statuses = [h.reload(&first.id).await.status, h.reload(&second.id).await.status];
    assert_eq!(
        statuses.iter().filter(|s| **s == AppointmentStatus::InConsultation).count(),
        1
    );
}

#[tokio::test]
async fn racing_writes_to_one_appointment_apply_once() {
    let h = setup().await;
    let appointment = h.booked("9000000001", "10:00").await;

    let (a, b) = join(
        h.state.lifecycle.transition(h.clinic_id(), &appointment.id, "cancelled"),
        h.state.lifecycle.transition(h.clinic_id(), &appointment.id, "cancelled"),
    )
    .await;

    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert_matches!(
            result,
            Err(AppointmentError::Conflict(_)) | Err(AppointmentError::InvalidTransition { .. })
        );
    }

    assert_eq!(h.reload(&appointment.id).await.status, AppointmentStatus::Cancelled);
}

#[tokio::test]
async fn transitions_are_announced_and_refresh_the_queue_cache() {
    let h = setup().await;
    let appointment = h.booked("9000000001", "10:00").await;
    h.move_through(&appointment.id, &["in-queue"]).await;

    h.events.flush().await;

    let events = h.recorder.events.lock().await;
    assert_matches!(
        events.last(),
        Some(DomainEvent::StatusChanged { old_status, new_status, .. })
            if old_status == "booked" && new_status == "in-queue"
    );

    let cached = h.cache_snapshot().await;
    assert_eq!(cached["total_waiting"], 1);
    assert_eq!(cached["waiting"][0]["token_number"], "AS-001");
}

#[tokio::test]
async fn no_show_sweep_closes_the_day() {
    let h = setup().await;
    let booked = h.booked("9000000001", "10:00").await;
    let queued = h.booked("9000000002", "10:30").await;
    let consulting = h.booked("9000000003", "11:00").await;
    let done = h.booked("9000000004", "11:30").await;
    h.move_through(&queued.id, &["in-queue"]).await;
    h.move_through(&done.id, &["in-queue", "in-consultation", "completed"]).await;
    h.move_through(&consulting.id, &["in-queue", "in-consultation"]).await;

    let swept = h.state.lifecycle.sweep_no_shows(Some(h.clinic_id()), day()).await.unwrap();
    assert_eq!(swept, 2);

    assert_eq!(h.reload(&booked.id).await.status, AppointmentStatus::NoShow);
    assert_eq!(h.reload(&queued.id).await.status, AppointmentStatus::NoShow);
    assert_eq!(h.reload(&consulting.id).await.status, AppointmentStatus::InConsultation);
    assert_eq!(h.reload(&done.id).await.status, AppointmentStatus::Completed);

    assert_eq!(h.state.lifecycle.sweep_no_shows(Some(h.clinic_id()), day()).await.unwrap(), 0);
}
