// libs/appointment-cell/src/handlers.rs
use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{self, Stream, StreamExt};
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use shared_models::auth::ClinicScope;
use shared_models::error::AppError;

use crate::models::{
    parse_date_or, BookAppointmentRequest, CreatePrescriptionRequest, DateQuery, FeedbackRequest,
    MyAppointmentsRequest, NoShowSweepRequest, PublicBookingRequest, UpdateStatusRequest,
};
use crate::services::AppointmentState;

// ==============================================================================
// STAFF APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppointmentState>>,
    Extension(scope): Extension<ClinicScope>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let appointment = state.booking.book(&scope.clinic_id, request).await?;

    Ok((StatusCode::CREATED, Json(json!({
        "appointment_id": appointment.id,
        "token_number": appointment.token_number,
        "status": appointment.status,
        "appointment_date": appointment.appointment_date,
        "appointment_time": appointment.time_label(),
        "appointment": appointment
    }))))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<AppointmentState>>,
    Extension(scope): Extension<ClinicScope>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Value>, AppError> {
    let date = parse_date_or(query.date.as_deref(), state.clock.today())?;
    let appointments = state.booking.list_appointments(&scope.clinic_id, date).await?;

    Ok(Json(json!({
        "date": date,
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppointmentState>>,
    Extension(scope): Extension<ClinicScope>,
    Path(appointment_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.lifecycle.get_appointment(&scope.clinic_id, &appointment_id).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_status(
    State(state): State<Arc<AppointmentState>>,
    Extension(scope): Extension<ClinicScope>,
    Path(appointment_id): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.lifecycle
        .transition(&scope.clinic_id, &appointment_id, &request.status)
        .await?;

    Ok(Json(json!({
        "appointment_id": appointment.id,
        "status": appointment.status,
        "token_number": appointment.token_number
    })))
}

#[axum::debug_handler]
pub async fn get_queue(
    State(state): State<Arc<AppointmentState>>,
    Extension(scope): Extension<ClinicScope>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Value>, AppError> {
    let date = parse_date_or(query.date.as_deref(), state.clock.today())?;
    let snapshot = state.queue.get_queue(&scope.clinic_id, Some(date)).await?;

    Ok(Json(json!(snapshot)))
}

#[axum::debug_handler]
pub async fn sweep_no_shows(
    State(state): State<Arc<AppointmentState>>,
    Extension(scope): Extension<ClinicScope>,
    Query(query): Query<DateQuery>,
    request: Option<Json<NoShowSweepRequest>>,
) -> Result<Json<Value>, AppError> {
    // The body's date wins over `?date=`; neither means today.
    let requested = request.and_then(|Json(body)| body.date).or(query.date);
    let date = parse_date_or(requested.as_deref(), state.clock.today())?;
    let swept = state.lifecycle.sweep_no_shows(Some(&scope.clinic_id), date).await?;

    Ok(Json(json!({
        "date": date,
        "marked_no_show": swept
    })))
}

// ==============================================================================
// DASHBOARD & PRESCRIPTIONS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_dashboard_stats(
    State(state): State<Arc<AppointmentState>>,
    Extension(scope): Extension<ClinicScope>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Value>, AppError> {
    let date = parse_date_or(query.date.as_deref(), state.clock.today())?;
    let stats = state.dashboard.get_stats(&scope.clinic_id, date).await?;

    Ok(Json(json!(stats)))
}

#[axum::debug_handler]
pub async fn create_prescription(
    State(state): State<Arc<AppointmentState>>,
    Extension(scope): Extension<ClinicScope>,
    Json(request): Json<CreatePrescriptionRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let prescription = state.prescriptions.create_prescription(&scope.clinic_id, request).await?;

    Ok((StatusCode::CREATED, Json(json!(prescription))))
}

#[axum::debug_handler]
pub async fn get_prescription(
    State(state): State<Arc<AppointmentState>>,
    Extension(scope): Extension<ClinicScope>,
    Path(prescription_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let prescription = state.prescriptions.get_prescription(&scope.clinic_id, &prescription_id).await?;

    Ok(Json(json!(prescription)))
}

#[axum::debug_handler]
pub async fn list_patient_prescriptions(
    State(state): State<Arc<AppointmentState>>,
    Extension(scope): Extension<ClinicScope>,
    Path(patient_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let prescriptions = state.prescriptions.list_for_patient(&scope.clinic_id, &patient_id).await?;

    Ok(Json(json!({
        "prescriptions": prescriptions,
        "total": prescriptions.len()
    })))
}

// ==============================================================================
// PUBLIC HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn public_book(
    State(state): State<Arc<AppointmentState>>,
    Json(request): Json<PublicBookingRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let (appointment, clinic) = state.booking.book_public(request).await?;

    Ok((StatusCode::CREATED, Json(json!({
        "appointment_id": appointment.id,
        "token_number": appointment.token_number,
        "status": appointment.status,
        "clinic_name": clinic.name,
        "appointment_date": appointment.appointment_date,
        "appointment_time": appointment.time_label()
    }))))
}

#[axum::debug_handler]
pub async fn public_queue(
    State(state): State<Arc<AppointmentState>>,
    Path(slug): Path<String>,
) -> Result<Json<Value>, AppError> {
    let (clinic, snapshot) = state.queue.get_public_queue(&slug).await?;

    Ok(Json(json!({
        "clinic_name": clinic.name,
        "date": snapshot.date,
        "now_serving": snapshot.now_serving,
        "waiting": snapshot.waiting,
        "total_waiting": snapshot.total_waiting
    })))
}

#[axum::debug_handler]
pub async fn public_feedback(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<String>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<Value>, AppError> {
    let outcome = state.feedback.record_feedback(&appointment_id, request).await?;

    Ok(Json(json!(outcome)))
}

/// Today's queue as a server-sent event stream: a `snapshot` event first,
/// then one `queue` event per status change.
#[axum::debug_handler]
pub async fn public_queue_live(
    State(state): State<Arc<AppointmentState>>,
    Path(slug): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let (clinic, snapshot, receiver) = state.queue.watch_public_queue(&slug).await?;

    let first = Event::default().event("snapshot").data(
        json!({
            "clinic_name": clinic.name,
            "date": snapshot.date,
            "now_serving": snapshot.now_serving,
            "waiting": snapshot.waiting,
            "total_waiting": snapshot.total_waiting
        })
        .to_string(),
    );

    let updates = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(message) => return Some((Event::default().event("queue").data(message), receiver)),
                Err(RecvError::Lagged(skipped)) => warn!("Queue display fell behind, skipped {} updates", skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    });

    let events = stream::once(async move { first }).chain(updates).map(Ok::<_, Infallible>);
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

#[axum::debug_handler]
pub async fn public_my_appointments(
    State(state): State<Arc<AppointmentState>>,
    Json(request): Json<MyAppointmentsRequest>,
) -> Result<Json<Value>, AppError> {
    let appointments = state.booking.my_appointments(&request.phone).await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn public_prescription(
    State(state): State<Arc<AppointmentState>>,
    Path(prescription_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let prescription = state.prescriptions.public_prescription(&prescription_id).await?;

    Ok(Json(json!(prescription)))
}
