use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use shared_models::auth::ClinicScope;
use shared_models::error::AppError;

use crate::models::{
    CreateDoctorRequest, DoctorListQuery, DoctorStatus, SetDoctorStatusRequest, UpdateDoctorRequest,
};
use crate::services::DoctorService;

#[axum::debug_handler]
pub async fn list_doctors(
    State(service): State<Arc<DoctorService>>,
    Extension(scope): Extension<ClinicScope>,
    Query(query): Query<DoctorListQuery>,
) -> Result<Json<Value>, AppError> {
    let doctors = service.list_doctors(&scope.clinic_id, query.active_only).await?;

    Ok(Json(json!({
        "doctors": doctors,
        "total": doctors.len()
    })))
}

#[axum::debug_handler]
pub async fn create_doctor(
    State(service): State<Arc<DoctorService>>,
    Extension(scope): Extension<ClinicScope>,
    Json(request): Json<CreateDoctorRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let doctor = service.create_doctor(&scope.clinic_id, request).await?;

    Ok((StatusCode::CREATED, Json(json!(doctor))))
}

#[axum::debug_handler]
pub async fn get_doctor(
    State(service): State<Arc<DoctorService>>,
    Extension(scope): Extension<ClinicScope>,
    Path(doctor_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let doctor = service.get_doctor(&scope.clinic_id, &doctor_id).await?;

    Ok(Json(json!(doctor)))
}

#[axum::debug_handler]
pub async fn update_doctor(
    State(service): State<Arc<DoctorService>>,
    Extension(scope): Extension<ClinicScope>,
    Path(doctor_id): Path<String>,
    Json(request): Json<UpdateDoctorRequest>,
) -> Result<Json<Value>, AppError> {
    let doctor = service.update_doctor(&scope.clinic_id, &doctor_id, request).await?;

    Ok(Json(json!(doctor)))
}

#[axum::debug_handler]
pub async fn set_doctor_status(
    State(service): State<Arc<DoctorService>>,
    Extension(scope): Extension<ClinicScope>,
    Path(doctor_id): Path<String>,
    Json(request): Json<SetDoctorStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let status: DoctorStatus = request.status.parse()?;
    let doctor = service.set_status(&scope.clinic_id, &doctor_id, status).await?;

    Ok(Json(json!(doctor)))
}

/// Doctors are never hard-deleted; removal disables them.
#[axum::debug_handler]
pub async fn deactivate_doctor(
    State(service): State<Arc<DoctorService>>,
    Extension(scope): Extension<ClinicScope>,
    Path(doctor_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let doctor = service.set_status(&scope.clinic_id, &doctor_id, DoctorStatus::Inactive).await?;

    Ok(Json(json!({
        "id": doctor.id,
        "status": doctor.status,
        "message": "Doctor deactivated"
    })))
}
