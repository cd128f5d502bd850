use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use shared_models::auth::ClinicScope;
use shared_models::error::AppError;

use crate::models::{CreatePatientRequest, PatientSearchQuery, UpdatePatientRequest};
use crate::services::PatientService;

#[axum::debug_handler]
pub async fn create_patient(
    State(service): State<Arc<PatientService>>,
    Extension(scope): Extension<ClinicScope>,
    Json(request): Json<CreatePatientRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let patient = service.create_patient(&scope.clinic_id, request).await?;

    Ok((StatusCode::CREATED, Json(json!(patient))))
}

#[axum::debug_handler]
pub async fn list_patients(
    State(service): State<Arc<PatientService>>,
    Extension(scope): Extension<ClinicScope>,
) -> Result<Json<Value>, AppError> {
    let patients = service.list_patients(&scope.clinic_id).await?;

    Ok(Json(json!({
        "patients": patients,
        "total": patients.len()
    })))
}

#[axum::debug_handler]
pub async fn get_patient(
    State(service): State<Arc<PatientService>>,
    Extension(scope): Extension<ClinicScope>,
    Path(patient_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let patient = service.get_patient(&scope.clinic_id, &patient_id).await?;

    Ok(Json(json!(patient)))
}

#[axum::debug_handler]
pub async fn update_patient(
    State(service): State<Arc<PatientService>>,
    Extension(scope): Extension<ClinicScope>,
    Path(patient_id): Path<String>,
    Json(request): Json<UpdatePatientRequest>,
) -> Result<Json<Value>, AppError> {
    let patient = service.update_patient(&scope.clinic_id, &patient_id, request).await?;

    Ok(Json(json!(patient)))
}

#[axum::debug_handler]
pub async fn search_patients(
    State(service): State<Arc<PatientService>>,
    Extension(scope): Extension<ClinicScope>,
    Query(query): Query<PatientSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let patients = service.search_patients(&scope.clinic_id, &query.q).await?;

    Ok(Json(json!({
        "patients": patients,
        "total": patients.len()
    })))
}
