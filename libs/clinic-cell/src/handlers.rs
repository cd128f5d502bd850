use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use shared_models::auth::{ClinicScope, User};
use shared_models::error::AppError;

use crate::models::{RegisterClinicRequest, UpdateClinicRequest};
use crate::services::ClinicService;

#[axum::debug_handler]
pub async fn register_clinic(
    State(service): State<Arc<ClinicService>>,
    Extension(user): Extension<User>,
    Json(request): Json<RegisterClinicRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let clinic = service.register_clinic(&user.id, request).await?;

    Ok((StatusCode::CREATED, Json(json!(clinic))))
}

#[axum::debug_handler]
pub async fn get_my_clinic(
    State(service): State<Arc<ClinicService>>,
    Extension(scope): Extension<ClinicScope>,
) -> Result<Json<Value>, AppError> {
    let clinic = service.get_clinic(&scope.clinic_id).await?;

    Ok(Json(json!(clinic)))
}

#[axum::debug_handler]
pub async fn update_my_clinic(
    State(service): State<Arc<ClinicService>>,
    Extension(scope): Extension<ClinicScope>,
    Json(request): Json<UpdateClinicRequest>,
) -> Result<Json<Value>, AppError> {
    let clinic = service.update_clinic(&scope.clinic_id, request).await?;

    Ok(Json(json!(clinic)))
}

// ==============================================================================
// PUBLIC HANDLERS (NO AUTHENTICATION REQUIRED)
// ==============================================================================

#[axum::debug_handler]
pub async fn list_public_clinics(
    State(service): State<Arc<ClinicService>>,
) -> Result<Json<Value>, AppError> {
    let clinics = service.list_public().await?;

    Ok(Json(json!({
        "clinics": clinics,
        "total": clinics.len()
    })))
}

#[axum::debug_handler]
pub async fn get_public_clinic(
    State(service): State<Arc<ClinicService>>,
    Path(slug): Path<String>,
) -> Result<Json<Value>, AppError> {
    let (clinic, doctors) = service.public_profile(&slug).await?;

    let doctors: Vec<Value> = doctors
        .iter()
        .map(|d| json!({
            "id": d.id,
            "name": d.name,
            "specialty": d.specialty,
            "available_from": d.available_from.map(|t| t.format("%H:%M").to_string()),
            "available_to": d.available_to.map(|t| t.format("%H:%M").to_string()),
            "consultation_fee": d.consultation_fee,
        }))
        .collect();

    Ok(Json(json!({
        "clinic": clinic,
        "doctors": doctors
    })))
}
