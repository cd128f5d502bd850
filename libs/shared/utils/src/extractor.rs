use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use serde_json::Value;
use tracing::{debug, error};

use shared_config::AppConfig;
use shared_database::{tables, Query, Store};
use shared_models::auth::{ClinicScope, User};
use shared_models::error::AppError;

use crate::jwt::validate_token;

/// Validates the bearer token and stores the caller as a `User` extension.
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_value = request
        .headers()
        .get("Authorization")
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    let token = auth_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Auth("Invalid authorization header format".to_string()))?;

    let user = validate_token(token, &config.supabase_jwt_secret)
        .map_err(|e| AppError::Auth(e.to_string()))?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Resolves the authenticated user to the clinic they own and stores it as a
/// `ClinicScope` extension. Must run inside `auth_middleware`.
pub async fn clinic_scope_middleware(
    State(store): State<Arc<dyn Store>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let user = extract_user(&request)?;

    let clinic = store
        .find_one(tables::CLINICS, &Query::new().eq("owner_user_id", user.id.as_str()))
        .await
        .map_err(|e| {
            error!("Clinic lookup failed for user {}: {}", user.id, e);
            AppError::Database(e.to_string())
        })?
        .ok_or_else(|| AppError::Forbidden("No clinic is registered for this account".to_string()))?;

    let clinic_id = clinic
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::Internal("Clinic row has no id".to_string()))?
        .to_string();

    debug!("Request scoped to clinic {}", clinic_id);
    request.extensions_mut().insert(ClinicScope {
        clinic_id,
        user_id: user.id,
    });

    Ok(next.run(request).await)
}

pub fn extract_user<B>(request: &Request<B>) -> Result<User, AppError> {
    request
        .extensions()
        .get::<User>()
        .cloned()
        .ok_or_else(|| AppError::Auth("User not found in request extensions".to_string()))
}
