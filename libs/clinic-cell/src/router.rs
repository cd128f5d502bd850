use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_database::Store;
use shared_utils::extractor::{auth_middleware, clinic_scope_middleware};

use crate::handlers;
use crate::services::ClinicService;

pub fn clinic_routes(config: Arc<AppConfig>, store: Arc<dyn Store>, service: Arc<ClinicService>) -> Router {
    // Registration happens before the caller has a clinic to scope to.
    let registration = Router::new()
        .route("/", post(handlers::register_clinic))
        .layer(middleware::from_fn_with_state(config.clone(), auth_middleware));

    let scoped = Router::new()
        .route("/me", get(handlers::get_my_clinic).put(handlers::update_my_clinic))
        .layer(middleware::from_fn_with_state(store, clinic_scope_middleware))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new()
        .merge(registration)
        .merge(scoped)
        .with_state(service)
}

pub fn public_clinic_routes(service: Arc<ClinicService>) -> Router {
    Router::new()
        .route("/", get(handlers::list_public_clinics))
        .route("/{slug}", get(handlers::get_public_clinic))
        .with_state(service)
}
