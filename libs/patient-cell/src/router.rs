use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use shared_config::AppConfig;
use shared_database::Store;
use shared_utils::extractor::{auth_middleware, clinic_scope_middleware};

use crate::handlers::*;
use crate::services::PatientService;

/// The service is shared with the public booking flow so both paths use the
/// same per-phone locks.
pub fn create_patient_router(
    config: Arc<AppConfig>,
    store: Arc<dyn Store>,
    service: Arc<PatientService>,
) -> Router {
    Router::new()
        .route("/", get(list_patients).post(create_patient))
        .route("/search", get(search_patients))
        .route("/{id}", get(get_patient).put(update_patient))
        .layer(middleware::from_fn_with_state(store, clinic_scope_middleware))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(service)
}
