use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, put},
    Router,
};

use shared_config::AppConfig;
use shared_database::Store;
use shared_utils::extractor::{auth_middleware, clinic_scope_middleware};

use crate::handlers;
use crate::services::DoctorService;

pub fn doctor_routes(config: Arc<AppConfig>, store: Arc<dyn Store>) -> Router {
    let service = Arc::new(DoctorService::new(store.clone()));

    Router::new()
        .route("/", get(handlers::list_doctors).post(handlers::create_doctor))
        .route(
            "/{doctor_id}",
            get(handlers::get_doctor)
                .put(handlers::update_doctor)
                .delete(handlers::deactivate_doctor),
        )
        .route("/{doctor_id}/status", put(handlers::set_doctor_status))
        .layer(middleware::from_fn_with_state(store, clinic_scope_middleware))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(service)
}
