// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_database::Store;
use shared_utils::extractor::{auth_middleware, clinic_scope_middleware};

use crate::handlers;
use crate::services::AppointmentState;

/// Staff routes resolve the caller's clinic before any handler runs.
fn scoped(router: Router<Arc<AppointmentState>>, config: Arc<AppConfig>, store: Arc<dyn Store>) -> Router<Arc<AppointmentState>> {
    router
        .layer(middleware::from_fn_with_state(store, clinic_scope_middleware))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
}

pub fn appointment_routes(config: Arc<AppConfig>, store: Arc<dyn Store>, state: Arc<AppointmentState>) -> Router {
    let protected_routes = Router::new()
        .route("/", get(handlers::list_appointments).post(handlers::book_appointment))
        .route("/queue", get(handlers::get_queue))
        .route("/no-show-sweep", post(handlers::sweep_no_shows))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/status", put(handlers::update_status));

    scoped(protected_routes, config, store).with_state(state)
}

pub fn dashboard_routes(config: Arc<AppConfig>, store: Arc<dyn Store>, state: Arc<AppointmentState>) -> Router {
    let protected_routes = Router::new()
        .route("/stats", get(handlers::get_dashboard_stats));

    scoped(protected_routes, config, store).with_state(state)
}

pub fn prescription_routes(config: Arc<AppConfig>, store: Arc<dyn Store>, state: Arc<AppointmentState>) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::create_prescription))
        .route("/{prescription_id}", get(handlers::get_prescription))
        .route("/patient/{patient_id}", get(handlers::list_patient_prescriptions));

    scoped(protected_routes, config, store).with_state(state)
}

/// Self-service booking, queue display, history and feedback. No authentication.
pub fn public_appointment_routes(state: Arc<AppointmentState>) -> Router {
    Router::new()
        .route("/book", post(handlers::public_book))
        .route("/my-appointments", post(handlers::public_my_appointments))
        .route("/queue/{slug}", get(handlers::public_queue))
        .route("/queue/{slug}/live", get(handlers::public_queue_live))
        .route("/prescription/{prescription_id}", get(handlers::public_prescription))
        .route("/feedback/{appointment_id}", post(handlers::public_feedback))
        .with_state(state)
}
