use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};
use tracing::{info, warn};

use appointment_cell::router::{
    appointment_routes, dashboard_routes, prescription_routes, public_appointment_routes,
};
use appointment_cell::services::{
    AppointmentDeps, AppointmentState, LocalTokenSequence, NeutralTextAnalytics, QueueCacheHook,
    QueueProjector, RedisTokenSequence, TokenSequence,
};
use clinic_cell::router::{clinic_routes, public_clinic_routes};
use clinic_cell::ClinicService;
use doctor_cell::router::doctor_routes;
use doctor_cell::DoctorService;
use patient_cell::router::create_patient_router;
use patient_cell::PatientService;
use queue_cell::{
    create_redis_pool, BroadcastEventBus, EventDispatcher, LogNotifier, MemoryQueueCache,
    NotificationHook, PostCommitHook, QueueCache, RedisQueueCache, SignalHook,
};
use shared_config::AppConfig;
use shared_database::{MemoryStore, RestStore, Store};
use shared_utils::clock::{ClinicClock, Clock};

/// Picks the hosted backend when configured, otherwise keeps everything in memory.
fn create_store(config: &AppConfig) -> Arc<dyn Store> {
    if config.is_configured() {
        info!("Using REST backend at {}", config.supabase_url);
        Arc::new(RestStore::new(config))
    } else {
        warn!("Using in-memory store; data is lost on restart");
        Arc::new(MemoryStore::new())
    }
}

/// Redis backs the queue cache and token counters when reachable.
async fn create_counters(
    config: &AppConfig,
    clock: Arc<dyn Clock>,
) -> (Arc<dyn QueueCache>, Arc<dyn TokenSequence>) {
    if let Some(url) = config.redis_url.as_deref() {
        match create_redis_pool(url).await {
            Ok(pool) => {
                info!("Redis connected, queue cache and token counters are shared");
                let cache: Arc<dyn QueueCache> = Arc::new(RedisQueueCache::from_pool(pool.clone()));
                let sequence: Arc<dyn TokenSequence> = Arc::new(RedisTokenSequence::new(pool));
                return (cache, sequence);
            }
            Err(e) => warn!("Redis unavailable ({}), falling back to in-process counters", e),
        }
    }

    let cache: Arc<dyn QueueCache> = Arc::new(MemoryQueueCache::new());
    let sequence: Arc<dyn TokenSequence> = Arc::new(LocalTokenSequence::new(clock));
    (cache, sequence)
}

pub async fn create_router(config: Arc<AppConfig>) -> Router {
    let store = create_store(&config);
    let clock: Arc<dyn Clock> = Arc::new(ClinicClock::from_config(&config));
    let (cache, sequence) = create_counters(&config, clock.clone()).await;

    let clinics = Arc::new(ClinicService::new(store.clone()));
    let doctors = Arc::new(DoctorService::new(store.clone()));
    let patients = Arc::new(PatientService::new(store.clone()));

    let projector = Arc::new(QueueProjector::new(store.clone()));
    let bus = Arc::new(BroadcastEventBus::new(config.event_channel_capacity));
    let hooks: Vec<Arc<dyn PostCommitHook>> = vec![
        Arc::new(QueueCacheHook::new(projector.clone(), cache.clone())),
        Arc::new(NotificationHook::new(Arc::new(LogNotifier))),
        Arc::new(SignalHook::new(bus.clone())),
    ];
    let (events, _dispatcher) = EventDispatcher::start(hooks);

    let appointments = Arc::new(AppointmentState::new(AppointmentDeps {
        store: store.clone(),
        clock,
        clinics: clinics.clone(),
        doctors,
        patients: patients.clone(),
        events,
        projector,
        cache,
        bus,
        sequence,
        analytics: Arc::new(NeutralTextAnalytics),
    }));

    let public_routes = Router::new()
        .nest("/clinics", public_clinic_routes(clinics.clone()))
        .merge(public_appointment_routes(appointments.clone()));

    Router::new()
        .route("/", get(|| async { "CareDesk API is running!" }))
        .nest("/clinics", clinic_routes(config.clone(), store.clone(), clinics))
        .nest("/doctors", doctor_routes(config.clone(), store.clone()))
        .nest("/patients", create_patient_router(config.clone(), store.clone(), patients))
        .nest("/appointments", appointment_routes(config.clone(), store.clone(), appointments.clone()))
        .nest("/dashboard", dashboard_routes(config.clone(), store.clone(), appointments.clone()))
        .nest("/prescriptions", prescription_routes(config, store, appointments))
        .nest("/public", public_routes)
}
