pub mod availability;
pub mod booking;
pub mod dashboard;
pub mod directory;
pub mod feedback;
pub mod lifecycle;
pub mod prescription;
pub mod queue;
pub mod token;

use std::sync::Arc;

use clinic_cell::ClinicService;
use doctor_cell::DoctorService;
use patient_cell::PatientService;
use queue_cell::{BroadcastEventBus, EventDispatcher, QueueCache};
use shared_database::Store;
use shared_utils::clock::Clock;
use shared_utils::locks::KeyedLocks;

pub use availability::AvailabilityValidator;
pub use booking::AppointmentBookingService;
pub use dashboard::DashboardService;
pub use feedback::{FeedbackService, NeutralTextAnalytics, TextAnalytics};
pub use lifecycle::AppointmentLifecycleService;
pub use prescription::PrescriptionService;
pub use queue::{QueueCacheHook, QueueProjector, QueueService};
pub use token::{LocalTokenSequence, RedisTokenSequence, TokenGenerator, TokenSequence};

/// Collaborators the appointment services are built from.
pub struct AppointmentDeps {
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub clinics: Arc<ClinicService>,
    pub doctors: Arc<DoctorService>,
    pub patients: Arc<PatientService>,
    pub events: EventDispatcher,
    pub projector: Arc<QueueProjector>,
    pub cache: Arc<dyn QueueCache>,
    /// Live queue updates for public displays.
    pub bus: Arc<BroadcastEventBus>,
    pub sequence: Arc<dyn TokenSequence>,
    pub analytics: Arc<dyn TextAnalytics>,
}

/// Handler state for every appointment route.
pub struct AppointmentState {
    pub booking: AppointmentBookingService,
    pub lifecycle: Arc<AppointmentLifecycleService>,
    pub queue: QueueService,
    pub dashboard: DashboardService,
    pub feedback: FeedbackService,
    pub prescriptions: PrescriptionService,
    pub clock: Arc<dyn Clock>,
}

impl AppointmentState {
    pub fn new(deps: AppointmentDeps) -> Self {
        // Booking and consultation start share one lock table.
        let locks = Arc::new(KeyedLocks::new());

        let lifecycle = Arc::new(AppointmentLifecycleService::new(
            deps.store.clone(),
            locks.clone(),
            deps.events.clone(),
        ));

        let booking = AppointmentBookingService::new(
            deps.store.clone(),
            deps.clinics.clone(),
            deps.patients.clone(),
            AvailabilityValidator::new(deps.store.clone(), deps.doctors.clone(), deps.clock.clone()),
            TokenGenerator::new(deps.store.clone(), deps.sequence),
            deps.clock.clone(),
            locks,
            deps.events.clone(),
        );

        Self {
            booking,
            queue: QueueService::new(deps.projector, deps.cache, deps.bus, deps.clinics.clone(), deps.clock.clone()),
            dashboard: DashboardService::new(deps.store.clone()),
            feedback: FeedbackService::new(deps.store.clone(), deps.analytics, deps.events.clone()),
            prescriptions: PrescriptionService::new(
                deps.store,
                lifecycle.clone(),
                deps.clinics.clone(),
                deps.doctors,
                deps.patients,
                deps.events,
            ),
            lifecycle,
            clock: deps.clock,
        }
    }
}
