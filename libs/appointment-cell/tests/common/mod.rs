#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use tokio::sync::Mutex;

use appointment_cell::models::{Appointment, AppointmentError, BookAppointmentRequest};
use appointment_cell::services::{
    AppointmentDeps, AppointmentState, LocalTokenSequence, NeutralTextAnalytics, QueueCacheHook,
    QueueProjector, TextAnalytics,
};
use clinic_cell::{Clinic, ClinicService, RegisterClinicRequest};
use doctor_cell::{CreateDoctorRequest, DoctorService};
use patient_cell::{CreatePatientRequest, PatientService};
use queue_cell::{
    BroadcastEventBus, DomainEvent, EventDispatcher, MemoryQueueCache, PostCommitHook, QueueCache, QueueError,
    SignalHook,
};
use shared_database::{MemoryStore, Store};
use shared_utils::clock::Clock;
use shared_utils::test_utils::{fixed_clock, TestUser};

/// The day after the fixed clock's today.
pub const DAY: &str = "2024-03-02";

pub fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 2).unwrap()
}

#[derive(Default)]
pub struct RecordingHook {
    pub events: Mutex<Vec<DomainEvent>>,
}

impl RecordingHook {
    pub async fn names(&self) -> Vec<&'static str> {
        self.events.lock().await.iter().map(|e| e.name()).collect()
    }
}

#[async_trait]
impl PostCommitHook for RecordingHook {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), QueueError> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

/// Returns canned analysis, or fails when `fail` is set.
pub struct StubAnalytics {
    pub sentiment: String,
    pub keywords: Vec<String>,
    pub fail: bool,
}

#[async_trait]
impl TextAnalytics for StubAnalytics {
    async fn sentiment(&self, _text: &str) -> Result<String> {
        if self.fail {
            anyhow::bail!("analytics offline");
        }
        Ok(self.sentiment.clone())
    }

    async fn keywords(&self, _text: &str) -> Result<Vec<String>> {
        if self.fail {
            anyhow::bail!("analytics offline");
        }
        Ok(self.keywords.clone())
    }
}

pub struct Harness {
    pub store: Arc<dyn Store>,
    pub state: Arc<AppointmentState>,
    pub events: EventDispatcher,
    pub recorder: Arc<RecordingHook>,
    pub cache: Arc<MemoryQueueCache>,
    pub bus: Arc<BroadcastEventBus>,
    pub clinics: Arc<ClinicService>,
    pub doctors: Arc<DoctorService>,
    pub patients: Arc<PatientService>,
    pub owner: TestUser,
    pub clinic: Clinic,
    /// Dr. Alok Shukla, 09:00 to 17:00.
    pub doctor_id: String,
}

pub async fn setup() -> Harness {
    setup_with(Arc::new(NeutralTextAnalytics)).await
}

pub async fn setup_with(analytics: Arc<dyn TextAnalytics>) -> Harness {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let clock: Arc<dyn Clock> = Arc::new(fixed_clock());
    let clinics = Arc::new(ClinicService::new(store.clone()));
    let doctors = Arc::new(DoctorService::new(store.clone()));
    let patients = Arc::new(PatientService::new(store.clone()));

    let cache = Arc::new(MemoryQueueCache::new());
    let projector = Arc::new(QueueProjector::new(store.clone()));
    let recorder = Arc::new(RecordingHook::default());
    let bus = Arc::new(BroadcastEventBus::new(64));
    let hooks: Vec<Arc<dyn PostCommitHook>> = vec![
        Arc::new(QueueCacheHook::new(projector.clone(), cache.clone())),
        Arc::new(SignalHook::new(bus.clone())),
        recorder.clone(),
    ];
    let (events, _handle) = EventDispatcher::start(hooks);

    let state = Arc::new(AppointmentState::new(AppointmentDeps {
        store: store.clone(),
        clock: clock.clone(),
        clinics: clinics.clone(),
        doctors: doctors.clone(),
        patients: patients.clone(),
        events: events.clone(),
        projector,
        cache: cache.clone(),
        bus: bus.clone(),
        sequence: Arc::new(LocalTokenSequence::new(clock.clone())),
        analytics,
    }));

    let owner = TestUser::default();
    let clinic = clinics
        .register_clinic(&owner.id, RegisterClinicRequest {
            name: "Sunrise Clinic".to_string(),
            slug: Some("sunrise".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    let mut harness = Harness {
        store,
        state,
        events,
        recorder,
        cache,
        bus,
        clinics,
        doctors,
        patients,
        owner,
        clinic,
        doctor_id: String::new(),
    };
    harness.doctor_id = harness.add_doctor("Alok Shukla").await;
    harness
}

impl Harness {
    pub fn clinic_id(&self) -> &str {
        &self.clinic.id
    }

    pub async fn add_doctor(&self, name: &str) -> String {
        self.doctors
            .create_doctor(self.clinic_id(), CreateDoctorRequest {
                name: name.to_string(),
                specialty: "General Medicine".to_string(),
                email: None,
                phone: None,
                available_from: Some("09:00".to_string()),
                available_to: Some("17:00".to_string()),
                consultation_fee: None,
            })
            .await
            .unwrap()
            .id
    }

    pub async fn add_patient(&self, name: &str, phone: &str) -> String {
        self.patients
            .create_patient(self.clinic_id(), CreatePatientRequest {
                name: name.to_string(),
                phone: phone.to_string(),
                email: Some(format!("{}@example.com", phone)),
                ..Default::default()
            })
            .await
            .unwrap()
            .id
    }

    pub async fn book_with(
        &self,
        doctor_id: &str,
        patient_id: &str,
        date: &str,
        time: &str,
    ) -> Result<Appointment, AppointmentError> {
        self.state
            .booking
            .book(self.clinic_id(), BookAppointmentRequest {
                doctor_id: doctor_id.to_string(),
                patient_id: patient_id.to_string(),
                appointment_date: Some(date.to_string()),
                appointment_time: time.to_string(),
                notes: None,
            })
            .await
    }

    pub async fn book(&self, patient_id: &str, time: &str) -> Result<Appointment, AppointmentError> {
        self.book_with(&self.doctor_id, patient_id, DAY, time).await
    }

    /// Books a fresh patient with the default doctor on `DAY`.
    pub async fn booked(&self, phone: &str, time: &str) -> Appointment {
        let patient_id = self.add_patient(&format!("Patient {}", phone), phone).await;
        self.book(&patient_id, time).await.unwrap()
    }

    pub async fn move_through(&self, appointment_id: &str, statuses: &[&str]) -> Appointment {
        let mut last = None;
        for status in statuses {
            last = Some(
                self.state
                    .lifecycle
                    .transition(self.clinic_id(), appointment_id, status)
                    .await
                    .unwrap(),
            );
        }
        last.expect("at least one status")
    }

    pub async fn reload(&self, appointment_id: &str) -> Appointment {
        self.state
            .lifecycle
            .get_appointment(self.clinic_id(), appointment_id)
            .await
            .unwrap()
    }

    /// The cached queue for `DAY`, as the public display would read it.
    pub async fn cache_snapshot(&self) -> Value {
        self.cache
            .get(self.clinic_id(), day())
            .await
            .unwrap()
            .expect("queue cached")
    }
}
