// libs/appointment-cell/src/services/queue.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{debug, warn};

use clinic_cell::{Clinic, ClinicService};
use queue_cell::{
    queue_topic, BroadcastEventBus, DomainEvent, EventReceiver, PostCommitHook, QueueCache, QueueError,
};
use shared_database::{tables, Query, Store};
use shared_utils::clock::Clock;

use crate::models::{Appointment, AppointmentError, AppointmentStatus, QueueEntry, QueueSnapshot};
use crate::services::directory;
use crate::services::token::token_number;

/// Derives the live queue from stored appointments. Pure read; the same
/// stored state always yields the same snapshot.
pub struct QueueProjector {
    store: Arc<dyn Store>,
}

impl QueueProjector {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn project(&self, clinic_id: &str, date: NaiveDate) -> Result<QueueSnapshot, AppointmentError> {
        let rows = self.store
            .find(
                tables::APPOINTMENTS,
                &Query::new()
                    .eq("clinic_id", clinic_id)
                    .eq("appointment_date", date.to_string())
                    .in_list(
                        "status",
                        [AppointmentStatus::InQueue.as_str(), AppointmentStatus::InConsultation.as_str()],
                    ),
            )
            .await?;

        let mut appointments = rows
            .into_iter()
            .map(serde_json::from_value::<Appointment>)
            .collect::<Result<Vec<_>, _>>()?;
        appointments.sort_by(|a, b| {
            token_number(&a.token_number)
                .cmp(&token_number(&b.token_number))
                .then_with(|| a.token_number.cmp(&b.token_number))
                .then_with(|| a.id.cmp(&b.id))
        });

        let doctors = directory::doctor_names(self.store.as_ref(), clinic_id).await?;
        let patients = directory::patient_contacts(
            self.store.as_ref(),
            clinic_id,
            appointments.iter().map(|a| a.patient_id.as_str()),
        )
        .await?;

        let mut now_serving = Vec::new();
        let mut waiting = Vec::new();
        for appointment in appointments {
            let waiting_entry = appointment.status == AppointmentStatus::InQueue;
            let entry = QueueEntry {
                doctor_name: directory::name_or_unknown(&doctors, &appointment.doctor_id),
                patient_name: patients
                    .get(&appointment.patient_id)
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| directory::UNKNOWN.to_string()),
                appointment_time: waiting_entry.then(|| appointment.time_label()),
                id: appointment.id,
                token_number: appointment.token_number,
                status: appointment.status,
            };
            if waiting_entry {
                waiting.push(entry);
            } else {
                now_serving.push(entry);
            }
        }

        Ok(QueueSnapshot {
            date,
            total_waiting: waiting.len(),
            now_serving,
            waiting,
        })
    }
}

/// Queue reads for staff (always live) and for public displays (cached
/// snapshot, refreshed after every queue change).
pub struct QueueService {
    projector: Arc<QueueProjector>,
    cache: Arc<dyn QueueCache>,
    bus: Arc<BroadcastEventBus>,
    clinics: Arc<ClinicService>,
    clock: Arc<dyn Clock>,
}

impl QueueService {
    pub fn new(
        projector: Arc<QueueProjector>,
        cache: Arc<dyn QueueCache>,
        bus: Arc<BroadcastEventBus>,
        clinics: Arc<ClinicService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { projector, cache, bus, clinics, clock }
    }

    pub async fn get_queue(&self, clinic_id: &str, date: Option<NaiveDate>) -> Result<QueueSnapshot, AppointmentError> {
        let date = date.unwrap_or_else(|| self.clock.today());
        self.projector.project(clinic_id, date).await
    }

    /// Today's queue for a clinic's public display page.
    pub async fn get_public_queue(&self, slug: &str) -> Result<(Clinic, QueueSnapshot), AppointmentError> {
        let clinic = self.clinics.get_by_slug(slug).await?;
        let date = self.clock.today();

        match self.cache.get(&clinic.id, date).await {
            Ok(Some(cached)) => match serde_json::from_value::<QueueSnapshot>(cached) {
                Ok(snapshot) => return Ok((clinic, snapshot)),
                Err(e) => warn!("Discarding unreadable queue snapshot for {}: {}", clinic.id, e),
            },
            Ok(None) => debug!("No cached queue for clinic {} on {}", clinic.id, date),
            Err(e) => warn!("Queue cache read failed for clinic {}: {}", clinic.id, e),
        }

        // Only fill an empty slot. A hook may have cached a newer
        // projection while this one was being read.
        let snapshot = self.projector.project(&clinic.id, date).await?;
        match serde_json::to_value(&snapshot) {
            Ok(value) => match self.cache.put_if_absent(&clinic.id, date, &value).await {
                Ok(true) => debug!("Cached queue for clinic {} on {}", clinic.id, date),
                Ok(false) => debug!("Queue for clinic {} refreshed meanwhile, not overwriting", clinic.id),
                Err(e) => warn!("Queue cache write failed for clinic {}: {}", clinic.id, e),
            },
            Err(e) => warn!("Could not serialise queue snapshot: {}", e),
        }
        Ok((clinic, snapshot))
    }

    /// Subscribes to a clinic's queue changes, then reads today's queue so
    /// no change between the two is missed.
    pub async fn watch_public_queue(
        &self,
        slug: &str,
    ) -> Result<(Clinic, QueueSnapshot, EventReceiver), AppointmentError> {
        let clinic = self.clinics.get_by_slug(slug).await?;
        let receiver = self.bus.subscribe(&queue_topic(&clinic.id)).await;
        let snapshot = self.projector.project(&clinic.id, self.clock.today()).await?;
        Ok((clinic, snapshot, receiver))
    }
}

/// Re-projects the affected day into the cache after each queue change.
pub struct QueueCacheHook {
    projector: Arc<QueueProjector>,
    cache: Arc<dyn QueueCache>,
}

impl QueueCacheHook {
    pub fn new(projector: Arc<QueueProjector>, cache: Arc<dyn QueueCache>) -> Self {
        Self { projector, cache }
    }
}

#[async_trait]
impl PostCommitHook for QueueCacheHook {
    fn name(&self) -> &'static str {
        "queue_cache"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), QueueError> {
        let Some(date) = event.queue_date() else {
            return Ok(());
        };

        let snapshot = self.projector
            .project(event.clinic_id(), date)
            .await
            .map_err(|e| QueueError::HookFailed { hook: "queue_cache", message: e.to_string() })?;

        self.cache
            .put(event.clinic_id(), date, &serde_json::to_value(&snapshot)?)
            .await
    }
}
