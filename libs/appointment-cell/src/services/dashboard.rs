// libs/appointment-cell/src/services/dashboard.rs
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Timelike};
use tracing::warn;

use shared_database::{tables, Query, Store};

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, DashboardStats, DoctorPerformance, HourCount,
    RecentActivity, SentimentBreakdown, TrendPoint,
};
use crate::services::directory;

const RECENT_ACTIVITY_LIMIT: usize = 8;
const TREND_DAYS: i64 = 7;

pub struct DashboardService {
    store: Arc<dyn Store>,
}

impl DashboardService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn get_stats(&self, clinic_id: &str, date: NaiveDate) -> Result<DashboardStats, AppointmentError> {
        let appointments = self.appointments_on(clinic_id, date).await?;
        let doctor_names = directory::doctor_names(self.store.as_ref(), clinic_id).await?;

        let total_doctors = self.store
            .count(tables::DOCTORS, &Query::new().eq("clinic_id", clinic_id).eq("status", "active"))
            .await?;
        let total_patients = self.store
            .count(tables::PATIENTS, &Query::new().eq("clinic_id", clinic_id))
            .await?;
        let prescriptions_today = self.prescriptions_for(clinic_id, &appointments).await?;

        let tally = tally(&appointments, &doctor_names);
        let recent_activity = self.recent_activity(clinic_id, &appointments, &doctor_names).await?;
        let weekly_trend = self.weekly_trend(clinic_id, date, appointments.len()).await;

        let count = |status: AppointmentStatus| tally.status_counts.get(&status).copied().unwrap_or(0);
        let total = appointments.len();
        let completed = count(AppointmentStatus::Completed);

        Ok(DashboardStats {
            date,
            total_appointments_today: total,
            booked: count(AppointmentStatus::Booked),
            in_queue: count(AppointmentStatus::InQueue),
            in_consultation: count(AppointmentStatus::InConsultation),
            completed,
            cancelled: count(AppointmentStatus::Cancelled),
            no_show: count(AppointmentStatus::NoShow),
            completion_rate: completion_rate(completed, total),
            total_patients,
            total_doctors,
            prescriptions_today,
            avg_feedback_score: average_score(&tally.scores),
            total_feedback_count: tally.scores.len(),
            sentiment_breakdown: tally.sentiments,
            doctor_performance: tally.doctors,
            peak_hours: tally.peak_hours,
            recent_activity,
            weekly_trend,
        })
    }

    async fn appointments_on(&self, clinic_id: &str, date: NaiveDate) -> Result<Vec<Appointment>, AppointmentError> {
        let rows = self.store
            .find(
                tables::APPOINTMENTS,
                &Query::new()
                    .eq("clinic_id", clinic_id)
                    .eq("appointment_date", date.to_string()),
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(serde_json::from_value::<Appointment>)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn prescriptions_for(&self, clinic_id: &str, appointments: &[Appointment]) -> Result<usize, AppointmentError> {
        if appointments.is_empty() {
            return Ok(0);
        }
        Ok(self.store
            .count(
                tables::PRESCRIPTIONS,
                &Query::new()
                    .eq("clinic_id", clinic_id)
                    .in_list("appointment_id", appointments.iter().map(|a| a.id.as_str())),
            )
            .await?)
    }

    async fn recent_activity(
        &self,
        clinic_id: &str,
        appointments: &[Appointment],
        doctor_names: &HashMap<String, String>,
    ) -> Result<Vec<RecentActivity>, AppointmentError> {
        let mut recent: Vec<&Appointment> = appointments.iter().collect();
        recent.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.token_number.cmp(&b.token_number))
        });
        recent.truncate(RECENT_ACTIVITY_LIMIT);

        let patients = directory::patient_contacts(
            self.store.as_ref(),
            clinic_id,
            recent.iter().map(|a| a.patient_id.as_str()),
        )
        .await?;

        Ok(recent
            .into_iter()
            .map(|a| RecentActivity {
                id: a.id.clone(),
                patient_name: patients.get(&a.patient_id).map(|p| p.name.clone()).unwrap_or_default(),
                doctor_name: doctor_names.get(&a.doctor_id).cloned().unwrap_or_default(),
                status: a.status,
                token_number: a.token_number.clone(),
                appointment_time: a.time_label(),
            })
            .collect())
    }

    /// `date` and the six days before it, oldest first. A day whose count
    /// cannot be read shows zero.
    async fn weekly_trend(&self, clinic_id: &str, date: NaiveDate, count_on_date: usize) -> Vec<TrendPoint> {
        let mut trend = Vec::with_capacity(TREND_DAYS as usize);

        for offset in (0..TREND_DAYS).rev() {
            let day = date - Duration::days(offset);
            let count = if day == date {
                count_on_date
            } else {
                let query = Query::new()
                    .eq("clinic_id", clinic_id)
                    .eq("appointment_date", day.to_string());
                match self.store.count(tables::APPOINTMENTS, &query).await {
                    Ok(n) => n,
                    Err(e) => {
                        warn!("Trend count failed for {} on {}: {}", clinic_id, day, e);
                        0
                    }
                }
            };

            trend.push(TrendPoint {
                date: day,
                day: day.format("%a").to_string(),
                count,
            });
        }
        trend
    }
}

struct DayTally {
    status_counts: HashMap<AppointmentStatus, usize>,
    doctors: Vec<DoctorPerformance>,
    peak_hours: Vec<HourCount>,
    scores: Vec<f64>,
    sentiments: SentimentBreakdown,
}

/// Single pass over one day's appointments.
fn tally(appointments: &[Appointment], doctor_names: &HashMap<String, String>) -> DayTally {
    let mut status_counts = HashMap::new();
    let mut doctors: HashMap<&str, DoctorPerformance> = HashMap::new();
    let mut hours: BTreeMap<u32, usize> = BTreeMap::new();
    let mut scores = Vec::new();
    let mut sentiments = SentimentBreakdown { positive: 0, negative: 0, neutral: 0 };

    for appointment in appointments {
        *status_counts.entry(appointment.status).or_insert(0) += 1;

        let doctor = doctors
            .entry(appointment.doctor_id.as_str())
            .or_insert_with(|| DoctorPerformance {
                id: appointment.doctor_id.clone(),
                name: directory::name_or_unknown(doctor_names, &appointment.doctor_id),
                total: 0,
                completed: 0,
                in_consultation: false,
            });
        doctor.total += 1;
        match appointment.status {
            AppointmentStatus::Completed => doctor.completed += 1,
            AppointmentStatus::InConsultation => doctor.in_consultation = true,
            _ => {}
        }

        *hours.entry(appointment.appointment_time.hour()).or_insert(0) += 1;

        if let Some(score) = appointment.feedback_score {
            scores.push(f64::from(score));
        }
        match appointment.feedback_sentiment.as_deref() {
            Some("positive") => sentiments.positive += 1,
            Some("negative") => sentiments.negative += 1,
            Some("neutral") => sentiments.neutral += 1,
            _ => {}
        }
    }

    let mut doctors: Vec<DoctorPerformance> = doctors.into_values().collect();
    doctors.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)));

    DayTally {
        status_counts,
        doctors,
        peak_hours: hours
            .into_iter()
            .map(|(hour, count)| HourCount { hour: format!("{:02}:00", hour), count })
            .collect(),
        scores,
        sentiments,
    }
}

/// Whole percent; 0 for an empty day.
pub fn completion_rate(completed: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (completed as f64 / total as f64 * 100.0).round() as u32
}

/// Mean to one decimal; 0 without scores.
pub fn average_score(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    (mean * 10.0).round() / 10.0
}
