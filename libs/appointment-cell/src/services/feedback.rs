// libs/appointment-cell/src/services/feedback.rs
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use queue_cell::{DomainEvent, EventDispatcher};
use shared_database::{tables, Query, Store};

use crate::models::{Appointment, AppointmentError, AppointmentStatus, FeedbackOutcome, FeedbackRequest};

pub const NEUTRAL: &str = "neutral";

/// Sentiment and keyword extraction for free-text feedback.
#[async_trait]
pub trait TextAnalytics: Send + Sync {
    /// One of `positive`, `negative` or `neutral`.
    async fn sentiment(&self, text: &str) -> Result<String>;

    async fn keywords(&self, text: &str) -> Result<Vec<String>>;
}

/// Used when no analytics provider is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeutralTextAnalytics;

#[async_trait]
impl TextAnalytics for NeutralTextAnalytics {
    async fn sentiment(&self, _text: &str) -> Result<String> {
        Ok(NEUTRAL.to_string())
    }

    async fn keywords(&self, _text: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

pub struct FeedbackService {
    store: Arc<dyn Store>,
    analytics: Arc<dyn TextAnalytics>,
    events: EventDispatcher,
}

impl FeedbackService {
    pub fn new(store: Arc<dyn Store>, analytics: Arc<dyn TextAnalytics>, events: EventDispatcher) -> Self {
        Self { store, analytics, events }
    }

    /// Write-once feedback on a completed appointment.
    pub async fn record_feedback(
        &self,
        appointment_id: &str,
        request: FeedbackRequest,
    ) -> Result<FeedbackOutcome, AppointmentError> {
        let row = self.store
            .find_one(tables::APPOINTMENTS, &Query::new().eq("id", appointment_id))
            .await?
            .ok_or(AppointmentError::NotFound("Appointment"))?;
        let appointment: Appointment = serde_json::from_value(row)?;

        if appointment.status != AppointmentStatus::Completed {
            return Err(AppointmentError::InvalidState(
                "Feedback can only be given for completed appointments".to_string(),
            ));
        }
        if appointment.has_feedback() {
            return Err(AppointmentError::Conflict("Feedback has already been submitted".to_string()));
        }

        let score = parse_score(&request.score)?;
        let text = request.text.map(|t| t.trim().to_string()).unwrap_or_default();
        let (sentiment, keywords) = self.analyse(&text).await;

        let guard = Query::new()
            .eq("status", AppointmentStatus::Completed.as_str())
            .eq("feedback_score", Value::Null);
        let fields = json!({
            "feedback_score": score,
            "feedback_text": text,
            "feedback_sentiment": sentiment,
            "feedback_keywords": keywords.join(","),
        });

        self.store
            .update_where(tables::APPOINTMENTS, appointment_id, &guard, fields)
            .await?
            .ok_or_else(|| AppointmentError::Conflict("Feedback has already been submitted".to_string()))?;

        info!("Feedback {} ({}) recorded for appointment {}", score, sentiment, appointment_id);
        self.events.publish(DomainEvent::FeedbackReceived {
            clinic_id: appointment.clinic_id,
            appointment_id: appointment_id.to_string(),
            score,
            sentiment: sentiment.clone(),
        });

        Ok(FeedbackOutcome {
            appointment_id: appointment_id.to_string(),
            score,
            sentiment,
            keywords,
        })
    }

    /// Best effort: failures fall back to neutral with no keywords.
    async fn analyse(&self, text: &str) -> (String, Vec<String>) {
        if text.is_empty() {
            return (NEUTRAL.to_string(), Vec::new());
        }

        let sentiment = match self.analytics.sentiment(text).await {
            Ok(s) if !s.trim().is_empty() => s.trim().to_lowercase(),
            Ok(_) => NEUTRAL.to_string(),
            Err(e) => {
                warn!("Sentiment analysis failed: {}", e);
                NEUTRAL.to_string()
            }
        };

        let keywords = match self.analytics.keywords(text).await {
            Ok(words) => words,
            Err(e) => {
                warn!("Keyword extraction failed: {}", e);
                Vec::new()
            }
        };

        (sentiment, keywords)
    }
}

/// Integer 1 to 5, as a JSON number or a numeric string.
pub fn parse_score(raw: &Value) -> Result<u8, AppointmentError> {
    let score = match raw {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    match score {
        Some(s @ 1..=5) => Ok(s as u8),
        _ => Err(AppointmentError::ValidationError(
            "Score must be a whole number from 1 to 5".to_string(),
        )),
    }
}
