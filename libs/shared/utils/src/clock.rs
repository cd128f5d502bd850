//! Civil date and time for the clinic's fixed timezone.
//!
//! All date/time comparisons elsewhere go through `HH:MM` and `YYYY-MM-DD`
//! values produced here, never through the host timezone.

use chrono::{FixedOffset, NaiveDate, NaiveTime, Offset, Timelike, Utc};
use tracing::warn;

use shared_config::{AppConfig, DEFAULT_CLINIC_UTC_OFFSET_MINUTES};

pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;

    /// Current time of day truncated to the minute.
    fn now_time(&self) -> NaiveTime;
}

#[derive(Debug, Clone, Copy)]
pub struct ClinicClock {
    offset: FixedOffset,
}

impl ClinicClock {
    pub fn new(offset_minutes: i32) -> Self {
        let offset = FixedOffset::east_opt(offset_minutes * 60)
            .or_else(|| {
                warn!("UTC offset of {} minutes is out of range, using default", offset_minutes);
                FixedOffset::east_opt(DEFAULT_CLINIC_UTC_OFFSET_MINUTES * 60)
            })
            .unwrap_or_else(|| Utc.fix());
        Self { offset }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.clinic_utc_offset_minutes)
    }
}

impl Default for ClinicClock {
    fn default() -> Self {
        Self::new(DEFAULT_CLINIC_UTC_OFFSET_MINUTES)
    }
}

impl Clock for ClinicClock {
    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.offset).date_naive()
    }

    fn now_time(&self) -> NaiveTime {
        let now = Utc::now().with_timezone(&self.offset).time();
        now.with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now)
    }
}

/// A clock pinned to one instant, for tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl FixedClock {
    pub fn new(date: NaiveDate, time: NaiveTime) -> Self {
        Self { date, time }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.date
    }

    fn now_time(&self) -> NaiveTime {
        self.time
    }
}
