//! Fixed-width civil time-of-day handling.
//!
//! Times travel as zero-padded `HH:MM` strings so that string order and
//! chronological order agree. Seconds are accepted on input and dropped.

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Deserializer, Serializer};

pub const HHMM: &str = "%H:%M";

pub fn parse_hhmm(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    let parsed = NaiveTime::parse_from_str(raw, HHMM)
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()?;
    NaiveTime::from_hms_opt(parsed.hour(), parsed.minute(), 0)
}

pub fn format_hhmm(time: &NaiveTime) -> String {
    time.format(HHMM).to_string()
}

pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_hhmm(time))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_hhmm(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid HH:MM time '{}'", raw)))
}

/// `Option<NaiveTime>` variant; empty strings and nulls read as `None`.
pub mod option {
    use super::*;

    pub fn serialize<S>(time: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match time {
            Some(t) => serializer.serialize_str(&format_hhmm(t)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(value) => parse_hhmm(value)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid HH:MM time '{}'", value))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_zero_padded() {
        let t = NaiveTime::from_hms_opt(9, 5, 0).unwrap();
        assert_eq!(format_hhmm(&t), "09:05");
    }

    #[test]
    fn parses_with_or_without_seconds() {
        assert_eq!(parse_hhmm("17:00"), NaiveTime::from_hms_opt(17, 0, 0));
        assert_eq!(parse_hhmm("17:00:30"), NaiveTime::from_hms_opt(17, 0, 0));
        assert_eq!(parse_hhmm("08:59:59"), NaiveTime::from_hms_opt(8, 59, 0));
        assert_eq!(parse_hhmm("5pm"), None);
        assert_eq!(parse_hhmm(""), None);
    }

    #[test]
    fn string_order_matches_time_order() {
        let early = format_hhmm(&NaiveTime::from_hms_opt(9, 30, 0).unwrap());
        let late = format_hhmm(&NaiveTime::from_hms_opt(10, 0, 0).unwrap());
        assert!(early < late);
    }
}
