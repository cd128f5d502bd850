// libs/appointment-cell/src/services/token.rs
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use deadpool_redis::Pool;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use shared_database::{tables, Query, Store};
use shared_utils::clock::Clock;

/// Prefix used when the doctor's name is unknown.
pub const ANONYMOUS_PREFIX: &str = "T";
const FALLBACK_PREFIX: &str = "DR";
const SEQUENCE_TTL_SECONDS: u64 = 2 * 86_400;

/// Initials of the first and last word, the first two letters of a single
/// word, or `DR` when the name has no letters to use.
pub fn token_prefix(doctor_name: Option<&str>) -> String {
    let Some(name) = doctor_name.map(str::trim).filter(|n| !n.is_empty()) else {
        return ANONYMOUS_PREFIX.to_string();
    };

    let words: Vec<&str> = name.split_whitespace().collect();
    let prefix: String = match words.as_slice() {
        [first, .., last] => first.chars().take(1).chain(last.chars().take(1)).collect(),
        [only] => only.chars().take(2).collect(),
        [] => String::new(),
    };

    if prefix.is_empty() {
        FALLBACK_PREFIX.to_string()
    } else {
        prefix.to_uppercase()
    }
}

pub fn format_token(prefix: &str, number: u32) -> String {
    format!("{}-{:03}", prefix, number)
}

/// Numeric part after the last `-`.
pub fn token_number(token: &str) -> Option<u32> {
    token.rsplit('-').next()?.trim().parse().ok()
}

/// Atomic counter per (clinic, date). `seed` is the highest number already
/// issued according to storage; the returned value is always above it.
#[async_trait]
pub trait TokenSequence: Send + Sync {
    async fn next(&self, clinic_id: &str, date: NaiveDate, seed: u32) -> Result<u32>;
}

fn sequence_key(clinic_id: &str, date: NaiveDate) -> String {
    format!("token_seq:{}:{}", clinic_id, date.format("%Y-%m-%d"))
}

/// In-process sequence for single-instance deployments and tests. Counters
/// for days before the clinic's today are dropped, since bookings for past
/// days are refused.
pub struct LocalTokenSequence {
    counters: Mutex<HashMap<(String, NaiveDate), u32>>,
    clock: Arc<dyn Clock>,
}

impl LocalTokenSequence {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { counters: Mutex::new(HashMap::new()), clock }
    }
}

#[async_trait]
impl TokenSequence for LocalTokenSequence {
    async fn next(&self, clinic_id: &str, date: NaiveDate, seed: u32) -> Result<u32> {
        let today = self.clock.today();
        let mut counters = self.counters.lock().await;

        let before = counters.len();
        counters.retain(|(_, day), _| *day >= today);
        if counters.len() < before {
            debug!("Dropped {} token counters from before {}", before - counters.len(), today);
        }

        let counter = counters.entry((clinic_id.to_string(), date)).or_insert(0);
        *counter = (*counter).max(seed) + 1;
        Ok(*counter)
    }
}

/// Shared sequence in Redis: seeded once with `SET NX`, then `INCR`.
pub struct RedisTokenSequence {
    pool: Pool,
}

impl RedisTokenSequence {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenSequence for RedisTokenSequence {
    async fn next(&self, clinic_id: &str, date: NaiveDate, seed: u32) -> Result<u32> {
        let mut conn = self.pool.get().await?;
        let key = sequence_key(clinic_id, date);

        let _: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(seed)
            .arg("NX")
            .arg("EX")
            .arg(SEQUENCE_TTL_SECONDS)
            .query_async(&mut conn)
            .await?;

        let mut next: u32 = redis::cmd("INCR").arg(&key).query_async(&mut conn).await?;
        if next <= seed {
            // Rows were written without going through this counter.
            next = seed + 1;
            let _: () = redis::cmd("SET")
                .arg(&key)
                .arg(next)
                .arg("EX")
                .arg(SEQUENCE_TTL_SECONDS)
                .query_async(&mut conn)
                .await?;
        }
        Ok(next)
    }
}

/// Issues `{PREFIX}-{NNN}` tokens. One counter per clinic and date; the
/// prefix only tells patients which doctor they are waiting for.
pub struct TokenGenerator {
    store: Arc<dyn Store>,
    sequence: Arc<dyn TokenSequence>,
}

impl TokenGenerator {
    pub fn new(store: Arc<dyn Store>, sequence: Arc<dyn TokenSequence>) -> Self {
        Self { store, sequence }
    }

    /// Never fails: a broken sequence falls back to the storage scan, and a
    /// broken scan to `001`.
    pub async fn generate(&self, clinic_id: &str, date: NaiveDate, doctor_name: Option<&str>) -> String {
        let prefix = token_prefix(doctor_name);

        let scanned = match self.highest_issued(clinic_id, date).await {
            Ok(max) => Some(max),
            Err(e) => {
                warn!("Token scan failed for clinic {} on {}: {}", clinic_id, date, e);
                None
            }
        };

        let number = match self.sequence.next(clinic_id, date, scanned.unwrap_or(0)).await {
            Ok(n) => n,
            Err(e) => {
                warn!("Token sequence unavailable for clinic {} on {}: {}", clinic_id, date, e);
                scanned.map_or(1, |max| max + 1)
            }
        };

        let token = format_token(&prefix, number);
        debug!("Issued token {} for clinic {} on {}", token, clinic_id, date);
        token
    }

    /// Highest numeric suffix among every token of the day, any prefix and
    /// any status.
    async fn highest_issued(&self, clinic_id: &str, date: NaiveDate) -> Result<u32> {
        let rows = self.store
            .find(
                tables::APPOINTMENTS,
                &Query::new()
                    .eq("clinic_id", clinic_id)
                    .eq("appointment_date", date.to_string()),
            )
            .await?;

        Ok(rows
            .iter()
            .filter_map(|row| row.get("token_number").and_then(|t| t.as_str()))
            .filter_map(token_number)
            .max()
            .unwrap_or(0))
    }
}
