//! In-memory rate snapshot with persistence and a freshness window.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use dashfeed_store::{RateRecord, Store};
use serde::Serialize;
use tracing::warn;

use crate::rate_source::RateBatch;
use crate::{CoreError, CurrencyCode, ExchangeRate, SourceId, UtcDateTime, ValidationError};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Rate table as read back from persistence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PersistedRates {
    pub source: Option<SourceId>,
    pub rates: Vec<ExchangeRate>,
    pub updated_at: Option<UtcDateTime>,
}

/// Persistence seam for the rate cache.
pub trait RateTable: Send + Sync {
    fn load(&self) -> Result<PersistedRates, CoreError>;
    fn replace(&self, batch: &RateBatch, updated_at: UtcDateTime) -> Result<(), CoreError>;
}

impl RateTable for Store {
    fn load(&self) -> Result<PersistedRates, CoreError> {
        let records = self.load_rates()?;
        let mut persisted = PersistedRates::default();

        for record in records {
            match record_to_rate(&record) {
                Ok((source, rate, updated_at)) => {
                    persisted.source = persisted.source.or(Some(source));
                    persisted.updated_at = persisted.updated_at.max(Some(updated_at));
                    persisted.rates.push(rate);
                }
                Err(error) => {
                    warn!(currency = %record.currency_code, "skipping unreadable persisted rate: {error}");
                }
            }
        }

        Ok(persisted)
    }

    fn replace(&self, batch: &RateBatch, updated_at: UtcDateTime) -> Result<(), CoreError> {
        let stamp = updated_at.format_rfc3339();
        let records = batch
            .rates
            .iter()
            .map(|rate| RateRecord {
                currency_code: rate.currency_code.to_string(),
                rate: rate.rate.to_string(),
                source: batch.source.as_str().to_owned(),
                updated_at: stamp.clone(),
            })
            .collect::<Vec<_>>();

        self.replace_rates(&records)?;
        Ok(())
    }
}

fn record_to_rate(
    record: &RateRecord,
) -> Result<(SourceId, ExchangeRate, UtcDateTime), ValidationError> {
    let source = record.source.parse::<SourceId>()?;
    let rate = ExchangeRate::parse(&record.currency_code, &record.rate)?;
    let updated_at = UtcDateTime::parse(&record.updated_at)?;
    Ok((source, rate, updated_at))
}

/// Process-local rate table, mostly for tests and `--offline` runs without a home.
#[derive(Debug, Default)]
pub struct MemoryRateTable {
    stored: Mutex<PersistedRates>,
    fail_writes: bool,
}

impl MemoryRateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rates(source: SourceId, rates: Vec<ExchangeRate>, updated_at: UtcDateTime) -> Self {
        Self {
            stored: Mutex::new(PersistedRates {
                source: Some(source),
                rates,
                updated_at: Some(updated_at),
            }),
            fail_writes: false,
        }
    }

    /// A table whose writes always fail.
    pub fn read_only() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }
}

impl RateTable for MemoryRateTable {
    fn load(&self) -> Result<PersistedRates, CoreError> {
        Ok(self
            .stored
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn replace(&self, batch: &RateBatch, updated_at: UtcDateTime) -> Result<(), CoreError> {
        if self.fail_writes {
            return Err(CoreError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "rate table is read-only",
            )));
        }

        *self.stored.lock().unwrap_or_else(PoisonError::into_inner) = PersistedRates {
            source: Some(batch.source),
            rates: batch.rates.clone(),
            updated_at: Some(updated_at),
        };
        Ok(())
    }
}

/// Immutable view of the cache at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RateSnapshot {
    pub source: Option<SourceId>,
    /// Sorted by currency code.
    pub rates: Vec<ExchangeRate>,
    /// Unix millis of the last successful refresh in this process; 0 if none.
    pub last_updated_ms: u64,
    /// When the rates were written, which may predate this process.
    pub fetched_at: Option<UtcDateTime>,
}

impl RateSnapshot {
    pub fn get(&self, code: &str) -> Option<&ExchangeRate> {
        let code = CurrencyCode::parse(code).ok()?;
        self.rates
            .binary_search_by(|rate| rate.currency_code.cmp(&code))
            .ok()
            .map(|index| &self.rates[index])
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

/// Rate cache. The lock is never held across an await.
pub struct RateCache {
    snapshot: RwLock<Arc<RateSnapshot>>,
    table: Arc<dyn RateTable>,
    refresh_interval: Duration,
}

impl RateCache {
    pub fn new(table: Arc<dyn RateTable>, refresh_interval: Duration) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(RateSnapshot::default())),
            table,
            refresh_interval,
        }
    }

    /// Load persisted rates. They stay stale until the first refresh.
    pub fn restore(&self) -> Result<usize, CoreError> {
        let mut persisted = self.table.load()?;
        persisted
            .rates
            .sort_by(|left, right| left.currency_code.cmp(&right.currency_code));
        persisted
            .rates
            .dedup_by(|right, left| left.currency_code == right.currency_code);

        let count = persisted.rates.len();
        self.swap(RateSnapshot {
            source: persisted.source,
            rates: persisted.rates,
            last_updated_ms: 0,
            fetched_at: persisted.updated_at,
        });
        Ok(count)
    }

    pub fn snapshot(&self) -> Arc<RateSnapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn get(&self, code: &str) -> Option<ExchangeRate> {
        self.snapshot().get(code).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn last_updated_ms(&self) -> u64 {
        self.snapshot().last_updated_ms
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    pub fn is_stale(&self, now: UtcDateTime) -> bool {
        let last = self.last_updated_ms();
        let window = u64::try_from(self.refresh_interval.as_millis()).unwrap_or(u64::MAX);
        last == 0 || now.unix_millis().saturating_sub(last) > window
    }

    /// Replace the snapshot, then persist. A persistence error leaves the new snapshot in place.
    pub fn replace(&self, batch: &RateBatch, now: UtcDateTime) -> Result<(), CoreError> {
        self.swap(RateSnapshot {
            source: Some(batch.source),
            rates: batch.rates.clone(),
            last_updated_ms: now.unix_millis(),
            fetched_at: Some(now),
        });
        self.table.replace(batch, now)
    }

    fn swap(&self, next: RateSnapshot) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashfeed_store::StoreConfig;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn batch(source: SourceId, pairs: &[(&str, &str)]) -> RateBatch {
        RateBatch {
            source,
            rates: pairs
                .iter()
                .map(|(code, rate)| ExchangeRate::parse(code, rate).expect("valid"))
                .collect(),
        }
    }

    #[test]
    fn restored_rates_are_stale() {
        let table = MemoryRateTable::with_rates(
            SourceId::DashRates,
            vec![ExchangeRate::parse("USD", "30").expect("valid")],
            UtcDateTime::parse("2026-01-01T00:00:00Z").expect("valid"),
        );
        let cache = RateCache::new(Arc::new(table), DEFAULT_REFRESH_INTERVAL);

        assert_eq!(cache.restore().expect("restore"), 1);
        assert_eq!(cache.get("usd").map(|rate| rate.rate), Some(dec!(30)));
        assert_eq!(cache.last_updated_ms(), 0);
        assert!(cache.is_stale(UtcDateTime::now()));
    }

    #[test]
    fn freshness_window_is_thirty_seconds() {
        let cache = RateCache::new(Arc::new(MemoryRateTable::new()), DEFAULT_REFRESH_INTERVAL);
        let start = UtcDateTime::from_unix_millis(1_000_000);
        cache
            .replace(&batch(SourceId::DashRetail, &[("USD", "30")]), start)
            .expect("replace");

        assert!(!cache.is_stale(UtcDateTime::from_unix_millis(1_030_000)));
        assert!(cache.is_stale(UtcDateTime::from_unix_millis(1_030_001)));
    }

    #[test]
    fn failed_persist_keeps_new_snapshot() {
        let cache = RateCache::new(Arc::new(MemoryRateTable::read_only()), DEFAULT_REFRESH_INTERVAL);
        let result = cache.replace(
            &batch(SourceId::DashRetail, &[("EUR", "25")]),
            UtcDateTime::now(),
        );

        assert!(result.is_err());
        assert_eq!(cache.get("EUR").map(|rate| rate.rate), Some(dec!(25)));
    }

    #[test]
    fn store_backed_table_round_trips() {
        let temp = tempdir().expect("tempdir");
        let store = Store::open(StoreConfig::in_home(temp.path())).expect("store");
        let now = UtcDateTime::parse("2026-03-01T12:00:00Z").expect("valid");

        RateTable::replace(
            &store,
            &batch(SourceId::FirstFallback, &[("USD", "31.5"), ("VES", "77")]),
            now,
        )
        .expect("persist");

        let cache = RateCache::new(Arc::new(store), DEFAULT_REFRESH_INTERVAL);
        cache.restore().expect("restore");
        let snapshot = cache.snapshot();
        assert_eq!(snapshot.source, Some(SourceId::FirstFallback));
        assert_eq!(snapshot.fetched_at, Some(now));
        assert_eq!(snapshot.get("VES").map(|rate| rate.rate), Some(dec!(77)));
    }
}
