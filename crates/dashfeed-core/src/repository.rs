//! Rate repository: cache reads, freshness checks and fallback refresh.
//!
//! Reads never wait on the network. A stale read queues one refresh on the
//! background worker and returns whatever the cache holds. Only one refresh
//! cycle runs at a time; see [`RefreshMode`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::cache::{RateCache, RateSnapshot};
use crate::fallback::{ChainFailure, FallbackChain};
use crate::rate_source::RateSource;
use crate::worker::BackgroundWorker;
use crate::{CurrencyCode, ExchangeRate, SourceId, UtcDateTime};

/// Observable state of the rate table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RateStatus {
    pub loading: bool,
    /// Set only when every source failed and there is nothing cached to serve.
    pub error: Option<String>,
    /// Every source failed but older rates are still served.
    pub serving_stale: bool,
    pub last_updated: Option<UtcDateTime>,
    pub source: Option<SourceId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// No-op when a cycle is already running.
    IfIdle,
    /// Wait for any running cycle, then run a new one.
    Forced,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub source: SourceId,
    pub count: usize,
    pub source_chain: Vec<String>,
    pub warnings: Vec<String>,
    pub latency_ms: u64,
    pub persisted: bool,
}

#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Updated(RefreshReport),
    /// The cache was inside its freshness window.
    Fresh,
    AlreadyInFlight,
    Exhausted(ChainFailure),
}

struct Inner {
    cache: RateCache,
    chain: Mutex<FallbackChain<dyn RateSource>>,
    source_ids: Vec<SourceId>,
    in_flight: AtomicUsize,
    queued: AtomicBool,
    auto_refresh: AtomicBool,
    status: watch::Sender<RateStatus>,
    worker: BackgroundWorker,
    default_currency: CurrencyCode,
}

/// Cheap to clone; clones share one cache, chain and status channel.
#[derive(Clone)]
pub struct RateRepository {
    inner: Arc<Inner>,
}

/// Decrements the in-flight counter even if the refresh future is dropped.
struct InFlightGuard<'a> {
    inner: &'a Inner,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.inner.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.status.send_modify(|status| status.loading = false);
        }
    }
}

impl RateRepository {
    pub fn new(
        cache: RateCache,
        sources: Vec<Arc<dyn RateSource>>,
        worker: BackgroundWorker,
        default_currency: CurrencyCode,
    ) -> Self {
        let source_ids = sources.iter().map(|source| source.id()).collect();
        let snapshot = cache.snapshot();
        let (status, _) = watch::channel(RateStatus {
            last_updated: snapshot.fetched_at,
            source: snapshot.source,
            ..RateStatus::default()
        });

        Self {
            inner: Arc::new(Inner {
                cache,
                chain: Mutex::new(FallbackChain::new(sources)),
                source_ids,
                in_flight: AtomicUsize::new(0),
                queued: AtomicBool::new(false),
                auto_refresh: AtomicBool::new(true),
                status,
                worker,
                default_currency,
            }),
        }
    }

    /// Disable background refresh on stale reads.
    pub fn with_auto_refresh(self, enabled: bool) -> Self {
        self.inner.auto_refresh.store(enabled, Ordering::Release);
        self
    }

    pub fn cache(&self) -> &RateCache {
        &self.inner.cache
    }

    pub fn canonical_order(&self) -> &[SourceId] {
        &self.inner.source_ids
    }

    pub fn default_currency(&self) -> &CurrencyCode {
        &self.inner.default_currency
    }

    pub fn status(&self) -> RateStatus {
        self.inner.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RateStatus> {
        self.inner.status.subscribe()
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire) > 0
    }

    /// Current snapshot, queueing a refresh when stale.
    pub fn get_rates(&self) -> Arc<RateSnapshot> {
        self.schedule_if_stale();
        self.inner.cache.snapshot()
    }

    pub fn get_rate(&self, code: &str) -> Option<ExchangeRate> {
        self.get_rates().get(code).cloned()
    }

    /// Rate for the preferred code, else the default currency.
    pub fn best_rate(&self, preferred: Option<&str>) -> Option<ExchangeRate> {
        let snapshot = self.get_rates();
        preferred
            .and_then(|code| snapshot.get(code))
            .or_else(|| snapshot.get(self.inner.default_currency.as_str()))
            .cloned()
    }

    /// Rates whose code contains `query`, ignoring case. An empty query matches all.
    pub fn search(&self, query: &str) -> Vec<ExchangeRate> {
        let needle = query.trim().to_ascii_uppercase();
        self.get_rates()
            .rates
            .iter()
            .filter(|rate| rate.currency_code.as_str().contains(needle.as_str()))
            .cloned()
            .collect()
    }

    /// Refresh only when outside the freshness window.
    pub async fn ensure_fresh(&self) -> RefreshOutcome {
        if self.inner.cache.is_stale(UtcDateTime::now()) {
            self.refresh(RefreshMode::IfIdle).await
        } else {
            RefreshOutcome::Fresh
        }
    }

    /// Wait for queued background refreshes and any running cycle.
    pub async fn settle(&self) {
        self.inner.worker.flush().await;
        drop(self.inner.chain.lock().await);
    }

    pub async fn refresh(&self, mode: RefreshMode) -> RefreshOutcome {
        let inner = self.inner.as_ref();
        match mode {
            RefreshMode::IfIdle => {
                if inner
                    .in_flight
                    .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    debug!("rate refresh already in flight");
                    return RefreshOutcome::AlreadyInFlight;
                }
            }
            RefreshMode::Forced => {
                inner.in_flight.fetch_add(1, Ordering::AcqRel);
            }
        }
        let _guard = InFlightGuard { inner };
        inner.status.send_modify(|status| status.loading = true);

        let mut chain = inner.chain.lock().await;
        let result = chain.run_cycle(|source| source.fetch_rates()).await;
        drop(chain);

        match result {
            Ok(success) => {
                let now = UtcDateTime::now();
                let batch = success.data;
                let persisted = match inner.cache.replace(&batch, now) {
                    Ok(()) => true,
                    Err(error) => {
                        warn!(source = %batch.source, "failed to persist rates: {error}");
                        false
                    }
                };

                info!(source = %batch.source, count = batch.len(), latency_ms = success.latency_ms, "exchange rates refreshed");
                inner.status.send_modify(|status| {
                    status.error = None;
                    status.serving_stale = false;
                    status.last_updated = Some(now);
                    status.source = Some(batch.source);
                });

                RefreshOutcome::Updated(RefreshReport {
                    source: batch.source,
                    count: batch.len(),
                    source_chain: success.source_chain,
                    warnings: success.warnings,
                    latency_ms: success.latency_ms,
                    persisted,
                })
            }
            Err(failure) => {
                let has_data = !inner.cache.is_empty();
                let message = failure
                    .last_error()
                    .map(|error| format!("all rate sources failed; last error: {}", error.message))
                    .unwrap_or_else(|| String::from("all rate sources failed"));

                if has_data {
                    warn!("serving stale exchange rates: {message}");
                } else {
                    warn!("no exchange rates available: {message}");
                }

                inner.status.send_modify(|status| {
                    status.serving_stale = has_data;
                    status.error = if has_data { None } else { Some(message) };
                });

                RefreshOutcome::Exhausted(failure)
            }
        }
    }

    fn schedule_if_stale(&self) {
        if !self.inner.auto_refresh.load(Ordering::Acquire)
            || !self.inner.cache.is_stale(UtcDateTime::now())
            || self.is_refreshing()
        {
            return;
        }

        if self.inner.queued.swap(true, Ordering::AcqRel) {
            return;
        }

        let repository = self.clone();
        let submitted = self.inner.worker.submit(async move {
            repository.inner.queued.store(false, Ordering::Release);
            if repository.inner.cache.is_stale(UtcDateTime::now()) {
                let _ = repository.refresh(RefreshMode::IfIdle).await;
            }
        });

        if !submitted {
            self.inner.queued.store(false, Ordering::Release);
            warn!(worker = self.inner.worker.name(), "background worker is gone; rates will not refresh");
        }
    }
}
