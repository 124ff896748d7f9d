use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::http_client::HttpClient;
use crate::rate_source::{RateBatch, RateFuture, RateSource, SourceError};
use crate::sources::{BtcTableFeed, DashBtcFeed, TableBuilder, VesFeed};
use crate::{CurrencyCode, ExchangeRate, SourceId, RATE_SCALE};

/// Fiat table derived from a BTC/fiat table and a DASH/BTC price.
///
/// DASH/BTC feeds are tried in order; the first one that parses wins. The
/// VES feed is optional and only logged when it fails.
#[derive(Clone)]
pub struct CompositeSource {
    id: SourceId,
    http: Arc<dyn HttpClient>,
    btc_table: BtcTableFeed,
    dash_btc: Vec<DashBtcFeed>,
    ves: Option<VesFeed>,
    timeout_ms: u64,
}

impl CompositeSource {
    pub fn first_fallback(http: Arc<dyn HttpClient>, timeout_ms: u64) -> Self {
        Self {
            id: SourceId::FirstFallback,
            http,
            btc_table: BtcTableFeed::BitPay,
            dash_btc: vec![DashBtcFeed::DashCentral],
            ves: Some(VesFeed),
            timeout_ms,
        }
    }

    pub fn second_fallback(http: Arc<dyn HttpClient>, timeout_ms: u64) -> Self {
        Self {
            id: SourceId::SecondFallback,
            http,
            btc_table: BtcTableFeed::BitcoinAverage,
            dash_btc: vec![DashBtcFeed::Poloniex, DashBtcFeed::BitcoinAverage],
            ves: Some(VesFeed),
            timeout_ms,
        }
    }

    async fn dash_btc_price(&self) -> Result<Decimal, SourceError> {
        let mut last_error = None;
        for feed in &self.dash_btc {
            match feed.fetch(self.http.as_ref(), self.timeout_ms).await {
                Ok(price) => {
                    debug!(source = %self.id, feed = feed.name(), %price, "dash/btc price fetched");
                    return Ok(price);
                }
                Err(error) => {
                    warn!(source = %self.id, feed = feed.name(), code = error.code(), "dash/btc feed failed: {}", error.message());
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| SourceError::internal("no DASH/BTC feed configured")))
    }

    async fn ves_rate(&self, dash_btc: Decimal) -> Option<ExchangeRate> {
        let feed = self.ves?;
        let result = feed
            .fetch(self.http.as_ref(), self.timeout_ms)
            .await
            .and_then(|ves_per_btc| {
                let rate = multiply(dash_btc, ves_per_btc, feed.name())?;
                let code = CurrencyCode::parse("VES")
                    .map_err(|error| SourceError::from_validation(feed.name(), &error))?;
                ExchangeRate::new(code, rate)
                    .map_err(|error| SourceError::from_validation(feed.name(), &error))
            });

        match result {
            Ok(rate) => Some(rate),
            Err(error) => {
                warn!(source = %self.id, feed = feed.name(), code = error.code(), "optional VES feed failed: {}", error.message());
                None
            }
        }
    }

    async fn build(&self) -> Result<RateBatch, SourceError> {
        let dash_btc = self.dash_btc_price().await?;
        let btc_table = self.btc_table.fetch(self.http.as_ref(), self.timeout_ms).await?;

        let mut table = TableBuilder::new(self.btc_table.name());
        for (code, fiat_per_btc) in btc_table {
            table.insert(&code, multiply(dash_btc, fiat_per_btc, self.btc_table.name())?)?;
        }

        if let Some(ves) = self.ves_rate(dash_btc).await {
            table.override_rate(ves);
        }

        table.finish(self.id)
    }
}

impl RateSource for CompositeSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn fetch_rates<'a>(&'a self) -> RateFuture<'a> {
        Box::pin(self.build())
    }
}

fn multiply(dash_btc: Decimal, fiat_per_btc: Decimal, upstream: &str) -> Result<Decimal, SourceError> {
    dash_btc
        .checked_mul(fiat_per_btc)
        .map(|rate| rate.round_dp(RATE_SCALE))
        .ok_or_else(|| SourceError::fetch(format!("{upstream} rate overflowed")))
}
