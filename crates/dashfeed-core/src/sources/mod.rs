//! Rate source implementations.
//!
//! Every source normalizes its upstream payload through [`TableBuilder`],
//! which applies the shared exclusion list, validation and the legacy
//! currency-code rule before a [`RateBatch`] leaves the source.

pub mod composite;
pub mod dash_rates;
pub mod dash_retail;
pub mod feeds;

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::Value;

use crate::http_client::{HttpClient, HttpRequest, HttpResponse};
use crate::rate_source::{RateBatch, RateSource, SourceError};
use crate::{parse_decimal, CurrencyCode, ExchangeRate, SourceId, ValidationError, LEGACY_CODES};

pub use composite::CompositeSource;
pub use dash_rates::DashRatesSource;
pub use dash_retail::DashRetailSource;
pub use feeds::{BtcTableFeed, DashBtcFeed, VesFeed};

/// Codes that are duplicates or not fiat. Dropped before validation.
pub const EXCLUDED_CODES: [&str; 4] = ["BTC", "MBTC", "UBTC", "DASH"];

/// Canonical source list in preference order.
pub fn default_sources(http: Arc<dyn HttpClient>, timeout_ms: u64) -> Vec<Arc<dyn RateSource>> {
    vec![
        Arc::new(DashRetailSource::new(Arc::clone(&http), timeout_ms)),
        Arc::new(DashRatesSource::new(Arc::clone(&http), timeout_ms)),
        Arc::new(CompositeSource::first_fallback(Arc::clone(&http), timeout_ms)),
        Arc::new(CompositeSource::second_fallback(http, timeout_ms)),
    ]
}

/// Accumulates validated rates for one source.
#[derive(Debug)]
pub struct TableBuilder {
    upstream: &'static str,
    rates: BTreeMap<CurrencyCode, Decimal>,
}

impl TableBuilder {
    pub fn new(upstream: &'static str) -> Self {
        Self {
            upstream,
            rates: BTreeMap::new(),
        }
    }

    /// Add one rate. Excluded codes are skipped silently; anything malformed fails the table.
    pub fn insert(&mut self, code: &str, rate: Decimal) -> Result<(), SourceError> {
        let normalized = code.trim().to_ascii_uppercase();
        if EXCLUDED_CODES.contains(&normalized.as_str()) {
            return Ok(());
        }

        let rate = ExchangeRate::parse(&normalized, &rate.to_string())
            .map_err(|error| SourceError::from_validation(self.upstream, &error))?;

        if self.rates.contains_key(&rate.currency_code) {
            return Err(SourceError::fetch(format!(
                "{} returned duplicate currency '{}'",
                self.upstream, rate.currency_code
            )));
        }

        self.rates.insert(rate.currency_code, rate.rate);
        Ok(())
    }

    /// Force a rate for the code, removing any legacy code it supersedes.
    pub fn override_rate(&mut self, rate: ExchangeRate) {
        for (legacy, current) in LEGACY_CODES {
            if rate.currency_code.as_str() == current {
                self.rates.retain(|code, _| code.as_str() != legacy);
            }
        }
        self.rates.insert(rate.currency_code, rate.rate);
    }

    pub fn get(&self, code: &str) -> Option<Decimal> {
        self.rates
            .iter()
            .find(|(key, _)| key.as_str() == code)
            .map(|(_, rate)| *rate)
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Apply the legacy-code rule and seal the table.
    pub fn finish(mut self, source: SourceId) -> Result<RateBatch, SourceError> {
        let legacy = self
            .rates
            .keys()
            .filter_map(|code| code.successor().map(|current| (code.clone(), current)))
            .collect::<Vec<_>>();

        for (legacy_code, current) in legacy {
            if let Some(rate) = self.rates.remove(&legacy_code) {
                self.rates.entry(current).or_insert(rate);
            }
        }

        if self.rates.is_empty() {
            return Err(SourceError::fetch(format!(
                "{} returned an empty rate table",
                self.upstream
            )));
        }

        let rates = self
            .rates
            .into_iter()
            .map(|(currency_code, rate)| ExchangeRate {
                currency_code,
                rate,
            })
            .collect();

        Ok(RateBatch { source, rates })
    }
}

/// Read a decimal from a JSON number or numeric string.
pub fn decimal_from_json(value: &Value) -> Result<Decimal, ValidationError> {
    match value {
        Value::Number(number) => parse_decimal(&number.to_string()),
        Value::String(text) => parse_decimal(text),
        other => Err(ValidationError::InvalidDecimal {
            value: other.to_string(),
        }),
    }
}

/// GET a URL and parse the body as JSON, mapping every failure to a `SourceError`.
pub(crate) async fn fetch_json(
    http: &dyn HttpClient,
    upstream: &str,
    url: &str,
    timeout_ms: u64,
) -> Result<Value, SourceError> {
    let response = fetch_ok(http, upstream, url, timeout_ms).await?;
    serde_json::from_str(&response.body).map_err(|error| {
        SourceError::fetch(format!("{upstream} returned malformed JSON: {error}"))
    })
}

pub(crate) async fn fetch_ok(
    http: &dyn HttpClient,
    upstream: &str,
    url: &str,
    timeout_ms: u64,
) -> Result<HttpResponse, SourceError> {
    let request = HttpRequest::get(url)
        .with_header("accept", "application/json")
        .with_timeout_ms(timeout_ms);

    let response = http
        .execute(request)
        .await
        .map_err(|error| SourceError::from_http(upstream, &error))?;

    if !response.is_success() {
        return Err(SourceError::from_status(upstream, &response));
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn excluded_codes_are_dropped() {
        let mut table = TableBuilder::new("test");
        table.insert("BTC", dec!(1)).expect("excluded");
        table.insert("dash", dec!(1)).expect("excluded");
        table.insert("USD", dec!(30)).expect("valid");

        let batch = table.finish(SourceId::DashRates).expect("non-empty");
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn duplicates_and_bad_rates_fail_the_table() {
        let mut table = TableBuilder::new("test");
        table.insert("USD", dec!(30)).expect("valid");
        assert!(table.insert("usd", dec!(31)).is_err());
        assert!(table.insert("EUR", dec!(0)).is_err());
        assert!(table.insert("EURO$", dec!(1)).is_err());
    }

    #[test]
    fn lone_vef_is_renamed_to_ves() {
        let mut table = TableBuilder::new("test");
        table.insert("VEF", dec!(1000)).expect("valid");

        let batch = table.finish(SourceId::DashRates).expect("non-empty");
        assert!(batch.get("VEF").is_none());
        assert_eq!(batch.get("VES").map(|rate| rate.rate), Some(dec!(1000)));
    }

    #[test]
    fn ves_wins_over_vef() {
        let mut table = TableBuilder::new("test");
        table.insert("VEF", dec!(1000)).expect("valid");
        table.insert("VES", dec!(5)).expect("valid");

        let batch = table.finish(SourceId::DashRates).expect("non-empty");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.get("VES").map(|rate| rate.rate), Some(dec!(5)));
    }

    #[test]
    fn override_replaces_ves_and_removes_vef() {
        let mut table = TableBuilder::new("test");
        table.insert("VEF", dec!(1000)).expect("valid");
        table.insert("USD", dec!(30)).expect("valid");
        table.override_rate(ExchangeRate::parse("VES", "77").expect("valid"));

        let batch = table.finish(SourceId::FirstFallback).expect("non-empty");
        let codes = batch
            .rates
            .iter()
            .map(|rate| rate.currency_code.as_str())
            .collect::<Vec<_>>();
        assert_eq!(codes, vec!["USD", "VES"]);
        assert_eq!(batch.get("VES").map(|rate| rate.rate), Some(dec!(77)));
    }

    #[test]
    fn empty_table_is_a_fetch_error() {
        let table = TableBuilder::new("test");
        let error = table.finish(SourceId::DashRates).expect_err("empty");
        assert_eq!(error.code(), "source.fetch");
    }

    #[test]
    fn reads_numbers_and_strings() {
        assert_eq!(
            decimal_from_json(&serde_json::json!(12.5)).expect("number"),
            dec!(12.5)
        );
        assert_eq!(
            decimal_from_json(&serde_json::json!("0.00123")).expect("string"),
            dec!(0.00123)
        );
        assert!(decimal_from_json(&serde_json::json!(null)).is_err());
    }
}
