use std::sync::Arc;

use serde_json::Value;

use crate::http_client::HttpClient;
use crate::rate_source::{RateFuture, RateSource, SourceError};
use crate::sources::{decimal_from_json, fetch_json, TableBuilder};
use crate::SourceId;

pub const DASH_RETAIL_URL: &str = "https://rates2.dashretail.org/rates?source=dashretail";

/// DashRetail list of `{symbol, baseCurrency, quoteCurrency, price}` entries.
///
/// Only `DASH/<fiat>` pairs are read; pairs quoted against another base are skipped.
#[derive(Clone)]
pub struct DashRetailSource {
    http: Arc<dyn HttpClient>,
    url: String,
    timeout_ms: u64,
}

impl DashRetailSource {
    pub fn new(http: Arc<dyn HttpClient>, timeout_ms: u64) -> Self {
        Self {
            http,
            url: String::from(DASH_RETAIL_URL),
            timeout_ms,
        }
    }
}

impl RateSource for DashRetailSource {
    fn id(&self) -> SourceId {
        SourceId::DashRetail
    }

    fn fetch_rates<'a>(&'a self) -> RateFuture<'a> {
        Box::pin(async move {
            let payload = fetch_json(self.http.as_ref(), "dashretail", &self.url, self.timeout_ms).await?;
            parse_dash_retail(&payload)
        })
    }
}

pub fn parse_dash_retail(payload: &Value) -> Result<crate::RateBatch, SourceError> {
    let entries = payload
        .as_array()
        .ok_or_else(|| SourceError::fetch("dashretail payload is not a list"))?;

    let mut table = TableBuilder::new("dashretail");
    for entry in entries {
        let base = entry
            .get("baseCurrency")
            .and_then(Value::as_str)
            .ok_or_else(|| SourceError::fetch("dashretail entry is missing baseCurrency"))?;
        if !base.eq_ignore_ascii_case("DASH") {
            continue;
        }

        let quote = entry
            .get("quoteCurrency")
            .and_then(Value::as_str)
            .ok_or_else(|| SourceError::fetch("dashretail entry is missing quoteCurrency"))?;
        let price = entry
            .get("price")
            .ok_or_else(|| SourceError::fetch(format!("dashretail entry {quote} is missing price")))
            .and_then(|value| {
                decimal_from_json(value)
                    .map_err(|error| SourceError::from_validation("dashretail", &error))
            })?;

        table.insert(quote, price)?;
    }

    table.finish(SourceId::DashRetail)
}
