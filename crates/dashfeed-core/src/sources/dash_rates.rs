use std::sync::Arc;

use serde_json::Value;

use crate::http_client::HttpClient;
use crate::rate_source::{RateBatch, RateFuture, RateSource, SourceError};
use crate::sources::{decimal_from_json, fetch_json, TableBuilder};
use crate::SourceId;

pub const DASH_RATES_URL: &str = "https://api.get-spark.com/list";

/// DashRates `{CODE: rate}` map.
#[derive(Clone)]
pub struct DashRatesSource {
    http: Arc<dyn HttpClient>,
    url: String,
    timeout_ms: u64,
}

impl DashRatesSource {
    pub fn new(http: Arc<dyn HttpClient>, timeout_ms: u64) -> Self {
        Self {
            http,
            url: String::from(DASH_RATES_URL),
            timeout_ms,
        }
    }
}

impl RateSource for DashRatesSource {
    fn id(&self) -> SourceId {
        SourceId::DashRates
    }

    fn fetch_rates<'a>(&'a self) -> RateFuture<'a> {
        Box::pin(async move {
            let payload = fetch_json(self.http.as_ref(), "dashrates", &self.url, self.timeout_ms).await?;
            parse_dash_rates(&payload)
        })
    }
}

pub fn parse_dash_rates(payload: &Value) -> Result<RateBatch, SourceError> {
    let entries = payload
        .as_object()
        .ok_or_else(|| SourceError::fetch("dashrates payload is not an object"))?;

    let mut table = TableBuilder::new("dashrates");
    for (code, value) in entries {
        let rate = decimal_from_json(value)
            .map_err(|error| SourceError::from_validation("dashrates", &error))?;
        table.insert(code, rate)?;
    }

    table.finish(SourceId::DashRates)
}
