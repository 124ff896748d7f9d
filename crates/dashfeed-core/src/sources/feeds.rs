//! Single-purpose upstream feeds combined by composite sources.

use rust_decimal::Decimal;
use serde_json::Value;

use crate::http_client::HttpClient;
use crate::rate_source::SourceError;
use crate::sources::{decimal_from_json, fetch_json};

pub const BITPAY_URL: &str = "https://bitpay.com/api/rates";
pub const BITCOINAVERAGE_BTC_URL: &str =
    "https://apiv2.bitcoinaverage.com/indices/global/ticker/short?crypto=BTC";
pub const DASHCENTRAL_URL: &str = "https://www.dashcentral.org/api/v1/public";
pub const POLONIEX_URL: &str =
    "https://poloniex.com/public?command=returnTradeHistory&currencyPair=BTC_DASH";
pub const BITCOINAVERAGE_DASHBTC_URL: &str =
    "https://apiv2.bitcoinaverage.com/indices/crypto/ticker/DASHBTC";
pub const LOCALBITCOINS_URL: &str = "https://localbitcoins.com/bitcoinaverage/ticker-all-currencies/";

/// Averages tried in order for the VES price.
const VES_AVERAGES: [&str; 4] = ["avg_1h", "avg_6h", "avg_12h", "avg_24h"];

/// Fiat-per-BTC table providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BtcTableFeed {
    BitPay,
    BitcoinAverage,
}

impl BtcTableFeed {
    pub const fn name(self) -> &'static str {
        match self {
            Self::BitPay => "bitpay",
            Self::BitcoinAverage => "bitcoinaverage",
        }
    }

    pub const fn url(self) -> &'static str {
        match self {
            Self::BitPay => BITPAY_URL,
            Self::BitcoinAverage => BITCOINAVERAGE_BTC_URL,
        }
    }

    /// Fetch `(fiat code, fiat per BTC)` pairs in upstream order.
    pub async fn fetch(
        self,
        http: &dyn HttpClient,
        timeout_ms: u64,
    ) -> Result<Vec<(String, Decimal)>, SourceError> {
        let payload = fetch_json(http, self.name(), self.url(), timeout_ms).await?;
        self.parse(&payload)
    }

    pub fn parse(self, payload: &Value) -> Result<Vec<(String, Decimal)>, SourceError> {
        match self {
            Self::BitPay => parse_bitpay(payload),
            Self::BitcoinAverage => parse_bitcoinaverage_btc(payload),
        }
    }
}

fn parse_bitpay(payload: &Value) -> Result<Vec<(String, Decimal)>, SourceError> {
    let entries = payload
        .as_array()
        .ok_or_else(|| SourceError::fetch("bitpay payload is not a list"))?;

    entries
        .iter()
        .map(|entry| {
            let code = entry
                .get("code")
                .and_then(Value::as_str)
                .ok_or_else(|| SourceError::fetch("bitpay entry is missing code"))?;
            let rate = entry
                .get("rate")
                .ok_or_else(|| SourceError::fetch(format!("bitpay entry {code} is missing rate")))
                .and_then(|value| {
                    decimal_from_json(value)
                        .map_err(|error| SourceError::from_validation("bitpay", &error))
                })?;
            Ok((code.to_owned(), rate))
        })
        .collect()
}

fn parse_bitcoinaverage_btc(payload: &Value) -> Result<Vec<(String, Decimal)>, SourceError> {
    let entries = payload
        .as_object()
        .ok_or_else(|| SourceError::fetch("bitcoinaverage payload is not an object"))?;

    entries
        .iter()
        .filter_map(|(symbol, ticker)| symbol.strip_prefix("BTC").map(|fiat| (fiat, ticker)))
        .map(|(fiat, ticker)| {
            let rate = ticker
                .get("last")
                .ok_or_else(|| {
                    SourceError::fetch(format!("bitcoinaverage ticker BTC{fiat} is missing last"))
                })
                .and_then(|value| {
                    decimal_from_json(value)
                        .map_err(|error| SourceError::from_validation("bitcoinaverage", &error))
                })?;
            Ok((fiat.to_owned(), rate))
        })
        .collect()
}

/// DASH/BTC price providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashBtcFeed {
    DashCentral,
    Poloniex,
    BitcoinAverage,
}

impl DashBtcFeed {
    pub const fn name(self) -> &'static str {
        match self {
            Self::DashCentral => "dashcentral",
            Self::Poloniex => "poloniex",
            Self::BitcoinAverage => "bitcoinaverage-dashbtc",
        }
    }

    pub const fn url(self) -> &'static str {
        match self {
            Self::DashCentral => DASHCENTRAL_URL,
            Self::Poloniex => POLONIEX_URL,
            Self::BitcoinAverage => BITCOINAVERAGE_DASHBTC_URL,
        }
    }

    /// Fetch BTC per one DASH.
    pub async fn fetch(self, http: &dyn HttpClient, timeout_ms: u64) -> Result<Decimal, SourceError> {
        let payload = fetch_json(http, self.name(), self.url(), timeout_ms).await?;
        self.parse(&payload)
    }

    pub fn parse(self, payload: &Value) -> Result<Decimal, SourceError> {
        let price = match self {
            Self::DashCentral => read_path(payload, &["exchange_rates", "btc_dash"], self.name())?,
            Self::Poloniex => volume_weighted_price(payload)?,
            Self::BitcoinAverage => read_path(payload, &["averages", "day"], self.name())?,
        };

        if price <= Decimal::ZERO {
            return Err(SourceError::fetch(format!(
                "{} returned non-positive DASH/BTC price {price}",
                self.name()
            )));
        }
        Ok(price)
    }
}

fn read_path(payload: &Value, path: &[&str], upstream: &str) -> Result<Decimal, SourceError> {
    let value = path
        .iter()
        .try_fold(payload, |node, key| node.get(key))
        .ok_or_else(|| SourceError::fetch(format!("{upstream} payload is missing {}", path.join("."))))?;

    decimal_from_json(value).map_err(|error| SourceError::from_validation(upstream, &error))
}

/// Sum of BTC traded over sum of DASH traded.
fn volume_weighted_price(payload: &Value) -> Result<Decimal, SourceError> {
    let trades = payload
        .as_array()
        .ok_or_else(|| SourceError::fetch("poloniex payload is not a list"))?;

    let mut total_btc = Decimal::ZERO;
    let mut total_dash = Decimal::ZERO;
    for trade in trades {
        let read = |field: &str| {
            trade
                .get(field)
                .ok_or_else(|| SourceError::fetch(format!("poloniex trade is missing {field}")))
                .and_then(|value| {
                    decimal_from_json(value)
                        .map_err(|error| SourceError::from_validation("poloniex", &error))
                })
        };
        total_btc += read("total")?;
        total_dash += read("amount")?;
    }

    if total_dash <= Decimal::ZERO {
        return Err(SourceError::fetch("poloniex returned no traded volume"));
    }

    total_btc
        .checked_div(total_dash)
        .ok_or_else(|| SourceError::fetch("poloniex volume overflowed"))
}

/// LocalBitcoins VES average, VES per one BTC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VesFeed;

impl VesFeed {
    pub const fn name(self) -> &'static str {
        "localbitcoins"
    }

    pub async fn fetch(self, http: &dyn HttpClient, timeout_ms: u64) -> Result<Decimal, SourceError> {
        let payload = fetch_json(http, self.name(), LOCALBITCOINS_URL, timeout_ms).await?;
        self.parse(&payload)
    }

    pub fn parse(self, payload: &Value) -> Result<Decimal, SourceError> {
        let ves = payload
            .get("VES")
            .ok_or_else(|| SourceError::fetch("localbitcoins payload is missing VES"))?;

        let value = VES_AVERAGES
            .iter()
            .find_map(|key| ves.get(*key).filter(|value| !value.is_null()))
            .ok_or_else(|| SourceError::fetch("localbitcoins VES entry has no average"))?;

        decimal_from_json(value).map_err(|error| SourceError::from_validation(self.name(), &error))
    }
}
