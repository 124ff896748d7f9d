use std::fmt::{Display, Formatter};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::balance::NetworkFlavor;
use crate::fallback::{ChainMember, InvokeFuture};
use crate::http_client::{HttpClient, HttpRequest};
use crate::rate_source::SourceError;
use crate::{normalize_utxos, Utxo};

pub const INSIGHT_MAINNET_URL: &str = "https://insight.dash.org/insight-api/addr/";
pub const INSIGHT_TESTNET_URL: &str = "https://insight.testnet.networks.dash.org:3002/insight-api/addr/";
pub const CRYPTOID_MAINNET_URL: &str = "https://chainz.cryptoid.info/dash/api.dws?q=unspent";

const ABE_EMPTY_MARKER: &str = "No free outputs to spend";

/// Unspent-output API dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnspentApi {
    Insight,
    CryptoId,
    Abe,
}

impl UnspentApi {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insight => "insight",
            Self::CryptoId => "cryptoid",
            Self::Abe => "abe",
        }
    }
}

impl Display for UnspentApi {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP block explorer used when Electrum is unreachable.
pub struct BlockExplorer {
    api: UnspentApi,
    base_url: String,
    api_key: Option<String>,
    http: Arc<dyn HttpClient>,
    timeout_ms: u64,
}

impl BlockExplorer {
    pub fn new(
        api: UnspentApi,
        base_url: impl Into<String>,
        http: Arc<dyn HttpClient>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            api,
            base_url: base_url.into(),
            api_key: None,
            http,
            timeout_ms,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.trim().is_empty());
        self
    }

    pub fn api(&self) -> UnspentApi {
        self.api
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url_for(&self, address: &str) -> String {
        let address = urlencoding::encode(address);
        match self.api {
            UnspentApi::Insight => format!("{}{address}/utxo", self.base_url),
            UnspentApi::CryptoId => match &self.api_key {
                Some(key) => format!(
                    "{}&key={}&active={address}",
                    self.base_url,
                    urlencoding::encode(key)
                ),
                None => format!("{}&active={address}", self.base_url),
            },
            UnspentApi::Abe => format!("{}{address}", self.base_url),
        }
    }

    pub fn unspent_outputs(&self, address: String) -> InvokeFuture<'_, Vec<Utxo>> {
        Box::pin(async move {
            let request = HttpRequest::get(self.url_for(&address)).with_timeout_ms(self.timeout_ms);
            let response = self
                .http
                .execute(request)
                .await
                .map_err(|error| SourceError::from_http(self.api.as_str(), &error))?;

            if !response.is_success() {
                return Err(SourceError::from_status(self.api.as_str(), &response));
            }

            parse_unspent(self.api, &response.body)
        })
    }
}

impl ChainMember for BlockExplorer {
    fn member_name(&self) -> String {
        self.api.as_str().to_owned()
    }
}

/// Parse an explorer body into a normalized UTXO set.
pub fn parse_unspent(api: UnspentApi, body: &str) -> Result<Vec<Utxo>, SourceError> {
    if api == UnspentApi::Abe && body.trim_start().starts_with(ABE_EMPTY_MARKER) {
        return Err(SourceError::fetch(format!("{api} has no free outputs for this address")));
    }

    let payload: Value = serde_json::from_str(body).map_err(|error| {
        SourceError::fetch(format!("{api} returned malformed JSON: {error}"))
    })?;

    let entries = match api {
        UnspentApi::Insight => payload.as_array(),
        UnspentApi::CryptoId | UnspentApi::Abe => {
            payload.get("unspent_outputs").and_then(Value::as_array)
        }
    }
    .ok_or_else(|| SourceError::fetch(format!("{api} response has no unspent output list")))?;

    let utxos = entries
        .iter()
        .map(|entry| parse_entry(api, entry))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(normalize_utxos(utxos))
}

fn parse_entry(api: UnspentApi, entry: &Value) -> Result<Utxo, SourceError> {
    let (hash_field, index_field, value_field, height_field, script_field) = match api {
        UnspentApi::Insight => ("txid", "vout", "satoshis", Some("height"), Some("scriptPubKey")),
        // CryptoId really spells it "tx_ouput_n".
        UnspentApi::CryptoId => ("tx_hash", "tx_ouput_n", "value", None, Some("script")),
        UnspentApi::Abe => ("tx_hash", "tx_output_n", "value", Some("block_number"), Some("script")),
    };

    let tx_hash = entry
        .get(hash_field)
        .and_then(Value::as_str)
        .ok_or_else(|| SourceError::fetch(format!("{api} output is missing {hash_field}")))?;
    let output_index = read_u64(entry, index_field)
        .and_then(|value| u32::try_from(value).ok())
        .ok_or_else(|| SourceError::fetch(format!("{api} output is missing {index_field}")))?;
    let value = read_u64(entry, value_field)
        .ok_or_else(|| SourceError::fetch(format!("{api} output is missing {value_field}")))?;
    let height = height_field
        .and_then(|field| entry.get(field))
        .and_then(Value::as_i64)
        .and_then(|height| u32::try_from(height).ok());
    let script = script_field
        .and_then(|field| entry.get(field))
        .and_then(Value::as_str);

    Utxo::new(tx_hash, output_index, value, height, script)
        .map_err(|error| SourceError::from_validation(api.as_str(), &error))
}

/// Explorers report integers either as numbers or as strings.
fn read_u64(entry: &Value, field: &str) -> Option<u64> {
    match entry.get(field)? {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Default explorers for a network flavor, in fallback order.
pub fn explorers_for(
    network: &NetworkFlavor,
    http: Arc<dyn HttpClient>,
    cryptoid_key: Option<String>,
    timeout_ms: u64,
) -> Vec<Arc<BlockExplorer>> {
    match network {
        NetworkFlavor::Mainnet => vec![
            Arc::new(BlockExplorer::new(
                UnspentApi::Insight,
                INSIGHT_MAINNET_URL,
                Arc::clone(&http),
                timeout_ms,
            )),
            Arc::new(
                BlockExplorer::new(UnspentApi::CryptoId, CRYPTOID_MAINNET_URL, http, timeout_ms)
                    .with_api_key(cryptoid_key),
            ),
        ],
        NetworkFlavor::Testnet => vec![Arc::new(BlockExplorer::new(
            UnspentApi::Insight,
            INSIGHT_TESTNET_URL,
            http,
            timeout_ms,
        ))],
        NetworkFlavor::Devnet(name) => vec![Arc::new(BlockExplorer::new(
            UnspentApi::Insight,
            format!("http://insight.{name}.networks.dash.org:3002/insight-api/addr/"),
            http,
            timeout_ms,
        ))],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::ScriptedHttpClient;

    const HASH: &str = "0a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f9";

    fn explorer(api: UnspentApi, base: &str) -> BlockExplorer {
        BlockExplorer::new(api, base, Arc::new(ScriptedHttpClient::new()), 1_000)
    }

    #[test]
    fn builds_dialect_urls() {
        assert_eq!(
            explorer(UnspentApi::Insight, INSIGHT_MAINNET_URL).url_for("XabC"),
            "https://insight.dash.org/insight-api/addr/XabC/utxo"
        );
        assert_eq!(
            explorer(UnspentApi::CryptoId, CRYPTOID_MAINNET_URL)
                .with_api_key(Some(String::from("k1")))
                .url_for("XabC"),
            "https://chainz.cryptoid.info/dash/api.dws?q=unspent&key=k1&active=XabC"
        );
        assert_eq!(
            explorer(UnspentApi::CryptoId, CRYPTOID_MAINNET_URL).url_for("XabC"),
            "https://chainz.cryptoid.info/dash/api.dws?q=unspent&active=XabC"
        );
    }

    #[test]
    fn parses_insight_array() {
        let body = format!(
            r#"[{{"txid":"{HASH}","vout":1,"scriptPubKey":"76a914","satoshis":150000,"height":900}},
                {{"txid":"{HASH}","vout":0,"scriptPubKey":"76a914","satoshis":50}}]"#
        );
        let utxos = parse_unspent(UnspentApi::Insight, &body).expect("valid");
        assert_eq!(utxos.len(), 2);
        assert_eq!(utxos[0].output_index, 0);
        assert_eq!(utxos[0].height, None);
        assert_eq!(utxos[1].height, Some(900));
    }

    #[test]
    fn parses_cryptoid_misspelled_index() {
        let body = format!(
            r#"{{"unspent_outputs":[{{"tx_hash":"{HASH}","tx_ouput_n":3,"value":"4200"}}]}}"#
        );
        let utxos = parse_unspent(UnspentApi::CryptoId, &body).expect("valid");
        assert_eq!(utxos[0].output_index, 3);
        assert_eq!(utxos[0].value, 4200);
    }

    #[test]
    fn abe_empty_marker_fails_so_the_next_explorer_is_tried() {
        let error = parse_unspent(UnspentApi::Abe, "No free outputs to spend :(")
            .expect_err("no outputs");
        assert_eq!(error.code(), "source.fetch");

        let body = format!(
            r#"{{"unspent_outputs":[{{"tx_hash":"{HASH}","tx_output_n":0,"script":"a914","value":10,"block_number":12}}]}}"#
        );
        let utxos = parse_unspent(UnspentApi::Abe, &body).expect("valid");
        assert_eq!(utxos[0].script.as_deref(), Some("a914"));
    }

    #[test]
    fn malformed_body_is_a_fetch_error() {
        let error = parse_unspent(UnspentApi::Insight, "<html>").expect_err("not json");
        assert_eq!(error.code(), "source.fetch");
    }

    #[test]
    fn devnet_uses_named_insight_host() {
        let explorers = explorers_for(
            &NetworkFlavor::Devnet(String::from("mobile")),
            Arc::new(ScriptedHttpClient::new()),
            None,
            1_000,
        );
        assert_eq!(explorers.len(), 1);
        assert_eq!(
            explorers[0].base_url(),
            "http://insight.mobile.networks.dash.org:3002/insight-api/addr/"
        );
    }
}
