use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tracing::debug;

use crate::balance::{tls, NetworkFlavor};
use crate::rate_source::SourceError;
use crate::{normalize_utxos, Utxo, ValidationError};

pub const MAINNET_SERVERS: &str = include_str!("../../assets/electrum-servers.txt");
pub const TESTNET_SERVERS: &str = include_str!("../../assets/electrum-servers-testnet.txt");

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest response line accepted from a server.
pub const MAX_RESPONSE_BYTES: u64 = 4 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
    Tls,
}

impl Transport {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Tls => "tls",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ElectrumServer {
    pub transport: Transport,
    pub host: String,
    pub port: u16,
    pub fingerprint: Option<String>,
}

impl ElectrumServer {
    /// Parse `type:host[:port[:fingerprint]]`. Blank and `#` lines yield `None`.
    pub fn parse_line(line: &str, network: &NetworkFlavor) -> Result<Option<Self>, ValidationError> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(None);
        }

        let invalid = |reason: &str| ValidationError::InvalidElectrumServer {
            line: trimmed.to_owned(),
            reason: reason.to_owned(),
        };

        let mut parts = trimmed.splitn(4, ':');
        let transport = match parts.next().map(str::to_ascii_lowercase).as_deref() {
            Some("tcp") => Transport::Tcp,
            Some("tls") => Transport::Tls,
            _ => return Err(invalid("type must be tcp or tls")),
        };

        let host = parts
            .next()
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .ok_or_else(|| invalid("missing host"))?
            .to_owned();

        let port = match parts.next().map(str::trim).filter(|port| !port.is_empty()) {
            Some(port) => port
                .parse::<u16>()
                .ok()
                .filter(|port| *port > 0)
                .ok_or_else(|| invalid("port must be 1-65535"))?,
            None => network.default_electrum_port(transport),
        };

        // Fingerprints are often written colon-separated.
        let fingerprint = match parts.next().map(str::trim).filter(|value| !value.is_empty()) {
            Some(value) => {
                let compact = value.replace(':', "").to_ascii_lowercase();
                if compact.len() != 64 || !compact.chars().all(|ch| ch.is_ascii_hexdigit()) {
                    return Err(ValidationError::InvalidFingerprint {
                        value: value.to_owned(),
                    });
                }
                if transport == Transport::Tcp {
                    return Err(invalid("fingerprint requires tls"));
                }
                Some(compact)
            }
            None => None,
        };

        Ok(Some(Self {
            transport,
            host,
            port,
            fingerprint,
        }))
    }
}

impl Display for ElectrumServer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.transport.as_str(), self.host, self.port)
    }
}

/// Parse a whole server list. One bad line rejects the list.
pub fn parse_server_list(
    text: &str,
    network: &NetworkFlavor,
) -> Result<Vec<ElectrumServer>, ValidationError> {
    let mut servers = Vec::new();
    for line in text.lines() {
        if let Some(server) = ElectrumServer::parse_line(line, network)? {
            servers.push(server);
        }
    }
    Ok(servers)
}

/// Bundled server list for a network. Devnets have none.
pub fn default_servers(network: &NetworkFlavor) -> Vec<ElectrumServer> {
    let text = match network {
        NetworkFlavor::Mainnet => MAINNET_SERVERS,
        NetworkFlavor::Testnet => TESTNET_SERVERS,
        NetworkFlavor::Devnet(_) => return Vec::new(),
    };
    // The bundled lists are covered by tests; a bad entry only disables Electrum.
    parse_server_list(text, network).unwrap_or_default()
}

/// Line-delimited JSON-RPC client for `blockchain.address.listunspent`.
#[derive(Debug)]
pub struct ElectrumClient {
    timeout: Duration,
    next_id: AtomicU64,
}

impl Default for ElectrumClient {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl ElectrumClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Query one server. The timeout covers connect, handshake, write and read.
    pub async fn list_unspent(
        &self,
        server: &ElectrumServer,
        address: &str,
    ) -> Result<Vec<Utxo>, SourceError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "id": id,
            "method": "blockchain.address.listunspent",
            "params": [address],
        })
        .to_string();

        debug!(server = %server, id, "querying electrum server");
        let line = tokio::time::timeout(self.timeout, self.round_trip(server, &request))
            .await
            .map_err(|_| {
                SourceError::network(format!(
                    "electrum server {server} timed out after {}ms",
                    self.timeout.as_millis()
                ))
            })??;

        parse_listunspent_response(&line, id)
    }

    async fn round_trip(&self, server: &ElectrumServer, request: &str) -> Result<String, SourceError> {
        let stream = TcpStream::connect((server.host.as_str(), server.port))
            .await
            .map_err(|error| SourceError::network(format!("cannot connect to {server}: {error}")))?;

        match server.transport {
            Transport::Tcp => exchange_line(stream, request).await,
            Transport::Tls => {
                let connector = tls::connector(server.fingerprint.as_deref()).map_err(|error| {
                    SourceError::internal(format!("tls configuration failed: {error}"))
                })?;
                let name = ServerName::try_from(server.host.clone()).map_err(|error| {
                    SourceError::invalid_request(format!("invalid server name '{}': {error}", server.host))
                })?;
                let stream = connector.connect(name, stream).await.map_err(|error| {
                    SourceError::network(format!("tls handshake with {server} failed: {error}"))
                })?;
                exchange_line(stream, request).await
            }
        }
    }
}

/// Write one request line and read one response line.
pub async fn exchange_line<S>(stream: S, request: &str) -> Result<String, SourceError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    exchange_line_capped(stream, request, MAX_RESPONSE_BYTES).await
}

async fn exchange_line_capped<S>(
    mut stream: S,
    request: &str,
    max_bytes: u64,
) -> Result<String, SourceError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let io_error = |error: std::io::Error| SourceError::network(format!("electrum i/o error: {error}"));

    stream.write_all(request.as_bytes()).await.map_err(io_error)?;
    stream.write_all(b"\n").await.map_err(io_error)?;
    stream.flush().await.map_err(io_error)?;

    let mut reader = BufReader::new(stream).take(max_bytes);
    let mut line = String::new();
    let read = reader.read_line(&mut line).await.map_err(io_error)?;
    if read == 0 {
        return Err(SourceError::network("electrum server closed the connection"));
    }
    if !line.ends_with('\n') && reader.limit() == 0 {
        return Err(SourceError::fetch(format!(
            "electrum response exceeds {max_bytes} bytes"
        )));
    }
    Ok(line)
}

pub fn parse_listunspent_response(line: &str, expected_id: u64) -> Result<Vec<Utxo>, SourceError> {
    let payload: Value = serde_json::from_str(line.trim())
        .map_err(|error| SourceError::fetch(format!("electrum returned malformed JSON: {error}")))?;

    if let Some(error) = payload.get("error").filter(|error| !error.is_null()) {
        return Err(SourceError::fetch(format!("electrum returned error: {error}")));
    }

    let id = payload.get("id").and_then(Value::as_u64);
    if id != Some(expected_id) {
        return Err(SourceError::fetch(format!(
            "electrum response id {id:?} does not match request id {expected_id}"
        )));
    }

    let entries = payload
        .get("result")
        .and_then(Value::as_array)
        .ok_or_else(|| SourceError::fetch("electrum response has no result list"))?;

    let utxos = entries
        .iter()
        .map(|entry| {
            let tx_hash = entry.get("tx_hash").and_then(Value::as_str).unwrap_or_default();
            let output_index = entry
                .get("tx_pos")
                .and_then(Value::as_u64)
                .and_then(|value| u32::try_from(value).ok())
                .ok_or_else(|| SourceError::fetch("electrum utxo has no tx_pos"))?;
            let value = entry
                .get("value")
                .and_then(Value::as_u64)
                .ok_or_else(|| SourceError::fetch("electrum utxo has no value"))?;
            let height = entry
                .get("height")
                .and_then(Value::as_i64)
                .and_then(|height| u32::try_from(height).ok());

            Utxo::new(tx_hash, output_index, value, height, None)
                .map_err(|error| SourceError::from_validation("electrum", &error))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(normalize_utxos(utxos))
}
