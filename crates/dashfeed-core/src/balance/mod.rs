//! Address balance lookup: Electrum first, block explorers after.

pub mod electrum;
pub mod explorer;
pub mod tls;

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use thiserror::Error;
use tokio::sync::{oneshot, Mutex};
use tracing::{info, warn};

use crate::fallback::{ChainFailure, FallbackChain};
use crate::rate_source::SourceError;
use crate::worker::BackgroundWorker;
use crate::{total_value, Utxo, ValidationError};

pub use electrum::{ElectrumClient, ElectrumServer, Transport};
pub use explorer::{BlockExplorer, UnspentApi};

/// Network the wallet runs against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum NetworkFlavor {
    #[default]
    Mainnet,
    Testnet,
    Devnet(String),
}

impl NetworkFlavor {
    pub fn default_electrum_port(&self, transport: Transport) -> u16 {
        match (self, transport) {
            (Self::Mainnet, Transport::Tcp) => 50001,
            (Self::Mainnet, Transport::Tls) => 50002,
            (_, Transport::Tcp) => 51001,
            (_, Transport::Tls) => 51002,
        }
    }
}

impl Display for NetworkFlavor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mainnet => f.write_str("mainnet"),
            Self::Testnet => f.write_str("testnet"),
            Self::Devnet(name) => write!(f, "devnet-{name}"),
        }
    }
}

impl FromStr for NetworkFlavor {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "mainnet" | "main" => Ok(Self::Mainnet),
            "testnet" | "test" => Ok(Self::Testnet),
            other => other
                .strip_prefix("devnet-")
                .filter(|name| {
                    !name.is_empty()
                        && name
                            .chars()
                            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-')
                })
                .map(|name| Self::Devnet(name.to_owned()))
                .ok_or_else(|| ValidationError::InvalidNetwork {
                    value: value.to_owned(),
                }),
        }
    }
}

impl Serialize for NetworkFlavor {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Where a balance came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum BalanceOrigin {
    Electrum(String),
    Explorer(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressBalance {
    pub address: String,
    pub utxos: Vec<Utxo>,
    pub total_duffs: u64,
    pub origin: BalanceOrigin,
    pub warnings: Vec<String>,
}

#[derive(Debug, Error)]
pub enum BalanceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("no electrum servers or block explorers configured")]
    NoServers,

    #[error("cannot connect to any block explorer for unspent outputs")]
    Exhausted {
        electrum: Option<SourceError>,
        failure: ChainFailure,
    },

    #[error("balance request was dropped before completing")]
    Cancelled,
}

/// Balance lookups for one network.
pub struct BalanceService {
    network: NetworkFlavor,
    servers: Vec<ElectrumServer>,
    electrum: ElectrumClient,
    explorers: Mutex<FallbackChain<BlockExplorer>>,
}

impl BalanceService {
    pub fn new(
        network: NetworkFlavor,
        servers: Vec<ElectrumServer>,
        electrum: ElectrumClient,
        explorers: Vec<Arc<BlockExplorer>>,
    ) -> Self {
        Self {
            network,
            servers,
            electrum,
            explorers: Mutex::new(FallbackChain::new(explorers)),
        }
    }

    pub fn network(&self) -> &NetworkFlavor {
        &self.network
    }

    pub fn servers(&self) -> &[ElectrumServer] {
        &self.servers
    }

    pub async fn request_balance(&self, address: &str) -> Result<AddressBalance, BalanceError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(ValidationError::EmptyAddress.into());
        }

        let mut warnings = Vec::new();
        let electrum_error = match self.pick_server() {
            Some(server) => match self.electrum.list_unspent(server, address).await {
                Ok(utxos) => {
                    info!(server = %server, count = utxos.len(), "electrum returned unspent outputs");
                    return Ok(balance(address, utxos, BalanceOrigin::Electrum(server.to_string()), warnings));
                }
                Err(error) => {
                    warn!(server = %server, code = error.code(), "electrum query failed, trying block explorers: {}", error.message());
                    warnings.push(format!("electrum server {server} failed: {}", error.message()));
                    Some(error)
                }
            },
            None => None,
        };

        let mut explorers = self.explorers.lock().await;
        if self.servers.is_empty() && explorers.is_empty() {
            return Err(BalanceError::NoServers);
        }

        let owned = address.to_owned();
        match explorers
            .run_cycle(|explorer| explorer.unspent_outputs(owned.clone()))
            .await
        {
            Ok(success) => {
                warnings.extend(success.warnings);
                Ok(balance(address, success.data, BalanceOrigin::Explorer(success.selected), warnings))
            }
            Err(failure) => Err(BalanceError::Exhausted {
                electrum: electrum_error,
                failure,
            }),
        }
    }

    /// Run the lookup on the worker; the result arrives on the returned channel.
    pub fn request_in_background(
        self: &Arc<Self>,
        worker: &BackgroundWorker,
        address: impl Into<String>,
    ) -> oneshot::Receiver<Result<AddressBalance, BalanceError>> {
        let (sender, receiver) = oneshot::channel();
        let service = Arc::clone(self);
        let address = address.into();
        worker.submit(async move {
            let result = service.request_balance(&address).await;
            let _ = sender.send(result);
        });
        receiver
    }

    fn pick_server(&self) -> Option<&ElectrumServer> {
        if self.servers.is_empty() {
            return None;
        }
        self.servers.get(fastrand::usize(..self.servers.len()))
    }
}

fn balance(
    address: &str,
    utxos: Vec<Utxo>,
    origin: BalanceOrigin,
    warnings: Vec<String>,
) -> AddressBalance {
    AddressBalance {
        address: address.to_owned(),
        total_duffs: total_value(&utxos),
        utxos,
        origin,
        warnings,
    }
}
