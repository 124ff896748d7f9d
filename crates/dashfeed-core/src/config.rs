//! Runtime configuration read from `DASHFEED_*` environment variables.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use dashfeed_store::{resolve_dashfeed_home, StoreConfig};

use crate::balance::electrum::{self, ElectrumServer};
use crate::balance::NetworkFlavor;
use crate::cache::DEFAULT_REFRESH_INTERVAL;
use crate::http_client::HttpRequest;
use crate::uphold::{UpholdConfig, DEFAULT_BASE_URL};
use crate::{CoreError, CurrencyCode, ValidationError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub home: PathBuf,
    pub network: NetworkFlavor,
    pub refresh_interval: Duration,
    pub http_timeout_ms: u64,
    /// Custom Electrum server list; the bundled list is used when unset.
    pub electrum_servers_path: Option<PathBuf>,
    pub electrum_timeout: Duration,
    pub cryptoid_key: Option<String>,
    pub uphold_client_id: Option<String>,
    pub uphold_client_secret: Option<String>,
    pub uphold_base_url: String,
    pub default_currency: CurrencyCode,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        let read_either = |primary: &str, fallback: &str| read(primary).or_else(|| read(fallback));

        let home = read("DASHFEED_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(resolve_dashfeed_home);

        let network = match read("DASHFEED_NETWORK") {
            Some(value) => value.parse()?,
            None => NetworkFlavor::default(),
        };

        let refresh_secs = parse_u64(
            "DASHFEED_RATE_REFRESH_SECS",
            read("DASHFEED_RATE_REFRESH_SECS"),
            DEFAULT_REFRESH_INTERVAL.as_secs(),
        )?;
        let http_timeout_ms = parse_u64(
            "DASHFEED_HTTP_TIMEOUT_MS",
            read("DASHFEED_HTTP_TIMEOUT_MS"),
            HttpRequest::DEFAULT_TIMEOUT_MS,
        )?;
        let electrum_timeout_ms = parse_u64(
            "DASHFEED_ELECTRUM_TIMEOUT_MS",
            read("DASHFEED_ELECTRUM_TIMEOUT_MS"),
            duration_ms(electrum::DEFAULT_TIMEOUT),
        )?;

        let default_currency = match read("DASHFEED_DEFAULT_CURRENCY") {
            Some(value) => CurrencyCode::parse(&value).map_err(|_| ValidationError::InvalidConfig {
                name: "DASHFEED_DEFAULT_CURRENCY",
                value,
            })?,
            None => CurrencyCode::parse("USD")?,
        };

        Ok(Self {
            home,
            network,
            refresh_interval: Duration::from_secs(refresh_secs),
            http_timeout_ms,
            electrum_servers_path: read("DASHFEED_ELECTRUM_SERVERS").map(PathBuf::from),
            electrum_timeout: Duration::from_millis(electrum_timeout_ms),
            cryptoid_key: read_either("DASHFEED_CRYPTOID_KEY", "CRYPTOID_API_KEY"),
            uphold_client_id: read_either("DASHFEED_UPHOLD_CLIENT_ID", "UPHOLD_CLIENT_ID"),
            uphold_client_secret: read_either("DASHFEED_UPHOLD_CLIENT_SECRET", "UPHOLD_CLIENT_SECRET"),
            uphold_base_url: read("DASHFEED_UPHOLD_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()),
            default_currency,
        })
    }

    pub fn with_network(mut self, network: NetworkFlavor) -> Self {
        self.network = network;
        self
    }

    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = home.into();
        self
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::in_home(&self.home)
    }

    /// Uphold credentials, when both halves are configured.
    pub fn uphold(&self) -> Option<UpholdConfig> {
        let id = self.uphold_client_id.as_ref()?;
        let secret = self.uphold_client_secret.as_ref()?;
        let mut config = UpholdConfig::new(id, secret).with_base_url(&self.uphold_base_url);
        config.timeout_ms = self.http_timeout_ms;
        Some(config)
    }

    /// Servers from the configured file, else the bundled list for the network.
    pub fn electrum_servers(&self) -> Result<Vec<ElectrumServer>, CoreError> {
        match &self.electrum_servers_path {
            Some(path) => {
                let text = fs::read_to_string(path)?;
                Ok(electrum::parse_server_list(&text, &self.network)?)
            }
            None => Ok(electrum::default_servers(&self.network)),
        }
    }
}

fn parse_u64(name: &'static str, value: Option<String>, default: u64) -> Result<u64, ValidationError> {
    match value {
        None => Ok(default),
        Some(value) => match value.parse::<u64>() {
            Ok(parsed) if parsed > 0 => Ok(parsed),
            _ => Err(ValidationError::InvalidConfig { name, value }),
        },
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ValidationError> {
        let vars = vars
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect::<HashMap<_, _>>();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config(&[("DASHFEED_HOME", "/tmp/dashfeed-home")]).expect("config");

        assert_eq!(config.home, PathBuf::from("/tmp/dashfeed-home"));
        assert_eq!(config.network, NetworkFlavor::Mainnet);
        assert_eq!(config.refresh_interval, Duration::from_secs(30));
        assert_eq!(config.http_timeout_ms, 5_000);
        assert_eq!(config.electrum_timeout, Duration::from_secs(5));
        assert_eq!(config.default_currency.as_str(), "USD");
        assert_eq!(config.uphold_base_url, DEFAULT_BASE_URL);
        assert!(config.uphold().is_none());
    }

    #[test]
    fn unprefixed_fallbacks_are_read() {
        let config = config(&[
            ("CRYPTOID_API_KEY", "cid"),
            ("UPHOLD_CLIENT_ID", "id"),
            ("DASHFEED_UPHOLD_CLIENT_SECRET", "secret"),
            ("DASHFEED_UPHOLD_BASE_URL", "https://sandbox.test/"),
        ])
        .expect("config");

        assert_eq!(config.cryptoid_key.as_deref(), Some("cid"));
        let uphold = config.uphold().expect("uphold configured");
        assert_eq!(uphold.client_id, "id");
        assert_eq!(uphold.base_url, "https://sandbox.test");
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            config(&[("DASHFEED_RATE_REFRESH_SECS", "soon")]),
            Err(ValidationError::InvalidConfig {
                name: "DASHFEED_RATE_REFRESH_SECS",
                ..
            })
        ));
        assert!(matches!(
            config(&[("DASHFEED_NETWORK", "regtest")]),
            Err(ValidationError::InvalidNetwork { .. })
        ));
        assert!(matches!(
            config(&[("DASHFEED_DEFAULT_CURRENCY", "$")]),
            Err(ValidationError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn reads_custom_server_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("servers.txt");
        fs::write(&path, "# local\ntcp:127.0.0.1:50001\n").expect("write");

        let config = config(&[("DASHFEED_ELECTRUM_SERVERS", path.to_str().expect("utf8"))])
            .expect("config");
        let servers = config.electrum_servers().expect("servers");

        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].to_string(), "tcp:127.0.0.1:50001");
    }
}
