//! Core contracts for dashfeed.
//!
//! This crate contains:
//! - Exchange-rate and UTXO domain models with validation
//! - Rate sources and the ordered fallback chain that drives them
//! - The rate cache, repository and background worker
//! - Wallet balance lookup over Electrum with block-explorer fallback
//! - The Uphold client, typed preferences and runtime configuration

pub mod balance;
pub mod cache;
pub mod config;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod fallback;
pub mod http_client;
pub mod preferences;
pub mod rate_source;
pub mod repository;
pub mod source;
pub mod sources;
pub mod uphold;
pub mod worker;

pub use balance::{
    AddressBalance, BalanceError, BalanceOrigin, BalanceService, BlockExplorer, ElectrumClient,
    ElectrumServer, NetworkFlavor, Transport, UnspentApi,
};
pub use cache::{MemoryRateTable, PersistedRates, RateCache, RateSnapshot, RateTable};
pub use config::AppConfig;
pub use domain::{
    normalize_utxos, parse_decimal, total_value, CurrencyCode, ExchangeRate, UtcDateTime, Utxo,
    LEGACY_CODES, RATE_SCALE,
};
pub use envelope::{Envelope, EnvelopeError, EnvelopeMeta};
pub use error::{CoreError, ValidationError};
pub use fallback::{
    AttemptError, ChainFailure, ChainMember, ChainResult, ChainState, ChainSuccess, FallbackChain,
};
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, ReqwestHttpClient,
    ScriptedHttpClient,
};
pub use preferences::{MemoryPreferences, PreferenceBackend, PreferenceEntry, PreferenceKey, Preferences};
pub use rate_source::{RateBatch, RateSource, SourceError, SourceErrorKind};
pub use repository::{RateRepository, RateStatus, RefreshMode, RefreshOutcome, RefreshReport};
pub use source::SourceId;
pub use uphold::{UpholdCard, UpholdClient, UpholdConfig, UpholdError, UpholdTransaction};
pub use worker::BackgroundWorker;
