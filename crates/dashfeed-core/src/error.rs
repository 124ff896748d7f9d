use thiserror::Error;

/// Validation and contract errors exposed by `dashfeed-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("currency code must be 3-5 ASCII letters or digits: '{value}'")]
    InvalidCurrency { value: String },
    #[error("rate for '{currency}' must be positive: '{value}'")]
    NonPositiveRate { currency: String, value: String },
    #[error("invalid decimal value '{value}'")]
    InvalidDecimal { value: String },

    #[error(
        "invalid source '{value}', expected one of dashretail, dashrates, first-fallback, second-fallback"
    )]
    InvalidSource { value: String },
    #[error("invalid network '{value}', expected mainnet, testnet or devnet-<name>")]
    InvalidNetwork { value: String },

    #[error("transaction hash must be 64 hex characters: '{value}'")]
    InvalidTxHash { value: String },
    #[error("script must be hex encoded: '{value}'")]
    InvalidScript { value: String },
    #[error("address cannot be empty")]
    EmptyAddress,

    #[error("invalid electrum server '{line}': {reason}")]
    InvalidElectrumServer { line: String, reason: String },
    #[error("certificate fingerprint must be 64 hex characters: '{value}'")]
    InvalidFingerprint { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("invalid value '{value}' for preference '{key}'")]
    InvalidPreference { key: String, value: String },
    #[error("unknown preference '{key}'")]
    UnknownPreference { key: String },

    #[error("invalid configuration {name}='{value}'")]
    InvalidConfig { name: &'static str, value: String },

    #[error("request id must be at least 8 characters")]
    InvalidRequestId,
    #[error("error code cannot be empty")]
    EmptyErrorCode,
    #[error("error message cannot be empty")]
    EmptyErrorMessage,
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] dashfeed_store::StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
