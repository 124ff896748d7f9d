//! Rate source contract and the structured error every remote call maps into.
//!
//! ```rust,ignore
//! use dashfeed_core::{RateSource, SourceError};
//!
//! async fn print_usd(source: &dyn RateSource) -> Result<(), SourceError> {
//!     let batch = source.fetch_rates().await?;
//!     println!("{:?}", batch.get("USD"));
//!     Ok(())
//! }
//! ```

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::http_client::{HttpError, HttpResponse};
use crate::{ExchangeRate, SourceId, ValidationError};

/// Remote-call error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
    Fetch,
    Network,
    Auth,
    OtpRequired,
    InvalidRequest,
    Internal,
}

/// Structured error returned by rate sources, explorers and Uphold calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    pub fn fetch(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Fetch,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Network,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Auth,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn otp_required(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::OtpRequired,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    /// Map a transport failure for the named upstream.
    pub fn from_http(upstream: &str, error: &HttpError) -> Self {
        if error.retryable() {
            Self::network(format!("{upstream} transport error: {}", error.message()))
        } else {
            Self::internal(format!("{upstream} transport error: {}", error.message()))
        }
    }

    /// Map a non-2xx response for the named upstream.
    pub fn from_status(upstream: &str, response: &HttpResponse) -> Self {
        Self::fetch(format!(
            "{upstream} upstream returned status {}",
            response.status
        ))
    }

    pub fn from_validation(upstream: &str, error: &ValidationError) -> Self {
        Self::fetch(format!("{upstream} returned invalid data: {error}"))
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Fetch => "source.fetch",
            SourceErrorKind::Network => "source.network",
            SourceErrorKind::Auth => "source.auth",
            SourceErrorKind::OtpRequired => "source.otp_required",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

/// A complete rate table from one source. Sorted by code, codes unique, never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateBatch {
    pub source: SourceId,
    pub rates: Vec<ExchangeRate>,
}

impl RateBatch {
    pub fn get(&self, code: &str) -> Option<&ExchangeRate> {
        self.rates
            .iter()
            .find(|rate| rate.currency_code.as_str().eq_ignore_ascii_case(code))
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

pub type RateFuture<'a> = Pin<Box<dyn Future<Output = Result<RateBatch, SourceError>> + Send + 'a>>;

/// One external pricing API.
pub trait RateSource: Send + Sync {
    fn id(&self) -> SourceId;
    fn fetch_rates<'a>(&'a self) -> RateFuture<'a>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(SourceError::fetch("x").code(), "source.fetch");
        assert_eq!(SourceError::network("x").code(), "source.network");
        assert_eq!(SourceError::otp_required("x").code(), "source.otp_required");
    }

    #[test]
    fn only_transient_kinds_are_retryable() {
        assert!(SourceError::fetch("x").retryable());
        assert!(SourceError::network("x").retryable());
        assert!(!SourceError::auth("x").retryable());
        assert!(!SourceError::otp_required("x").retryable());
    }

    #[test]
    fn transport_errors_keep_retryability() {
        let transient = SourceError::from_http("bitpay", &HttpError::new("timeout"));
        assert_eq!(transient.kind(), SourceErrorKind::Network);

        let fatal = SourceError::from_http("bitpay", &HttpError::non_retryable("bad url"));
        assert_eq!(fatal.kind(), SourceErrorKind::Internal);
    }
}
