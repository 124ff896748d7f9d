use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Legacy code pairs as (legacy, current).
pub const LEGACY_CODES: [(&str, &str); 1] = [("VEF", "VES")];

/// Upper-case currency code, 3-5 ASCII alphanumerics.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub const MIN_LEN: usize = 3;
    pub const MAX_LEN: usize = 5;

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let normalized = input.trim().to_ascii_uppercase();
        let valid_len = (Self::MIN_LEN..=Self::MAX_LEN).contains(&normalized.len());
        if !valid_len || !normalized.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            return Err(ValidationError::InvalidCurrency {
                value: input.to_owned(),
            });
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Current code for a legacy one, if this code has been superseded.
    pub fn successor(&self) -> Option<Self> {
        LEGACY_CODES
            .iter()
            .find(|(legacy, _)| *legacy == self.0)
            .map(|(_, current)| Self((*current).to_owned()))
    }
}

impl Display for CurrencyCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CurrencyCode {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(value: CurrencyCode) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        let code = CurrencyCode::parse(" usd ").expect("valid code");
        assert_eq!(code.as_str(), "USD");
    }

    #[test]
    fn rejects_bad_lengths_and_symbols() {
        for value in ["US", "TOOLONG", "U$D", ""] {
            assert!(CurrencyCode::parse(value).is_err(), "{value} should fail");
        }
    }

    #[test]
    fn vef_is_superseded_by_ves() {
        let legacy = CurrencyCode::parse("VEF").expect("valid code");
        assert_eq!(legacy.successor().map(String::from).as_deref(), Some("VES"));
        assert!(CurrencyCode::parse("USD").expect("valid").successor().is_none());
    }
}
