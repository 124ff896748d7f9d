use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{CurrencyCode, ValidationError};

/// Decimal places kept for every stored rate.
pub const RATE_SCALE: u32 = 8;

/// Fiat amount per one DASH.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub currency_code: CurrencyCode,
    #[serde(with = "rust_decimal::serde::str")]
    pub rate: Decimal,
}

impl ExchangeRate {
    pub fn new(currency_code: CurrencyCode, rate: Decimal) -> Result<Self, ValidationError> {
        let rounded = rate.round_dp(RATE_SCALE).normalize();
        if rounded <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveRate {
                currency: currency_code.to_string(),
                value: rate.to_string(),
            });
        }

        Ok(Self {
            currency_code,
            rate: rounded,
        })
    }

    pub fn parse(code: &str, rate: &str) -> Result<Self, ValidationError> {
        Self::new(CurrencyCode::parse(code)?, parse_decimal(rate)?)
    }
}

/// Parse plain or scientific decimal text.
pub fn parse_decimal(input: &str) -> Result<Decimal, ValidationError> {
    let trimmed = input.trim();
    let parsed = if trimmed.contains(['e', 'E']) {
        Decimal::from_scientific(trimmed)
    } else {
        Decimal::from_str(trimmed)
    };

    parsed.map_err(|_| ValidationError::InvalidDecimal {
        value: input.to_owned(),
    })
}
