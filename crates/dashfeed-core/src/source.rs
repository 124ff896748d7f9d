use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Canonical rate source identifiers, in default fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceId {
    #[serde(rename = "dashretail")]
    DashRetail,
    #[serde(rename = "dashrates")]
    DashRates,
    FirstFallback,
    SecondFallback,
}

impl SourceId {
    pub const ALL: [Self; 4] = [
        Self::DashRetail,
        Self::DashRates,
        Self::FirstFallback,
        Self::SecondFallback,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DashRetail => "dashretail",
            Self::DashRates => "dashrates",
            Self::FirstFallback => "first-fallback",
            Self::SecondFallback => "second-fallback",
        }
    }

    /// Upstream feeds a source combines, for `sources` output.
    pub const fn upstreams(self) -> &'static [&'static str] {
        match self {
            Self::DashRetail => &["rates2.dashretail.org"],
            Self::DashRates => &["api.get-spark.com"],
            Self::FirstFallback => &["bitpay.com", "dashcentral.org", "localbitcoins.com"],
            Self::SecondFallback => &[
                "bitcoinaverage.com",
                "poloniex.com",
                "localbitcoins.com",
            ],
        }
    }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dashretail" => Ok(Self::DashRetail),
            "dashrates" => Ok(Self::DashRates),
            "first-fallback" => Ok(Self::FirstFallback),
            "second-fallback" => Ok(Self::SecondFallback),
            other => Err(ValidationError::InvalidSource {
                value: other.to_owned(),
            }),
        }
    }
}
