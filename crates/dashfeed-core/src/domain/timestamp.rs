use std::fmt::{Display, Formatter};

use serde::{Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

use crate::ValidationError;

/// Instant in UTC, stored and displayed as RFC3339.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtcDateTime(OffsetDateTime);

impl UtcDateTime {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    /// Parse RFC3339 text; only a `Z` or `+00:00` offset is accepted.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        OffsetDateTime::parse(input.trim(), &Rfc3339)
            .ok()
            .filter(|value| value.offset() == UtcOffset::UTC)
            .map(Self)
            .ok_or_else(|| ValidationError::TimestampNotUtc {
                value: input.to_owned(),
            })
    }

    /// Out-of-range input clamps to the epoch.
    pub fn from_unix_millis(millis: u64) -> Self {
        let nanos = i128::from(millis) * 1_000_000;
        Self(OffsetDateTime::from_unix_timestamp_nanos(nanos).unwrap_or(OffsetDateTime::UNIX_EPOCH))
    }

    pub fn unix_millis(self) -> u64 {
        u64::try_from(self.0.unix_timestamp_nanos() / 1_000_000).unwrap_or(0)
    }

    pub fn format_rfc3339(self) -> String {
        // Years outside 0..=9999 cannot be written as RFC3339.
        self.0
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.0.unix_timestamp().to_string())
    }
}

impl Display for UtcDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_rfc3339())
    }
}

impl Serialize for UtcDateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_stamps_parse_back() {
        let parsed = UtcDateTime::parse("2026-01-01T00:00:00Z").expect("utc");
        assert_eq!(parsed.format_rfc3339(), "2026-01-01T00:00:00Z");
        assert!(UtcDateTime::parse("2026-01-01T00:00:00+00:00").is_ok());
    }

    #[test]
    fn offsets_other_than_utc_are_rejected() {
        assert!(matches!(
            UtcDateTime::parse("2026-01-01T01:00:00+01:00"),
            Err(ValidationError::TimestampNotUtc { .. })
        ));
        assert!(UtcDateTime::parse("yesterday").is_err());
    }

    #[test]
    fn unix_millis_survive_conversion() {
        let stamp = UtcDateTime::from_unix_millis(1_704_067_200_123);
        assert_eq!(stamp.unix_millis(), 1_704_067_200_123);
        assert_eq!(stamp.to_string(), "2024-01-01T00:00:00.123Z");
    }
}
