use std::fmt::{Display, Formatter};

use dashfeed_core::{EnvelopeMeta, ValidationError};
use serde::Serialize;
use uuid::Uuid;

/// Request identifier (UUID v4) stamped on every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Command metadata collected before the envelope is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub request_id: RequestId,
    pub network: String,
    pub source_chain: Vec<String>,
    pub latency_ms: u64,
    pub warnings: Vec<String>,
}

impl Metadata {
    pub fn new(network: impl Into<String>, source_chain: Vec<String>, latency_ms: u64) -> Self {
        Self {
            request_id: RequestId::new_v4(),
            network: network.into(),
            source_chain,
            latency_ms,
            warnings: Vec::new(),
        }
    }

    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn into_envelope_meta(self) -> Result<EnvelopeMeta, ValidationError> {
        let mut meta = EnvelopeMeta::new(
            self.request_id.to_string(),
            self.network,
            self.source_chain,
            self.latency_ms,
        )?;
        for warning in self.warnings {
            meta.push_warning(warning);
        }
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_is_uuid_v4() {
        let request_id = RequestId::new_v4();
        assert_eq!(request_id.0.get_version_num(), 4);
        assert_eq!(request_id.to_string().len(), 36);
    }

    #[test]
    fn warnings_carry_into_envelope_meta() {
        let mut metadata = Metadata::new("mainnet", vec![String::from("dashretail")], 12);
        metadata.push_warning("served from cache");

        let meta = metadata.into_envelope_meta().expect("valid");
        assert_eq!(meta.network, "mainnet");
        assert_eq!(meta.warnings, vec![String::from("served from cache")]);
        assert_eq!(meta.latency_ms, 12);
    }
}
