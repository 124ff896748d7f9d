use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// One unspent transaction output. `value` is in duffs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Utxo {
    pub tx_hash: String,
    pub output_index: u32,
    pub value: u64,
    /// `None` while unconfirmed.
    pub height: Option<u32>,
    pub script: Option<String>,
}

impl Utxo {
    pub fn new(
        tx_hash: &str,
        output_index: u32,
        value: u64,
        height: Option<u32>,
        script: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let tx_hash = tx_hash.trim().to_ascii_lowercase();
        if tx_hash.len() != 64 || !tx_hash.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(ValidationError::InvalidTxHash { value: tx_hash });
        }

        let script = match script.map(str::trim).filter(|value| !value.is_empty()) {
            Some(value) => {
                if value.len() % 2 != 0 || !value.chars().all(|ch| ch.is_ascii_hexdigit()) {
                    return Err(ValidationError::InvalidScript {
                        value: value.to_owned(),
                    });
                }
                Some(value.to_ascii_lowercase())
            }
            None => None,
        };

        Ok(Self {
            tx_hash,
            output_index,
            value,
            height: height.filter(|height| *height > 0),
            script,
        })
    }

    /// Outpoint identity: explorers may list the same output twice.
    fn outpoint(&self) -> (&str, u32) {
        (&self.tx_hash, self.output_index)
    }
}

/// Sort by outpoint and drop repeated outpoints, keeping the first seen.
pub fn normalize_utxos(mut utxos: Vec<Utxo>) -> Vec<Utxo> {
    utxos.sort_by(|left, right| left.outpoint().cmp(&right.outpoint()));
    utxos.dedup_by(|right, left| left.outpoint() == right.outpoint());
    utxos
}

pub fn total_value(utxos: &[Utxo]) -> u64 {
    utxos
        .iter()
        .fold(0_u64, |total, utxo| total.saturating_add(utxo.value))
}
