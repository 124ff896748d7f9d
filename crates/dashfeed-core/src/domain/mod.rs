mod currency;
mod rate;
mod timestamp;
mod utxo;

pub use currency::{CurrencyCode, LEGACY_CODES};
pub use rate::{parse_decimal, ExchangeRate, RATE_SCALE};
pub use timestamp::UtcDateTime;
pub use utxo::{normalize_utxos, total_value, Utxo};
