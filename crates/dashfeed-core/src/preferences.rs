//! Typed user preferences over a key-value backend.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use dashfeed_store::Store;
use serde::Serialize;
use tracing::debug;

use crate::{CoreError, CurrencyCode, UtcDateTime, ValidationError};

/// Raw string storage for preferences.
pub trait PreferenceBackend: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, CoreError>;
    fn write(&self, key: &str, value: &str) -> Result<(), CoreError>;
    fn delete(&self, key: &str) -> Result<bool, CoreError>;
    fn all(&self) -> Result<Vec<(String, String)>, CoreError>;
}

impl PreferenceBackend for Store {
    fn read(&self, key: &str) -> Result<Option<String>, CoreError> {
        Ok(self.preference(key)?)
    }

    fn write(&self, key: &str, value: &str) -> Result<(), CoreError> {
        Ok(self.set_preference(key, value)?)
    }

    fn delete(&self, key: &str) -> Result<bool, CoreError> {
        Ok(self.remove_preference(key)?)
    }

    fn all(&self) -> Result<Vec<(String, String)>, CoreError> {
        Ok(self.preferences()?)
    }
}

#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PreferenceBackend for MemoryPreferences {
    fn read(&self, key: &str) -> Result<Option<String>, CoreError> {
        Ok(self.values().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), CoreError> {
        self.values().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, CoreError> {
        Ok(self.values().remove(key).is_some())
    }

    fn all(&self) -> Result<Vec<(String, String)>, CoreError> {
        Ok(self
            .values()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceKey {
    PinLength,
    BiometricEnabled,
    BackupReminderAt,
    OnboardingComplete,
    ExchangeCurrency,
    UpholdAccessToken,
    CrowdnodeAccountAddress,
    CrowdnodePrimaryAddress,
}

impl PreferenceKey {
    pub const ALL: [Self; 8] = [
        Self::PinLength,
        Self::BiometricEnabled,
        Self::BackupReminderAt,
        Self::OnboardingComplete,
        Self::ExchangeCurrency,
        Self::UpholdAccessToken,
        Self::CrowdnodeAccountAddress,
        Self::CrowdnodePrimaryAddress,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PinLength => "pin_length",
            Self::BiometricEnabled => "biometric_enabled",
            Self::BackupReminderAt => "backup_reminder_at",
            Self::OnboardingComplete => "onboarding_complete",
            Self::ExchangeCurrency => "exchange_currency",
            Self::UpholdAccessToken => "uphold_access_token",
            Self::CrowdnodeAccountAddress => "crowdnode_account_address",
            Self::CrowdnodePrimaryAddress => "crowdnode_primary_address",
        }
    }

    /// Secrets are masked when listed.
    pub const fn is_secret(self) -> bool {
        matches!(self, Self::UpholdAccessToken)
    }

    /// Validate `value` and return its stored form.
    pub fn normalize(self, value: &str) -> Result<String, ValidationError> {
        let trimmed = value.trim();
        let invalid = || ValidationError::InvalidPreference {
            key: self.as_str().to_owned(),
            value: value.to_owned(),
        };

        match self {
            Self::PinLength => match trimmed {
                "4" | "6" => Ok(trimmed.to_owned()),
                _ => Err(invalid()),
            },
            Self::BiometricEnabled | Self::OnboardingComplete => {
                parse_bool(trimmed).map(|flag| flag.to_string()).ok_or_else(invalid)
            }
            Self::BackupReminderAt => UtcDateTime::parse(trimmed)
                .map(UtcDateTime::format_rfc3339)
                .map_err(|_| invalid()),
            Self::ExchangeCurrency => CurrencyCode::parse(trimmed)
                .map(|code| code.as_str().to_owned())
                .map_err(|_| invalid()),
            Self::UpholdAccessToken
            | Self::CrowdnodeAccountAddress
            | Self::CrowdnodePrimaryAddress => {
                if trimmed.is_empty() {
                    Err(invalid())
                } else {
                    Ok(trimmed.to_owned())
                }
            }
        }
    }
}

impl Display for PreferenceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PreferenceKey {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == normalized)
            .ok_or_else(|| ValidationError::UnknownPreference {
                key: value.to_owned(),
            })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreferenceEntry {
    pub key: PreferenceKey,
    pub value: String,
}

/// Validated access to the preference backend.
#[derive(Clone)]
pub struct Preferences {
    backend: Arc<dyn PreferenceBackend>,
}

impl Preferences {
    pub fn new(backend: Arc<dyn PreferenceBackend>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryPreferences::new()))
    }

    pub fn get(&self, key: PreferenceKey) -> Result<Option<String>, CoreError> {
        self.backend.read(key.as_str())
    }

    /// Store the normalized value and return it.
    pub fn set(&self, key: PreferenceKey, value: &str) -> Result<String, CoreError> {
        let normalized = key.normalize(value)?;
        self.backend.write(key.as_str(), &normalized)?;
        debug!(key = key.as_str(), "preference updated");
        Ok(normalized)
    }

    pub fn remove(&self, key: PreferenceKey) -> Result<bool, CoreError> {
        self.backend.delete(key.as_str())
    }

    /// Known entries in key order; unrecognized stored keys are skipped.
    pub fn entries(&self) -> Result<Vec<PreferenceEntry>, CoreError> {
        let mut entries = self
            .backend
            .all()?
            .into_iter()
            .filter_map(|(key, value)| match key.parse::<PreferenceKey>() {
                Ok(key) => Some(PreferenceEntry { key, value }),
                Err(_) => {
                    debug!(key = %key, "skipping unknown stored preference");
                    None
                }
            })
            .collect::<Vec<_>>();
        entries.sort_by_key(|entry| entry.key);
        Ok(entries)
    }

    pub fn pin_length(&self) -> Result<Option<u8>, CoreError> {
        Ok(self
            .get(PreferenceKey::PinLength)?
            .and_then(|value| value.parse().ok()))
    }

    pub fn biometric_enabled(&self) -> Result<bool, CoreError> {
        self.flag(PreferenceKey::BiometricEnabled)
    }

    pub fn onboarding_complete(&self) -> Result<bool, CoreError> {
        self.flag(PreferenceKey::OnboardingComplete)
    }

    pub fn backup_reminder_at(&self) -> Result<Option<UtcDateTime>, CoreError> {
        Ok(self
            .get(PreferenceKey::BackupReminderAt)?
            .and_then(|value| UtcDateTime::parse(&value).ok()))
    }

    pub fn exchange_currency(&self) -> Result<Option<CurrencyCode>, CoreError> {
        Ok(self
            .get(PreferenceKey::ExchangeCurrency)?
            .and_then(|value| CurrencyCode::parse(&value).ok()))
    }

    pub fn set_exchange_currency(&self, code: &CurrencyCode) -> Result<(), CoreError> {
        self.set(PreferenceKey::ExchangeCurrency, code.as_str()).map(drop)
    }

    pub fn uphold_access_token(&self) -> Result<Option<String>, CoreError> {
        self.get(PreferenceKey::UpholdAccessToken)
    }

    pub fn set_uphold_access_token(&self, token: &str) -> Result<(), CoreError> {
        self.set(PreferenceKey::UpholdAccessToken, token).map(drop)
    }

    pub fn clear_uphold_access_token(&self) -> Result<(), CoreError> {
        self.remove(PreferenceKey::UpholdAccessToken).map(drop)
    }

    fn flag(&self, key: PreferenceKey) -> Result<bool, CoreError> {
        Ok(self
            .get(key)?
            .and_then(|value| parse_bool(&value))
            .unwrap_or(false))
    }
}
