use dashfeed_core::{BalanceError, CoreError, SourceErrorKind, UpholdError};
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] dashfeed_core::ValidationError),

    #[error("command error: {0}")]
    Command(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    OtpRequired(String),

    #[error("{0}")]
    Auth(String),

    #[error(transparent)]
    Store(#[from] dashfeed_store::StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) | Self::Command(_) => 2,
            Self::Serialization(_) => 4,
            Self::OtpRequired(_) => 6,
            Self::Auth(_) => 7,
            Self::Store(_) | Self::Io(_) => 10,
        }
    }
}

impl From<CoreError> for CliError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::Validation(error) => Self::Validation(error),
            CoreError::Serialization(error) => Self::Serialization(error),
            CoreError::Store(error) => Self::Store(error),
            CoreError::Io(error) => Self::Io(error),
        }
    }
}

impl From<UpholdError> for CliError {
    fn from(error: UpholdError) -> Self {
        match error {
            UpholdError::Validation(error) => Self::Validation(error),
            UpholdError::Preferences(error) => error.into(),
            other => match other.kind() {
                SourceErrorKind::OtpRequired => {
                    Self::OtpRequired(format!("{other}; retry with --otp <CODE>"))
                }
                SourceErrorKind::Auth => Self::Auth(other.to_string()),
                _ => Self::Command(other.to_string()),
            },
        }
    }
}

impl From<BalanceError> for CliError {
    fn from(error: BalanceError) -> Self {
        match error {
            BalanceError::Validation(error) => Self::Validation(error),
            other => Self::Command(other.to_string()),
        }
    }
}
