//! Uphold API error bodies and their classification.

use std::fmt::{Display, Formatter};

use serde::Serialize;
use serde_json::Value;

/// Known reasons an Uphold call was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum UpholdErrorReason {
    /// The access token is invalid or expired.
    InvalidToken,
    /// The account has not finished identity verification.
    IdentityRequired,
    /// Funds exist but are still locked.
    UnlockedFundsRequired {
        available_at: Option<String>,
        missing: Option<String>,
        currency: Option<String>,
    },
    InsufficientFunds,
    /// Withdrawal exceeds the destination limit.
    AmountAboveThreshold { threshold: Option<String> },
    InvalidBeneficiary,
    BeneficiaryRequired,
    /// Withdrawals are blocked after a recent password change.
    PasswordResetRestriction { until: Option<String> },
    AuthenticationMethodReset,
    /// Account-level requirements that block the action.
    Forbidden { requirements: Vec<String> },
}

impl Display for UpholdErrorReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidToken => f.write_str("access token is invalid or expired"),
            Self::IdentityRequired => f.write_str("identity verification is required"),
            Self::UnlockedFundsRequired {
                available_at,
                missing,
                currency,
            } => write!(
                f,
                "funds are locked: missing {} {} until {}",
                missing.as_deref().unwrap_or("?"),
                currency.as_deref().unwrap_or(""),
                available_at.as_deref().unwrap_or("unknown")
            ),
            Self::InsufficientFunds => f.write_str("insufficient funds"),
            Self::AmountAboveThreshold { threshold } => write!(
                f,
                "amount exceeds the limit of {}",
                threshold.as_deref().unwrap_or("the destination")
            ),
            Self::InvalidBeneficiary => f.write_str("beneficiary information is invalid"),
            Self::BeneficiaryRequired => f.write_str("beneficiary information is required"),
            Self::PasswordResetRestriction { until } => write!(
                f,
                "withdrawals are restricted after a password reset until {}",
                until.as_deref().unwrap_or("later")
            ),
            Self::AuthenticationMethodReset => {
                f.write_str("withdrawals are restricted after an authentication method reset")
            }
            Self::Forbidden { requirements } => {
                write!(f, "action is forbidden: {}", requirements.join(", "))
            }
        }
    }
}

/// A non-2xx Uphold response.
#[derive(Debug, Clone, PartialEq)]
pub struct UpholdApiError {
    pub status: u16,
    pub body: Option<Value>,
}

impl UpholdApiError {
    pub fn new(status: u16, body: &str) -> Self {
        Self {
            status,
            body: serde_json::from_str(body).ok(),
        }
    }

    fn errors(&self) -> Option<&Value> {
        self.body.as_ref()?.get("errors")
    }

    pub fn is_token_error(&self) -> bool {
        self.errors().and_then(|errors| errors.get("token")).is_some()
    }

    pub fn is_identity_error(&self) -> bool {
        self.errors().and_then(|errors| errors.get("identity")).is_some()
    }

    pub fn classify(&self) -> Option<UpholdErrorReason> {
        if self.is_token_error() {
            return Some(UpholdErrorReason::InvalidToken);
        }
        if self.is_identity_error() {
            return Some(UpholdErrorReason::IdentityRequired);
        }

        let body = self.body.as_ref()?;
        let errors = body.get("errors").unwrap_or(body);

        if let Some(first) = first_error(errors, &["denomination", "errors", "amount"]) {
            match error_code(first) {
                Some("sufficient_unlocked_funds") => {
                    return Some(UpholdErrorReason::UnlockedFundsRequired {
                        available_at: error_arg(first, "availableAt"),
                        missing: error_arg(first, "missing"),
                        currency: error_arg(first, "currency"),
                    });
                }
                Some("sufficient_funds") => return Some(UpholdErrorReason::InsufficientFunds),
                _ => {}
            }
        }

        if let Some(first) = first_error(errors, &["destination", "errors", "amount"]) {
            if error_code(first) == Some("less_than_or_equal_to") {
                return Some(UpholdErrorReason::AmountAboveThreshold {
                    threshold: error_arg(first, "threshold"),
                });
            }
        }

        if let Some(first) = first_error(errors, &["beneficiary"]) {
            match error_code(first) {
                Some("invalid_beneficiary") => return Some(UpholdErrorReason::InvalidBeneficiary),
                Some("required") => return Some(UpholdErrorReason::BeneficiaryRequired),
                _ => {}
            }
        }

        if let Some(first) = first_error(errors, &["user"]) {
            match error_code(first) {
                Some("password_reset_restriction") => {
                    return Some(UpholdErrorReason::PasswordResetRestriction {
                        until: error_arg(first, "recentPasswordRestrictionEndDate"),
                    });
                }
                Some("restricted_by_authentication_method_reset") => {
                    return Some(UpholdErrorReason::AuthenticationMethodReset);
                }
                _ => {}
            }
        }

        if body.get("code").and_then(Value::as_str) == Some("forbidden") {
            let requirements = body
                .get("requirements")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default();
            return Some(UpholdErrorReason::Forbidden { requirements });
        }

        None
    }

    /// Human-readable description: the classified reason or a generic one per status.
    pub fn description(&self) -> String {
        if let Some(reason) = self.classify() {
            return reason.to_string();
        }

        let generic = match self.status {
            400 => "the request was invalid",
            401 => "authentication is required",
            403 => "the action is not allowed for this account",
            404 => "the resource was not found",
            409 => "the request conflicts with the current state",
            412 => "a precondition failed",
            416 => "the requested range is not satisfiable",
            429 => "too many requests, try again later",
            _ => "unexpected response from Uphold",
        };
        format!("{generic} (status {})", self.status)
    }
}

impl Display for UpholdApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.description())
    }
}

fn first_error<'a>(errors: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(errors, |node, key| node.get(key))?
        .as_array()?
        .first()
}

fn error_code(error: &Value) -> Option<&str> {
    error.get("code").and_then(Value::as_str)
}

fn error_arg(error: &Value, name: &str) -> Option<String> {
    match error.get("args")?.get(name)? {
        Value::String(text) => Some(text.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
