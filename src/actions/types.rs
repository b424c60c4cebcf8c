// src/actions/types.rs
use alloy_primitives::B256;
use std::fmt;

use crate::error::{ConfigurationError, ConnectivityError, OnChainRevert, ValidationError};
use crate::units::format_bps;

/// Result of one user action. "Nothing was sent" and "sent but failed"
/// are different variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Success { tx_hash: B256 },
    Reverted(OnChainRevert),
    Aborted(AbortCause),
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ActionOutcome::Success { .. })
    }

    pub fn tx_hash(&self) -> Option<B256> {
        match self {
            ActionOutcome::Success { tx_hash } => Some(*tx_hash),
            ActionOutcome::Reverted(revert) => Some(revert.tx_hash),
            ActionOutcome::Aborted(AbortCause::NotConfirmed { tx_hash })
            | ActionOutcome::Aborted(AbortCause::StatusUnknown { tx_hash }) => Some(*tx_hash),
            ActionOutcome::Aborted(_) => None,
        }
    }
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionOutcome::Success { tx_hash } => write!(f, "Confirmed in {}", tx_hash),
            ActionOutcome::Reverted(revert) => write!(f, "{}", revert),
            ActionOutcome::Aborted(cause) => write!(f, "Aborted: {}", cause),
        }
    }
}

/// Why an action ended without a known on-chain result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortCause {
    Validation(ValidationError),
    Configuration(ConfigurationError),
    /// Declined at the confirmation prompt or in the wallet
    UserDeclined,
    Connectivity(ConnectivityError),
    /// Submitted, but no receipt within the confirmation timeout
    NotConfirmed { tx_hash: B256 },
    /// Mined, but the receipt has no status field
    StatusUnknown { tx_hash: B256 },
}

impl fmt::Display for AbortCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortCause::Validation(e) => write!(f, "{}", e),
            AbortCause::Configuration(e) => write!(f, "{}", e),
            AbortCause::UserDeclined => write!(f, "Declined by user"),
            AbortCause::Connectivity(e) => write!(f, "{}", e),
            AbortCause::NotConfirmed { tx_hash } => {
                write!(f, "Transaction {} was not confirmed in time", tx_hash)
            }
            AbortCause::StatusUnknown { tx_hash } => {
                write!(f, "Transaction {} was mined but its result is unknown", tx_hash)
            }
        }
    }
}

impl From<ValidationError> for AbortCause {
    fn from(e: ValidationError) -> Self {
        AbortCause::Validation(e)
    }
}

impl From<ConfigurationError> for AbortCause {
    fn from(e: ConfigurationError) -> Self {
        AbortCause::Configuration(e)
    }
}

impl From<ConnectivityError> for AbortCause {
    fn from(e: ConnectivityError) -> Self {
        AbortCause::Connectivity(e)
    }
}

/// What the user is told before an emergency withdrawal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmergencyNotice {
    /// Basis points, when protocol data reports it
    pub penalty_bps: Option<u32>,
}

impl EmergencyNotice {
    pub fn message(&self) -> String {
        let penalty = match self.penalty_bps {
            Some(bps) => format!("a {} penalty", format_bps(alloy_primitives::U256::from(bps))),
            None => "the penalty set by the staking contract".to_string(),
        };
        format!(
            "Emergency withdraw is irreversible. It forfeits all pending rewards and applies {}. Continue?",
            penalty
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_uses_reported_penalty() {
        let notice = EmergencyNotice { penalty_bps: Some(5_000) };
        assert!(notice.message().contains("50.00% penalty"));

        let unknown = EmergencyNotice { penalty_bps: None };
        assert!(unknown.message().contains("set by the staking contract"));
    }

    #[test]
    fn test_outcome_tx_hash() {
        let hash = B256::repeat_byte(0x11);
        assert_eq!(ActionOutcome::Success { tx_hash: hash }.tx_hash(), Some(hash));
        assert_eq!(ActionOutcome::Aborted(AbortCause::UserDeclined).tx_hash(), None);
        assert_eq!(
            ActionOutcome::Aborted(AbortCause::NotConfirmed { tx_hash: hash }).tx_hash(),
            Some(hash)
        );
    }
}
