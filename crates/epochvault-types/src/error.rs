//! Error types for the EpochVault ledger.
//!
//! All errors use the `EV_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Lifecycle errors
//! - 2xx: Amount / balance errors
//! - 3xx: Settlement errors
//! - 4xx: Claim errors
//! - 5xx: Access / collaborator errors
//! - 6xx: Configuration errors
//! - 8xx: Invariant errors
//! - 9xx: General / internal errors

use thiserror::Error;

use crate::{AccountId, Amount, EpochId, Party, Unit, VaultState};

/// Central error enum for all EpochVault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    // =================================================================
    // Lifecycle Errors (1xx)
    // =================================================================
    /// The operation is illegal in the current lifecycle state.
    #[error("EV_ERR_100: Invalid state: expected {expected}, got {actual}")]
    InvalidState {
        expected: VaultState,
        actual: VaultState,
    },

    // =================================================================
    // Amount / Balance Errors (2xx)
    // =================================================================
    /// A request or conversion input was zero where a positive value is required.
    #[error("EV_ERR_200: Amount must be greater than zero")]
    ZeroAmount,

    /// An intermediate product or sum did not fit in 128 bits.
    #[error("EV_ERR_201: Arithmetic overflow in {context}")]
    ArithmeticOverflow { context: &'static str },

    /// The custody layer could not debit a party.
    #[error("EV_ERR_202: Insufficient {unit} balance for {party}: need {needed}, have {available}")]
    InsufficientBalance {
        party: Party,
        unit: Unit,
        needed: Amount,
        available: Amount,
    },

    // =================================================================
    // Settlement Errors (3xx)
    // =================================================================
    /// The proposed balance falls below the configured drawdown floor.
    #[error("EV_ERR_300: Max drawdown exceeded: new balance {new} below floor {floor} (last {last})")]
    MaxDrawdownExceeded {
        last: Amount,
        new: Amount,
        floor: Amount,
    },

    /// A commit re-derived settlement values that differ from the preview.
    #[error("EV_ERR_301: Determinism violation: expected {expected}, got {actual}")]
    DeterminismViolation { expected: String, actual: String },

    /// No record exists for the epoch.
    #[error("EV_ERR_302: Epoch not found: {0}")]
    EpochNotFound(EpochId),

    /// The epoch already carries settlement values.
    #[error("EV_ERR_303: Epoch already settled: {0}")]
    EpochAlreadySettled(EpochId),

    // =================================================================
    // Claim Errors (4xx)
    // =================================================================
    /// Reserved: claims beyond the available amount return zero instead.
    #[error("EV_ERR_400: Insufficient claimable balance")]
    InsufficientClaimable,

    // =================================================================
    // Access / Collaborator Errors (5xx)
    // =================================================================
    /// The caller lacks the required capability.
    #[error("EV_ERR_500: Unauthorized caller {caller}: {reason}")]
    Unauthorized { caller: AccountId, reason: String },

    /// The request receiver's acknowledgement hook failed.
    #[error("EV_ERR_501: Receiver rejected request: {reason}")]
    ReceiverRejected { reason: String },

    // =================================================================
    // Configuration Errors (6xx)
    // =================================================================
    /// A configuration value is out of its allowed range.
    #[error("EV_ERR_600: Invalid config: {reason}")]
    InvalidConfig { reason: String },

    /// Configuration could not be loaded.
    #[error("EV_ERR_601: Configuration error: {0}")]
    Configuration(String),

    /// Serialization / deserialization error.
    #[error("EV_ERR_602: Serialization error: {0}")]
    Serialization(String),

    // =================================================================
    // Invariant Errors (8xx)
    // =================================================================
    /// Tracked totals disagree with custody. Critical.
    #[error("EV_ERR_800: Supply invariant violation: {reason}")]
    SupplyInvariantViolation { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("EV_ERR_900: Internal error: {0}")]
    Internal(String),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, VaultError>;

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_state_display() {
        let err = VaultError::InvalidState {
            expected: VaultState::Closed,
            actual: VaultState::Open,
        };
        let msg = format!("{err}");
        assert!(msg.starts_with("EV_ERR_100"), "Got: {msg}");
        assert!(msg.contains("CLOSED"));
        assert!(msg.contains("OPEN"));
    }

    #[test]
    fn drawdown_display_carries_amounts() {
        let err = VaultError::MaxDrawdownExceeded {
            last: 1_000_000,
            new: 899_999,
            floor: 900_000,
        };
        let msg = format!("{err}");
        assert!(msg.contains("EV_ERR_300"));
        assert!(msg.contains("899999"));
        assert!(msg.contains("900000"));
    }

    #[test]
    fn all_errors_have_ev_err_prefix() {
        let errors: Vec<Box<dyn std::error::Error>> = vec![
            Box::new(VaultError::ZeroAmount),
            Box::new(VaultError::InsufficientClaimable),
            Box::new(VaultError::EpochNotFound(EpochId(3))),
            Box::new(VaultError::Internal("test".into())),
            Box::new(VaultError::ArithmeticOverflow { context: "test" }),
            Box::new(VaultError::DeterminismViolation {
                expected: "a".into(),
                actual: "b".into(),
            }),
        ];
        for err in errors {
            let msg = format!("{err}");
            assert!(
                msg.starts_with("EV_ERR_"),
                "Error missing EV_ERR_ prefix: {msg}"
            );
        }
    }

    #[test]
    fn serde_json_error_converts() {
        let err: VaultError = serde_json::from_str::<u8>("nope").unwrap_err().into();
        assert!(matches!(err, VaultError::Serialization(_)));
    }
}
