//! Configuration types for an EpochVault instance.

use serde::{Deserialize, Serialize};

use crate::{AccountId, Result, VaultError, constants};

/// One annualized fee schedule and the account that receives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Annual rate in basis points, prorated over each epoch's duration.
    pub rate_bps: u32,
    /// Account credited with the fee at settlement.
    pub recipient: AccountId,
}

impl FeeSchedule {
    /// A zero-rate schedule paying nobody in practice.
    #[must_use]
    pub fn zero(recipient: AccountId) -> Self {
        Self {
            rate_bps: 0,
            recipient,
        }
    }

    /// Reject rates above [`constants::MAX_FEE_BPS`].
    pub fn validate(&self) -> Result<()> {
        if self.rate_bps > constants::MAX_FEE_BPS {
            return Err(VaultError::InvalidConfig {
                reason: format!(
                    "fee rate {} bps exceeds maximum {} bps",
                    self.rate_bps,
                    constants::MAX_FEE_BPS
                ),
            });
        }
        Ok(())
    }
}

/// Configuration for a single vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Account allowed to close, settle, open and reconfigure the vault.
    pub manager: AccountId,
    /// Strategy custodian that holds the assets while the vault is closed.
    pub owner: AccountId,
    /// First fee schedule (produces `fees1`), typically the protocol.
    pub protocol_fee: FeeSchedule,
    /// Second fee schedule (produces `fees2`), typically the strategy operator.
    pub operator_fee: FeeSchedule,
    /// Largest tolerated decrease of the saved balance per epoch, in bps.
    pub max_drawdown_bps: u32,
}

impl VaultConfig {
    /// A config with zero fees paid to the owner and the default drawdown bound.
    #[must_use]
    pub fn new(manager: AccountId, owner: AccountId) -> Self {
        Self {
            manager,
            owner,
            protocol_fee: FeeSchedule::zero(owner),
            operator_fee: FeeSchedule::zero(owner),
            max_drawdown_bps: constants::DEFAULT_MAX_DRAWDOWN_BPS,
        }
    }

    /// Check every range constraint.
    pub fn validate(&self) -> Result<()> {
        self.protocol_fee.validate()?;
        self.operator_fee.validate()?;
        if self.max_drawdown_bps > constants::MAX_DRAWDOWN_BPS {
            return Err(VaultError::InvalidConfig {
                reason: format!(
                    "max drawdown {} bps exceeds {} bps",
                    self.max_drawdown_bps,
                    constants::MAX_DRAWDOWN_BPS
                ),
            });
        }
        Ok(())
    }

    /// Parse and validate a JSON config document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)
            .map_err(|e| VaultError::Configuration(format!("invalid vault config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize to pretty JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> VaultConfig {
        VaultConfig::new(AccountId::from_bytes([1; 16]), AccountId::from_bytes([2; 16]))
    }

    #[test]
    fn new_config_defaults() {
        let cfg = cfg();
        assert_eq!(cfg.protocol_fee.rate_bps, 0);
        assert_eq!(cfg.operator_fee.recipient, cfg.owner);
        assert_eq!(cfg.max_drawdown_bps, 3_000);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn fee_above_ceiling_rejected() {
        let mut cfg = cfg();
        cfg.operator_fee.rate_bps = constants::MAX_FEE_BPS + 1;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, VaultError::InvalidConfig { .. }));
    }

    #[test]
    fn fee_at_ceiling_accepted() {
        let mut cfg = cfg();
        cfg.protocol_fee.rate_bps = constants::MAX_FEE_BPS;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn drawdown_above_hundred_percent_rejected() {
        let mut cfg = cfg();
        cfg.max_drawdown_bps = 10_001;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn json_roundtrip_and_validation() {
        let cfg = cfg();
        let json = cfg.to_json_string().unwrap();
        let back = VaultConfig::from_json_str(&json).unwrap();
        assert_eq!(cfg, back);

        let mut bad = cfg;
        bad.protocol_fee.rate_bps = 9_999;
        let json = serde_json::to_string(&bad).unwrap();
        assert!(VaultConfig::from_json_str(&json).is_err());
    }

    #[test]
    fn malformed_json_is_configuration_error() {
        let err = VaultConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, VaultError::Configuration(_)));
    }
}
