//! Supply conservation invariant checker.
//!
//! Invariants enforced after every vault transition:
//! ```text
//! Σ(minted) - Σ(burned) == vault.total_supply == custody.share_supply
//! state == OPEN  ⇒  custody.balance(vault, ASSET) == vault.total_assets
//! ```
//!
//! If either breaks, the vault's books and the custody layer disagree and
//! the operation that exposed it is reported as failed.

use epochvault_types::{Amount, Movement, Result, VaultError};

/// Tracks every share mint and burn the vault has instructed.
#[derive(Debug, Clone, Default)]
pub struct SupplyConservation {
    /// Shares minted since genesis.
    minted: Amount,
    /// Shares burned since genesis.
    burned: Amount,
}

impl SupplyConservation {
    /// Create a new tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a share mint.
    pub fn record_mint(&mut self, amount: Amount) {
        self.minted = self.minted.saturating_add(amount);
    }

    /// Record a share burn.
    pub fn record_burn(&mut self, amount: Amount) {
        self.burned = self.burned.saturating_add(amount);
    }

    /// Record the mints and burns in an applied batch.
    pub fn record_batch(&mut self, movements: &[Movement]) {
        for movement in movements {
            match *movement {
                Movement::Mint { amount, .. } => self.record_mint(amount),
                Movement::Burn { amount, .. } => self.record_burn(amount),
                Movement::Transfer { .. } => {}
            }
        }
    }

    /// Expected share supply: minted - burned.
    #[must_use]
    pub fn expected_supply(&self) -> Amount {
        self.minted.saturating_sub(self.burned)
    }

    /// Total shares minted.
    #[must_use]
    pub fn total_minted(&self) -> Amount {
        self.minted
    }

    /// Total shares burned.
    #[must_use]
    pub fn total_burned(&self) -> Amount {
        self.burned
    }

    /// Verify the vault's tracked supply and the custody supply both match
    /// the expected supply.
    ///
    /// # Errors
    /// Returns [`VaultError::SupplyInvariantViolation`] on any mismatch.
    pub fn verify_shares(&self, tracked_supply: Amount, custody_supply: Amount) -> Result<()> {
        let expected = self.expected_supply();
        if tracked_supply != expected || custody_supply != expected {
            return Err(VaultError::SupplyInvariantViolation {
                reason: format!(
                    "share supply: tracked {tracked_supply}, custody {custody_supply}, \
                     expected {expected} (minted={}, burned={})",
                    self.minted, self.burned
                ),
            });
        }
        Ok(())
    }

    /// Verify the vault's idle assets in custody match its tracked total.
    ///
    /// # Errors
    /// Returns [`VaultError::SupplyInvariantViolation`] on mismatch.
    pub fn verify_idle_assets(&self, tracked_assets: Amount, custody_assets: Amount) -> Result<()> {
        if tracked_assets != custody_assets {
            return Err(VaultError::SupplyInvariantViolation {
                reason: format!(
                    "vault assets: tracked {tracked_assets}, custody {custody_assets}"
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use epochvault_types::Party;

    use super::*;

    #[test]
    fn empty_supply_is_zero() {
        let sc = SupplyConservation::new();
        assert_eq!(sc.expected_supply(), 0);
        assert!(sc.verify_shares(0, 0).is_ok());
    }

    #[test]
    fn mints_and_burns_net_out() {
        let mut sc = SupplyConservation::new();
        sc.record_mint(1_000);
        sc.record_mint(500);
        sc.record_burn(300);
        assert_eq!(sc.expected_supply(), 1_200);
        assert_eq!(sc.total_minted(), 1_500);
        assert_eq!(sc.total_burned(), 300);
    }

    #[test]
    fn batch_ignores_transfers() {
        let mut sc = SupplyConservation::new();
        sc.record_batch(&[
            Movement::Mint {
                to: Party::ClaimableSilo,
                amount: 40,
            },
            Movement::shares(Party::ClaimableSilo, Party::Vault, 40),
            Movement::Burn {
                from: Party::Vault,
                amount: 15,
            },
        ]);
        assert_eq!(sc.expected_supply(), 25);
    }

    #[test]
    fn tracked_mismatch_detected() {
        let mut sc = SupplyConservation::new();
        sc.record_mint(10);
        let err = sc.verify_shares(11, 10).unwrap_err();
        assert!(matches!(err, VaultError::SupplyInvariantViolation { .. }));
    }

    #[test]
    fn custody_mismatch_detected() {
        let mut sc = SupplyConservation::new();
        sc.record_mint(10);
        assert!(sc.verify_shares(10, 9).is_err());
        assert!(sc.verify_shares(10, 10).is_ok());
    }

    #[test]
    fn idle_assets_must_match() {
        let sc = SupplyConservation::new();
        assert!(sc.verify_idle_assets(500, 500).is_ok());
        assert!(sc.verify_idle_assets(500, 499).is_err());
    }
}
