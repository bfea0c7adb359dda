//! Settlement result types.
//!
//! A [`SettleValues`] record is produced by the preview step, reproduced by
//! the commit step, and then written onto the settled epoch. It is the only
//! input later claims read.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Amount, EpochId};

/// Everything a settlement moves, priced and fee-adjusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleValues {
    /// The epoch these values settle.
    pub epoch_id: EpochId,
    /// Aggregated deposit requests of the epoch (assets).
    pub pending_deposit: Amount,
    /// Aggregated redeem requests of the epoch (shares).
    pub pending_redeem: Amount,
    /// Shares minted for the epoch's depositors.
    pub shares_to_mint: Amount,
    /// Assets owed to the epoch's redeemers.
    pub assets_to_withdraw: Amount,
    /// Surplus of deposits over withdrawals sent to the owner.
    pub assets_to_owner: Amount,
    /// Shortfall of deposits under withdrawals the owner must supply.
    pub assets_to_vault: Amount,
    /// Fee owed under the first schedule.
    pub fees1: Amount,
    /// Fee owed under the second schedule.
    pub fees2: Amount,
    /// `fees1 + fees2 + assets_to_vault`.
    pub expected_asset_from_owner: Amount,
    /// Post-fee net asset value the conversions were priced against:
    /// the reported balance minus `fees1 + fees2`. This is not the
    /// balance the epoch started at.
    pub last_saved_balance: Amount,
    /// Share supply before this settlement.
    pub total_supply_snapshot: Amount,
    /// Vault total assets once the epoch's flows are applied:
    /// `last_saved_balance + pending_deposit - assets_to_withdraw`.
    pub new_total_assets: Amount,
    /// Timestamp the fees were prorated to.
    pub settled_at: DateTime<Utc>,
}

impl SettleValues {
    /// Whether the epoch had no requests at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending_deposit == 0 && self.pending_redeem == 0
    }

    /// Total fees collected by this settlement.
    #[must_use]
    pub fn total_fees(&self) -> Amount {
        self.fees1.saturating_add(self.fees2)
    }

    /// Share supply once this settlement is applied, or `None` if it does
    /// not fit an [`Amount`].
    #[must_use]
    pub fn new_total_supply(&self) -> Option<Amount> {
        self.total_supply_snapshot
            .checked_add(self.shares_to_mint)?
            .checked_sub(self.pending_redeem)
    }

    /// Price per share the epoch's deposits were converted at.
    #[must_use]
    pub fn deposit_price(&self) -> Option<Decimal> {
        price_per_share(self.last_saved_balance, self.total_supply_snapshot)
    }

    /// Price per share the epoch's redemptions were converted at.
    #[must_use]
    pub fn redeem_price(&self) -> Option<Decimal> {
        price_per_share(
            self.last_saved_balance.checked_add(self.pending_deposit)?,
            self.total_supply_snapshot.checked_add(self.shares_to_mint)?,
        )
    }
}

/// Conceptual price per share, with the same `+1` guards the conversions
/// use so an empty vault prices at exactly one.
///
/// Returns `None` when either side does not fit a [`Decimal`].
#[must_use]
pub fn price_per_share(total_assets: Amount, total_supply: Amount) -> Option<Decimal> {
    let assets = to_decimal(total_assets.checked_add(1)?)?;
    let supply = to_decimal(total_supply.checked_add(1)?)?;
    assets.checked_div(supply)
}

fn to_decimal(value: Amount) -> Option<Decimal> {
    let signed = i128::try_from(value).ok()?;
    Decimal::try_from_i128_with_scale(signed, 0).ok()
}

/// Fixture record for tests.
#[cfg(any(test, feature = "test-helpers"))]
impl SettleValues {
    /// An all-zero record for `epoch_id`.
    #[must_use]
    pub fn dummy(epoch_id: EpochId) -> Self {
        Self {
            epoch_id,
            pending_deposit: 0,
            pending_redeem: 0,
            shares_to_mint: 0,
            assets_to_withdraw: 0,
            assets_to_owner: 0,
            assets_to_vault: 0,
            fees1: 0,
            fees2: 0,
            expected_asset_from_owner: 0,
            last_saved_balance: 0,
            total_supply_snapshot: 0,
            new_total_assets: 0,
            settled_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_vault_prices_at_one() {
        assert_eq!(price_per_share(0, 0), Some(Decimal::ONE));
    }

    #[test]
    fn price_reflects_gain() {
        // 2_000_000 assets backing 1_000_000 shares ≈ 2.0
        let pps = price_per_share(2_000_000, 1_000_000).unwrap();
        assert!(pps > Decimal::new(19, 1));
        assert!(pps < Decimal::new(2, 0));
    }

    #[test]
    fn price_out_of_decimal_range_is_none() {
        assert!(price_per_share(u128::MAX, 1).is_none());
    }

    #[test]
    fn new_total_supply_nets_mint_and_burn() {
        let mut sv = SettleValues::dummy(EpochId(1));
        sv.total_supply_snapshot = 1_000;
        sv.shares_to_mint = 250;
        sv.pending_redeem = 100;
        assert_eq!(sv.new_total_supply(), Some(1_150));
        assert!(!sv.is_empty());
    }

    #[test]
    fn new_total_supply_overflow_is_none() {
        let mut sv = SettleValues::dummy(EpochId(1));
        sv.total_supply_snapshot = u128::MAX;
        sv.shares_to_mint = 1;
        assert_eq!(sv.new_total_supply(), None);
        sv.shares_to_mint = 0;
        sv.pending_redeem = 1;
        assert_eq!(sv.new_total_supply(), Some(u128::MAX - 1));
    }

    #[test]
    fn deposit_and_redeem_prices() {
        // Empty vault: both sides price at exactly one.
        let mut sv = SettleValues::dummy(EpochId(1));
        assert_eq!(sv.deposit_price(), Some(Decimal::ONE));
        assert_eq!(sv.redeem_price(), Some(Decimal::ONE));

        // NAV 2_999 over 999 shares prices deposits at 3; 1_000 deposited
        // assets mint 333 shares, so redemptions see 4_000 / 1_333.
        sv.last_saved_balance = 2_999;
        sv.total_supply_snapshot = 999;
        sv.pending_deposit = 1_000;
        sv.shares_to_mint = 333;
        assert_eq!(sv.deposit_price(), Some(Decimal::from(3)));
        assert_eq!(
            sv.redeem_price(),
            Decimal::from(4_000).checked_div(Decimal::from(1_333))
        );

        sv.pending_deposit = u128::MAX;
        assert_eq!(sv.redeem_price(), None);
    }

    #[test]
    fn settle_values_serde_roundtrip() {
        let mut sv = SettleValues::dummy(EpochId(4));
        sv.fees1 = 12;
        sv.fees2 = 3;
        assert_eq!(sv.total_fees(), 15);
        let json = serde_json::to_string(&sv).unwrap();
        let back: SettleValues = serde_json::from_str(&json).unwrap();
        assert_eq!(sv, back);
    }
}
