//! Two-phase settlement: preview, then commit.
//!
//! Preview is a pure function of the epoch record, the share supply, the
//! proposed balance, the settlement timestamp, and the config:
//! 1. Fees from the average of the epoch's start balance and the new one
//! 2. Drawdown check against the epoch's start balance
//! 3. NAV snapshot: new balance minus fees
//! 4. Deposits priced first, redemptions second (as if deposit shares were
//!    already minted)
//! 5. Net the asset flows against each other
//!
//! The NAV from step 3, not the epoch's start balance, prices both
//! conversions and is what [`SettleValues::last_saved_balance`] records.
//! The vault's total assets afterwards are that NAV plus deposits minus
//! withdrawals, not the raw reported balance.
//!
//! Commit re-runs the preview and turns the values into an ordered list of
//! custody [`Movement`]s that the vault applies as one batch.

use chrono::{DateTime, Utc};
use epochvault_ledger::EpochRecord;
use epochvault_pricing::{
    average_balance, check_drawdown, compute_fees, epoch_duration_secs, preview_mint_shares,
    preview_withdraw_assets,
};
use epochvault_types::{
    AccountId, Amount, Movement, Party, Result, SettleValues, VaultConfig, VaultError,
};

/// Stateless settlement calculator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SettlementEngine;

impl SettlementEngine {
    /// Derive the settlement values for `epoch` at `new_saved_balance`.
    ///
    /// Never mutates anything; calling it twice with the same inputs yields
    /// identical records.
    ///
    /// # Errors
    /// - `EpochAlreadySettled` if the epoch already carries settle values
    /// - `MaxDrawdownExceeded` if the new balance is below the floor
    /// - `ArithmeticOverflow` if an intermediate does not fit `u128`
    pub fn preview(
        epoch: &EpochRecord,
        total_supply: Amount,
        new_saved_balance: Amount,
        now: DateTime<Utc>,
        config: &VaultConfig,
    ) -> Result<SettleValues> {
        if epoch.is_settled() {
            return Err(VaultError::EpochAlreadySettled(epoch.epoch_id));
        }
        let pending_deposit = epoch.pending_deposit_total;
        let pending_redeem = epoch.pending_redeem_total;
        let last_saved_balance = epoch.last_saved_balance;

        let duration = epoch_duration_secs(epoch.started_at, now);
        let fees = compute_fees(
            average_balance(last_saved_balance, new_saved_balance),
            duration,
            config.protocol_fee.rate_bps,
            config.operator_fee.rate_bps,
        )?;
        let total_fees = fees.total()?;

        check_drawdown(last_saved_balance, new_saved_balance, config.max_drawdown_bps)?;

        let nav = new_saved_balance.saturating_sub(total_fees);

        let shares_to_mint = preview_mint_shares(pending_deposit, total_supply, nav)?;
        let assets_to_withdraw =
            preview_withdraw_assets(pending_redeem, nav, pending_deposit, total_supply, shares_to_mint)?;

        let assets_to_owner = pending_deposit.saturating_sub(assets_to_withdraw);
        let assets_to_vault = assets_to_withdraw.saturating_sub(pending_deposit);

        let expected_asset_from_owner =
            total_fees
                .checked_add(assets_to_vault)
                .ok_or(VaultError::ArithmeticOverflow {
                    context: "SettlementEngine::expected_asset_from_owner",
                })?;

        let new_total_assets = nav
            .checked_add(pending_deposit)
            .and_then(|v| v.checked_sub(assets_to_withdraw))
            .ok_or(VaultError::ArithmeticOverflow {
                context: "SettlementEngine::new_total_assets",
            })?;

        Ok(SettleValues {
            epoch_id: epoch.epoch_id,
            pending_deposit,
            pending_redeem,
            shares_to_mint,
            assets_to_withdraw,
            assets_to_owner,
            assets_to_vault,
            fees1: fees.fees1,
            fees2: fees.fees2,
            expected_asset_from_owner,
            last_saved_balance: nav,
            total_supply_snapshot: total_supply,
            new_total_assets,
            settled_at: now,
        })
    }

    /// Every custody movement a commit of `values` needs, in application
    /// order. Zero-amount movements are left out.
    ///
    /// With `reopen`, the owner also returns the vault's new total assets
    /// so the vault can serve instant conversions again.
    #[must_use]
    pub fn plan_commit(values: &SettleValues, config: &VaultConfig, reopen: bool) -> Vec<Movement> {
        let owner = Party::Account(config.owner);
        let mut plan = vec![
            Movement::Mint {
                to: Party::ClaimableSilo,
                amount: values.shares_to_mint,
            },
            Movement::Burn {
                from: Party::PendingSilo,
                amount: values.pending_redeem,
            },
        ];

        if values.assets_to_owner > 0 {
            // Deposits exceed withdrawals: redeemers are paid out of the
            // pending deposits and the surplus goes to the strategy.
            plan.push(Movement::assets(Party::PendingSilo, owner, values.assets_to_owner));
            plan.push(Movement::assets(
                Party::PendingSilo,
                Party::ClaimableSilo,
                values.assets_to_withdraw,
            ));
        } else if values.assets_to_vault > 0 {
            // Withdrawals exceed deposits: the strategy covers the gap.
            plan.push(Movement::assets(owner, Party::ClaimableSilo, values.assets_to_vault));
            plan.push(Movement::assets(
                Party::PendingSilo,
                Party::ClaimableSilo,
                values.pending_deposit,
            ));
        } else {
            plan.push(Movement::assets(
                Party::PendingSilo,
                Party::ClaimableSilo,
                values.assets_to_withdraw,
            ));
        }

        plan.push(Movement::assets(owner, Party::Vault, values.total_fees()));
        plan.push(Movement::assets(
            Party::Vault,
            fee_party(config.protocol_fee.recipient),
            values.fees1,
        ));
        plan.push(Movement::assets(
            Party::Vault,
            fee_party(config.operator_fee.recipient),
            values.fees2,
        ));

        if reopen {
            plan.push(Movement::assets(owner, Party::Vault, values.new_total_assets));
        }

        plan.retain(|m| m.amount() > 0);
        plan
    }
}

fn fee_party(recipient: AccountId) -> Party {
    Party::Account(recipient)
}
