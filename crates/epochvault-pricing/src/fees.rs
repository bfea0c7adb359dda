//! Annualized fee schedules prorated over an epoch.
//!
//! ```text
//! fee = average_balance * rate_bps * duration_secs / (10_000 * SECONDS_PER_YEAR)
//! ```
//!
//! Both schedules are computed from the same average balance so the two
//! recipients are paid out of one consistent snapshot.

use chrono::{DateTime, Utc};
use epochvault_types::{Amount, Result, VaultError, constants};

use crate::conversion::mul_div_floor;

/// The two fee amounts owed by one settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeeAmounts {
    /// Fee under the first schedule.
    pub fees1: Amount,
    /// Fee under the second schedule.
    pub fees2: Amount,
}

impl FeeAmounts {
    /// Sum of both fees.
    pub fn total(&self) -> Result<Amount> {
        self.fees1
            .checked_add(self.fees2)
            .ok_or(VaultError::ArithmeticOverflow {
                context: "FeeAmounts::total",
            })
    }
}

/// Midpoint of the balances at the start and end of an epoch, rounded down.
#[must_use]
pub fn average_balance(last_saved_balance: Amount, new_saved_balance: Amount) -> Amount {
    last_saved_balance / 2 + new_saved_balance / 2 + (last_saved_balance % 2 + new_saved_balance % 2) / 2
}

/// Whole seconds between the start of an epoch and `now`, clamped at zero.
#[must_use]
pub fn epoch_duration_secs(started_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    u64::try_from((now - started_at).num_seconds()).unwrap_or(0)
}

/// One schedule's fee for `duration_secs` at `rate_bps` per year.
pub fn prorated_fee(average_balance: Amount, duration_secs: u64, rate_bps: u32) -> Result<Amount> {
    const CTX: &str = "prorated_fee";
    if rate_bps == 0 || duration_secs == 0 {
        return Ok(0);
    }
    // rate_bps * duration_secs < 2^96, so only the balance product needs width.
    let rate_time = Amount::from(rate_bps) * Amount::from(duration_secs);
    mul_div_floor(
        average_balance,
        rate_time,
        constants::BPS_DIVIDER * constants::SECONDS_PER_YEAR,
        CTX,
    )
}

/// Both fees for one settlement.
pub fn compute_fees(
    average_balance: Amount,
    duration_secs: u64,
    rate1_bps: u32,
    rate2_bps: u32,
) -> Result<FeeAmounts> {
    Ok(FeeAmounts {
        fees1: prorated_fee(average_balance, duration_secs, rate1_bps)?,
        fees2: prorated_fee(average_balance, duration_secs, rate2_bps)?,
    })
}
