//! Snapshot-based asset ↔ share conversion.
//!
//! All conversions add one to both sides of the ratio:
//!
//! ```text
//! shares = assets * (total_supply + 1) / (total_assets + 1)
//! assets = shares * (total_assets + 1) / (total_supply + 1)
//! ```
//!
//! The denominator can therefore never be zero, an empty vault prices at
//! exactly one, and floor division always rounds against the requester.
//! Products are formed at 256 bits, so 18-decimal token amounts never
//! overflow an intermediate.
//!
//! Settlement prices deposits first, against the pre-settlement supply and
//! the post-fee NAV, and redemptions second, as if the deposit shares had already
//! been minted. Swapping the two changes who bears rounding and the realized
//! price of mixed epochs.

use epochvault_types::{Amount, Result, VaultError};

#[allow(clippy::all, clippy::pedantic, dead_code)]
mod wide {
    uint::construct_uint! {
        /// Unsigned 256-bit integer holding full `u128 * u128` products.
        pub struct U256(4);
    }
}

use wide::U256;

/// `value * numerator / denominator`, rounded down, with overflow reported
/// against `context`.
///
/// The product is taken at full width, so only a quotient that does not fit
/// an [`Amount`] overflows.
pub fn mul_div_floor(
    value: Amount,
    numerator: Amount,
    denominator: Amount,
    context: &'static str,
) -> Result<Amount> {
    if denominator == 0 {
        return Err(VaultError::Internal(format!("{context}: zero denominator")));
    }
    if let Some(product) = value.checked_mul(numerator) {
        return Ok(product / denominator);
    }
    let quotient = U256::from(value)
        .checked_mul(U256::from(numerator))
        .and_then(|product| product.checked_div(U256::from(denominator)))
        .ok_or(VaultError::ArithmeticOverflow { context })?;
    if quotient.bits() > 128 {
        return Err(VaultError::ArithmeticOverflow { context });
    }
    Ok(quotient.low_u128())
}

fn plus_one(value: Amount, context: &'static str) -> Result<Amount> {
    value
        .checked_add(1)
        .ok_or(VaultError::ArithmeticOverflow { context })
}

/// Shares minted for an epoch's aggregated deposits.
///
/// Uses the supply as it stood before the settlement and the post-fee NAV.
pub fn preview_mint_shares(
    pending_deposit: Amount,
    total_supply: Amount,
    last_saved_balance: Amount,
) -> Result<Amount> {
    const CTX: &str = "preview_mint_shares";
    mul_div_floor(
        pending_deposit,
        plus_one(total_supply, CTX)?,
        plus_one(last_saved_balance, CTX)?,
        CTX,
    )
}

/// Assets released for an epoch's aggregated redemptions.
///
/// Priced as if `shares_to_mint` had already been minted against
/// `pending_deposit`.
pub fn preview_withdraw_assets(
    pending_redeem: Amount,
    last_saved_balance: Amount,
    pending_deposit: Amount,
    total_supply: Amount,
    shares_to_mint: Amount,
) -> Result<Amount> {
    const CTX: &str = "preview_withdraw_assets";
    let assets = last_saved_balance
        .checked_add(pending_deposit)
        .ok_or(VaultError::ArithmeticOverflow { context: CTX })?;
    let supply = total_supply
        .checked_add(shares_to_mint)
        .ok_or(VaultError::ArithmeticOverflow { context: CTX })?;
    mul_div_floor(pending_redeem, plus_one(assets, CTX)?, plus_one(supply, CTX)?, CTX)
}

/// Live conversion used by instant deposits while the vault is open.
pub fn convert_to_shares(assets: Amount, total_assets: Amount, total_supply: Amount) -> Result<Amount> {
    const CTX: &str = "convert_to_shares";
    mul_div_floor(
        assets,
        plus_one(total_supply, CTX)?,
        plus_one(total_assets, CTX)?,
        CTX,
    )
}

/// Live conversion used by instant redemptions while the vault is open.
pub fn convert_to_assets(shares: Amount, total_assets: Amount, total_supply: Amount) -> Result<Amount> {
    const CTX: &str = "convert_to_assets";
    mul_div_floor(
        shares,
        plus_one(total_assets, CTX)?,
        plus_one(total_supply, CTX)?,
        CTX,
    )
}
