//! # epochvault-pricing
//!
//! **Pure deterministic settlement math for EpochVault.**
//!
//! Every function here is side-effect free: the same inputs always produce
//! the same outputs, so a settlement preview and the commit that follows it
//! agree to the last unit.
//!
//! - **Conversion**: asset ↔ share pricing with `+1` stability guards
//! - **Fees**: two annualized schedules prorated over an epoch
//! - **Drawdown**: rejects settlements whose balance falls below a floor
//! - **Determinism**: SHA-256 digest committing to a settlement record

pub mod conversion;
pub mod determinism;
pub mod drawdown;
pub mod fees;

pub use conversion::{
    convert_to_assets, convert_to_shares, mul_div_floor, preview_mint_shares,
    preview_withdraw_assets,
};
pub use determinism::{compute_settlement_digest, settlement_digest_hex, verify_settlement_digest};
pub use drawdown::{check_drawdown, drawdown_floor};
pub use fees::{FeeAmounts, average_balance, compute_fees, epoch_duration_secs, prorated_fee};
