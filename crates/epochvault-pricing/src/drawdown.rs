//! Drawdown guard.
//!
//! A settlement is rejected when the reported balance falls below
//! `last * (1 - max_drawdown_bps / 10_000)`. The comparison is done on the
//! scaled integers, so a balance exactly on the floor passes and one unit
//! below it fails.

use epochvault_types::{Amount, Result, VaultError, constants};

/// Lowest balance accepted after an epoch that started at `last_saved_balance`,
/// rounded up.
pub fn drawdown_floor(last_saved_balance: Amount, max_drawdown_bps: u32) -> Result<Amount> {
    let scaled = scaled_floor(last_saved_balance, max_drawdown_bps)?;
    Ok(scaled.div_ceil(constants::BPS_DIVIDER))
}

fn scaled_floor(last_saved_balance: Amount, max_drawdown_bps: u32) -> Result<Amount> {
    let kept_bps = constants::BPS_DIVIDER.saturating_sub(Amount::from(max_drawdown_bps));
    last_saved_balance
        .checked_mul(kept_bps)
        .ok_or(VaultError::ArithmeticOverflow {
            context: "drawdown_floor",
        })
}

/// Accept or reject a proposed balance.
///
/// # Errors
/// Returns [`VaultError::MaxDrawdownExceeded`] when `new_saved_balance` is
/// below the floor.
pub fn check_drawdown(
    last_saved_balance: Amount,
    new_saved_balance: Amount,
    max_drawdown_bps: u32,
) -> Result<()> {
    let floor_scaled = scaled_floor(last_saved_balance, max_drawdown_bps)?;
    let new_scaled = new_saved_balance
        .checked_mul(constants::BPS_DIVIDER)
        .ok_or(VaultError::ArithmeticOverflow {
            context: "check_drawdown",
        })?;
    if new_scaled < floor_scaled {
        let floor = floor_scaled.div_ceil(constants::BPS_DIVIDER);
        tracing::warn!(
            last = %last_saved_balance,
            new = %new_saved_balance,
            floor = %floor,
            max_drawdown_bps,
            "Settlement rejected by drawdown guard"
        );
        return Err(VaultError::MaxDrawdownExceeded {
            last: last_saved_balance,
            new: new_saved_balance,
            floor,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_at_floor_passes() {
        // 10% bound on 1_000_000 → floor 900_000
        assert_eq!(drawdown_floor(1_000_000, 1_000).unwrap(), 900_000);
        assert!(check_drawdown(1_000_000, 900_000, 1_000).is_ok());
    }

    #[test]
    fn one_below_floor_fails() {
        let err = check_drawdown(1_000_000, 899_999, 1_000).unwrap_err();
        assert!(matches!(
            err,
            VaultError::MaxDrawdownExceeded {
                last: 1_000_000,
                new: 899_999,
                floor: 900_000
            }
        ));
    }

    #[test]
    fn gains_always_pass() {
        assert!(check_drawdown(1_000_000, 2_000_000, 0).is_ok());
    }

    #[test]
    fn zero_bound_rejects_any_loss() {
        assert!(check_drawdown(1_000, 1_000, 0).is_ok());
        assert!(check_drawdown(1_000, 999, 0).is_err());
    }

    #[test]
    fn full_bound_accepts_total_loss() {
        assert!(check_drawdown(1_000_000, 0, 10_000).is_ok());
    }

    #[test]
    fn bootstrap_balance_never_fails() {
        assert!(check_drawdown(0, 0, 0).is_ok());
    }

    #[test]
    fn fractional_floor_uses_exact_comparison() {
        // 15% of 999 → floor 849.15; 849 is below, 850 passes.
        assert_eq!(drawdown_floor(999, 1_500).unwrap(), 850);
        assert!(check_drawdown(999, 849, 1_500).is_err());
        assert!(check_drawdown(999, 850, 1_500).is_ok());
    }
}
