//! Settlement digests for preview/commit verification.
//!
//! A manager previews a settlement, inspects it, and then commits. The
//! digest commits to every field of the previewed [`SettleValues`], so the
//! commit can prove it applied exactly what was reviewed.

use epochvault_types::{SettleValues, constants};
use sha2::{Digest, Sha256};

/// Compute the SHA-256 digest of a settlement record.
///
/// Field order is fixed; the same record always produces the same digest.
#[must_use]
pub fn compute_settlement_digest(values: &SettleValues) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(constants::SETTLEMENT_DIGEST_DOMAIN);
    hasher.update(values.epoch_id.0.to_le_bytes());
    for amount in [
        values.pending_deposit,
        values.pending_redeem,
        values.shares_to_mint,
        values.assets_to_withdraw,
        values.assets_to_owner,
        values.assets_to_vault,
        values.fees1,
        values.fees2,
        values.expected_asset_from_owner,
        values.last_saved_balance,
        values.total_supply_snapshot,
        values.new_total_assets,
    ] {
        hasher.update(amount.to_le_bytes());
    }
    hasher.update(values.settled_at.timestamp().to_le_bytes());
    hasher.update(values.settled_at.timestamp_subsec_nanos().to_le_bytes());

    let result = hasher.finalize();
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&result);
    digest
}

/// Hex form of [`compute_settlement_digest`], for logs and error messages.
#[must_use]
pub fn settlement_digest_hex(values: &SettleValues) -> String {
    hex::encode(compute_settlement_digest(values))
}

/// Recompute and compare against an expected digest.
#[must_use]
pub fn verify_settlement_digest(values: &SettleValues, expected: &[u8; 32]) -> bool {
    compute_settlement_digest(values) == *expected
}
