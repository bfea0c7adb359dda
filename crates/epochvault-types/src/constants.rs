//! System-wide constants for the EpochVault ledger.

/// Basis-point denominator (100% = 10 000 bps).
pub const BPS_DIVIDER: u128 = 10_000;

/// Upper bound on any single fee rate, in basis points (30% per year).
pub const MAX_FEE_BPS: u32 = 3_000;

/// Upper bound on the drawdown bound, in basis points (100%).
pub const MAX_DRAWDOWN_BPS: u32 = 10_000;

/// Default drawdown bound applied by [`crate::VaultConfig::new`] (30%).
pub const DEFAULT_MAX_DRAWDOWN_BPS: u32 = 3_000;

/// Seconds in a (non-leap) year, used to prorate annualized fee rates.
pub const SECONDS_PER_YEAR: u128 = 31_536_000;

/// Maximum number of audit events retained by a vault before the oldest
/// are discarded.
pub const MAX_RETAINED_EVENTS: usize = 10_000;

/// Domain separator for settlement digests.
pub const SETTLEMENT_DIGEST_DOMAIN: &[u8] = b"epochvault:settle:v1:";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "EpochVault";
