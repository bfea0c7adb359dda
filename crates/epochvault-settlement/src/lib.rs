//! # epochvault-settlement
//!
//! **Settlement plane**: the vault lifecycle, the two-phase preview/commit
//! settlement protocol, and the supply conservation check that runs after
//! every transition.
//!
//! ## Architecture
//!
//! A manager settles an epoch in two steps:
//! 1. `preview_settle`: pure; fees, drawdown check, conversion at the NAV
//!    snapshot, netting of deposits against redemptions
//! 2. `settle` / `open`: re-derives the identical [`SettleValues`], plans
//!    every custody movement, applies them as one batch, then records the
//!    values on the epoch and advances the epoch id
//!
//! ## Lifecycle
//!
//! ```text
//!   OPEN ──close()──▶ CLOSED ──settle()──▶ CLOSED (next epoch)
//!     ▲                  │
//!     └─────open()───────┘
//! ```
//!
//! [`SettleValues`]: epochvault_types::SettleValues

pub mod engine;
pub mod handle;
pub mod supply_conservation;
pub mod vault;

pub use engine::SettlementEngine;
pub use handle::SharedVault;
pub use supply_conservation::SupplyConservation;
pub use vault::Vault;
