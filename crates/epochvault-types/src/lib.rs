//! # epochvault-types
//!
//! Shared types, errors, and configuration for the **EpochVault** ledger.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`AccountId`], [`EpochId`], [`RequestId`]
//! - **Lifecycle**: [`VaultState`]
//! - **Custody addressing**: [`Party`], [`Unit`], [`Movement`]
//! - **Settlement model**: [`SettleValues`]
//! - **Audit trail**: [`VaultEvent`], [`VaultEventKind`]
//! - **Configuration**: [`VaultConfig`], [`FeeSchedule`]
//! - **Errors**: [`VaultError`] with `EV_ERR_` prefix codes
//! - **Constants**: basis-point denominators, fee ceilings, year length

pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod ids;
pub mod settle;
pub mod state;

// Re-export all primary types at crate root for ergonomic imports:
//   use epochvault_types::{AccountId, EpochId, SettleValues, VaultError, ...};

pub use config::*;
pub use error::*;
pub use event::*;
pub use ids::*;
pub use settle::*;
pub use state::*;

/// Amount of assets or shares, in indivisible base units.
pub type Amount = u128;

// Constants are accessed via `epochvault_types::constants::FOO`
// (not re-exported to avoid name collisions).
