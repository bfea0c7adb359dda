//! Vault lifecycle state and custody addressing.
//!
//! A vault alternates between two states:
//! **OPEN ⇄ CLOSED**
//!
//! While OPEN, holders convert instantly at the live price. While CLOSED,
//! the underlying assets sit with the strategy owner and holders can only
//! queue requests that the next settlement nets out.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{AccountId, Amount};

/// Lifecycle state of a vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VaultState {
    /// Instant deposit/redeem allowed; requests rejected.
    Open,
    /// Assets deployed; requests accumulate for the active epoch.
    Closed,
}

impl fmt::Display for VaultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

/// The two units of value a vault accounts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Unit {
    /// The underlying asset.
    Asset,
    /// Vault shares.
    Share,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asset => write!(f, "ASSET"),
            Self::Share => write!(f, "SHARE"),
        }
    }
}

/// A holder of balances in the custody layer.
///
/// `PendingSilo` and `ClaimableSilo` are separate holding areas:
/// requested-but-unsettled funds never share custody with
/// settled-and-claimable funds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Party {
    /// An external account (holder, owner, fee recipient).
    Account(AccountId),
    /// The vault's own idle balance.
    Vault,
    /// Funds queued by requests of the active epoch.
    PendingSilo,
    /// Funds settled and waiting to be claimed.
    ClaimableSilo,
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Account(id) => write!(f, "account:{id}"),
            Self::Vault => write!(f, "vault"),
            Self::PendingSilo => write!(f, "pending-silo"),
            Self::ClaimableSilo => write!(f, "claimable-silo"),
        }
    }
}

/// One balance change instructed to the custody layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Movement {
    /// Move `amount` of `unit` between two parties.
    Transfer {
        unit: Unit,
        from: Party,
        to: Party,
        amount: Amount,
    },
    /// Create new shares.
    Mint { to: Party, amount: Amount },
    /// Destroy existing shares.
    Burn { from: Party, amount: Amount },
}

impl Movement {
    /// Shorthand for an asset transfer.
    #[must_use]
    pub fn assets(from: Party, to: Party, amount: Amount) -> Self {
        Self::Transfer {
            unit: Unit::Asset,
            from,
            to,
            amount,
        }
    }

    /// Shorthand for a share transfer.
    #[must_use]
    pub fn shares(from: Party, to: Party, amount: Amount) -> Self {
        Self::Transfer {
            unit: Unit::Share,
            from,
            to,
            amount,
        }
    }

    /// The amount carried by this movement.
    #[must_use]
    pub fn amount(&self) -> Amount {
        match self {
            Self::Transfer { amount, .. } | Self::Mint { amount, .. } | Self::Burn { amount, .. } => {
                *amount
            }
        }
    }
}
