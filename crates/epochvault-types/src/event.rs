//! Audit trail events emitted by a vault.
//!
//! Every lifecycle transition, request, claim and settlement appends one
//! [`VaultEvent`]. Together they form an append-only record that can be
//! replayed to audit how balances reached their current values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, Amount, EpochId};

/// What kind of action an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VaultEventKind {
    /// The vault closed and a new epoch started accepting requests.
    EpochStart,
    /// A settlement was applied (the epoch is now claimable).
    EpochSettled,
    /// The vault reopened for instant conversions.
    VaultOpened,
    /// A deposit request was recorded.
    DepositRequested,
    /// A redeem request was recorded.
    RedeemRequested,
    /// Settled shares were claimed.
    DepositClaimed,
    /// Settled assets were claimed.
    RedeemClaimed,
    /// An instant deposit while open.
    InstantDeposit,
    /// An instant redemption while open.
    InstantRedeem,
    /// A manager changed the configuration.
    ConfigUpdated,
}

impl std::fmt::Display for VaultEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EpochStart => write!(f, "EPOCH_START"),
            Self::EpochSettled => write!(f, "EPOCH_SETTLED"),
            Self::VaultOpened => write!(f, "VAULT_OPENED"),
            Self::DepositRequested => write!(f, "DEPOSIT_REQUESTED"),
            Self::RedeemRequested => write!(f, "REDEEM_REQUESTED"),
            Self::DepositClaimed => write!(f, "DEPOSIT_CLAIMED"),
            Self::RedeemClaimed => write!(f, "REDEEM_CLAIMED"),
            Self::InstantDeposit => write!(f, "INSTANT_DEPOSIT"),
            Self::InstantRedeem => write!(f, "INSTANT_REDEEM"),
            Self::ConfigUpdated => write!(f, "CONFIG_UPDATED"),
        }
    }
}

/// One entry of the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultEvent {
    /// What happened.
    pub kind: VaultEventKind,
    /// The epoch active when it happened.
    pub epoch_id: EpochId,
    /// The account the action concerns, if any.
    pub account: Option<AccountId>,
    /// Primary amount (assets or shares depending on `kind`).
    pub amount: Amount,
    /// Secondary amount (the converted side, if any).
    pub counter_amount: Amount,
    /// Wall-clock time the event was recorded, when the caller supplied one.
    pub at: Option<DateTime<Utc>>,
}

impl VaultEvent {
    /// Create an event with no counter amount and no timestamp.
    #[must_use]
    pub fn new(kind: VaultEventKind, epoch_id: EpochId, account: Option<AccountId>, amount: Amount) -> Self {
        Self {
            kind,
            epoch_id,
            account,
            amount,
            counter_amount: 0,
            at: None,
        }
    }

    /// Attach the converted amount.
    #[must_use]
    pub fn with_counter(mut self, counter_amount: Amount) -> Self {
        self.counter_amount = counter_amount;
        self
    }

    /// Attach a timestamp.
    #[must_use]
    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = Some(at);
        self
    }
}
