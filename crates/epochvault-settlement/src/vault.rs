//! The vault: lifecycle state machine and every external entry point.
//!
//! A [`Vault`] owns its epoch ledger, its tracked totals and the custody
//! handle it moves value through. Every mutating entry point takes
//! `&mut self`, so exclusive borrowing is the per-instance mutual exclusion;
//! wrap the vault in a [`SharedVault`](crate::SharedVault) to share it
//! across async tasks.
//!
//! Each entry point checks its preconditions before touching anything,
//! then applies all of its custody movements in one batch, then updates
//! the ledger and totals. Share supply and idle assets are reconciled
//! against custody last; a mismatch there is reported on top of the applied
//! transition and halts the vault.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use epochvault_ledger::{
    Custody, EpochLedger, RecordReceipt, RequestAck, RequestReceiver,
};
use epochvault_pricing::{convert_to_assets, convert_to_shares, settlement_digest_hex};
use epochvault_types::{
    AccountId, Amount, EpochId, Movement, Party, RequestId, Result, SettleValues, Unit,
    VaultConfig, VaultError, VaultEvent, VaultEventKind, VaultState, constants, price_per_share,
};
use rust_decimal::Decimal;

use crate::engine::SettlementEngine;
use crate::supply_conservation::SupplyConservation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    Deposit,
    Redeem,
}

impl RequestKind {
    /// Unit locked by the request.
    fn locked_unit(self) -> Unit {
        match self {
            Self::Deposit => Unit::Asset,
            Self::Redeem => Unit::Share,
        }
    }

    /// Unit paid out by the claim.
    fn claimed_unit(self) -> Unit {
        match self {
            Self::Deposit => Unit::Share,
            Self::Redeem => Unit::Asset,
        }
    }

    fn requested_event(self) -> VaultEventKind {
        match self {
            Self::Deposit => VaultEventKind::DepositRequested,
            Self::Redeem => VaultEventKind::RedeemRequested,
        }
    }

    fn claimed_event(self) -> VaultEventKind {
        match self {
            Self::Deposit => VaultEventKind::DepositClaimed,
            Self::Redeem => VaultEventKind::RedeemClaimed,
        }
    }
}

/// An epoch-batched vault over a custody layer `C`.
#[derive(Debug)]
pub struct Vault<C: Custody> {
    config: VaultConfig,
    state: VaultState,
    epoch_id: EpochId,
    /// Net asset value the vault accounts for.
    total_assets: Amount,
    /// Shares outstanding, including shares queued for redemption.
    total_supply: Amount,
    ledger: EpochLedger,
    custody: C,
    supply: SupplyConservation,
    events: VecDeque<VaultEvent>,
}

impl<C: Custody> Vault<C> {
    /// Create an OPEN vault at the genesis epoch.
    ///
    /// # Errors
    /// - `InvalidConfig` if the config fails validation or the custody
    ///   layer already has shares in circulation
    pub fn new(config: VaultConfig, custody: C) -> Result<Self> {
        config.validate()?;
        if custody.share_supply() != 0 {
            return Err(VaultError::InvalidConfig {
                reason: format!(
                    "custody already has {} shares in circulation",
                    custody.share_supply()
                ),
            });
        }
        tracing::info!(
            engine = constants::ENGINE_NAME,
            version = constants::VERSION,
            manager = %config.manager,
            owner = %config.owner,
            max_drawdown_bps = config.max_drawdown_bps,
            "Vault created"
        );
        Ok(Self {
            config,
            state: VaultState::Open,
            epoch_id: EpochId::GENESIS,
            total_assets: 0,
            total_supply: 0,
            ledger: EpochLedger::new(),
            custody,
            supply: SupplyConservation::new(),
            events: VecDeque::new(),
        })
    }

    // =====================================================================
    // Accessors
    // =====================================================================

    #[must_use]
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> VaultState {
        self.state
    }

    /// The active epoch while CLOSED; the next epoch to open while OPEN.
    #[must_use]
    pub fn epoch_id(&self) -> EpochId {
        self.epoch_id
    }

    #[must_use]
    pub fn total_assets(&self) -> Amount {
        self.total_assets
    }

    #[must_use]
    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    #[must_use]
    pub fn ledger(&self) -> &EpochLedger {
        &self.ledger
    }

    #[must_use]
    pub fn custody(&self) -> &C {
        &self.custody
    }

    /// Mutable custody access, for funding accounts and for reflecting
    /// strategy gains or losses on the owner's balance.
    pub fn custody_mut(&mut self) -> &mut C {
        &mut self.custody
    }

    /// Retained audit events, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &VaultEvent> {
        self.events.iter()
    }

    #[must_use]
    pub fn last_event(&self) -> Option<&VaultEvent> {
        self.events.back()
    }

    /// Live price per share: `(total_assets + 1) / (total_supply + 1)`.
    #[must_use]
    pub fn price_per_share(&self) -> Option<Decimal> {
        price_per_share(self.total_assets, self.total_supply)
    }

    // =====================================================================
    // Requests (CLOSED only)
    // =====================================================================

    /// Queue `assets` for deposit in the active epoch, on behalf of
    /// `receiver`.
    ///
    /// Moves the assets from `owner` into pending custody and records the
    /// request. If `receiver` still has a deposit request in an earlier,
    /// settled epoch, its shares are claimed to `receiver` first. When a
    /// `hook` is given it is notified after the update; a hook failure
    /// undoes the request and returns `ReceiverRejected`.
    ///
    /// # Errors
    /// - `InvalidState` unless CLOSED
    /// - `Unauthorized` if `caller != owner`
    /// - `ZeroAmount` if `assets == 0`
    /// - `InsufficientBalance` if `owner` holds fewer assets
    /// - `ReceiverRejected` if the hook fails
    pub fn request_deposit(
        &mut self,
        caller: AccountId,
        assets: Amount,
        receiver: AccountId,
        owner: AccountId,
        data: &[u8],
        hook: Option<&mut dyn RequestReceiver>,
    ) -> Result<RequestId> {
        self.submit_request(RequestKind::Deposit, caller, assets, receiver, owner, data, hook)
    }

    /// Queue `shares` for redemption in the active epoch, on behalf of
    /// `receiver`.
    ///
    /// Same flow as [`Vault::request_deposit`], with shares locked in
    /// pending custody and any earlier settled redemption of `receiver`
    /// claimed first.
    pub fn request_redeem(
        &mut self,
        caller: AccountId,
        shares: Amount,
        receiver: AccountId,
        owner: AccountId,
        data: &[u8],
        hook: Option<&mut dyn RequestReceiver>,
    ) -> Result<RequestId> {
        self.submit_request(RequestKind::Redeem, caller, shares, receiver, owner, data, hook)
    }

    #[allow(clippy::too_many_arguments)]
    fn submit_request(
        &mut self,
        kind: RequestKind,
        caller: AccountId,
        amount: Amount,
        receiver: AccountId,
        owner: AccountId,
        data: &[u8],
        hook: Option<&mut dyn RequestReceiver>,
    ) -> Result<RequestId> {
        self.require_state(VaultState::Closed)?;
        if caller != owner {
            return Err(VaultError::Unauthorized {
                caller,
                reason: format!("cannot spend the balance of {owner}"),
            });
        }
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let epoch_id = self.epoch_id;

        // A receiver has one request pointer per side; settle out the old
        // one before it is overwritten.
        let auto_claim = match self.last_request_epoch(kind, receiver) {
            Some(previous) if previous != epoch_id => {
                Some((previous, self.claimable(kind, receiver, previous)?))
            }
            _ => None,
        };

        let mut movements = Vec::with_capacity(2);
        if let Some((_, owed)) = auto_claim {
            if owed > 0 {
                movements.push(Movement::Transfer {
                    unit: kind.claimed_unit(),
                    from: Party::ClaimableSilo,
                    to: Party::Account(receiver),
                    amount: owed,
                });
            }
        }
        let lock = Movement::Transfer {
            unit: kind.locked_unit(),
            from: Party::Account(owner),
            to: Party::PendingSilo,
            amount,
        };
        movements.push(lock);

        let receipt = self.record_request(kind, receiver, epoch_id, amount)?;
        if let Err(err) = self.apply(&movements) {
            self.revert_request(kind, &receipt)?;
            return Err(err);
        }
        if let Some((previous, owed)) = auto_claim {
            self.consume_claim(kind, receiver, previous)?;
            if owed > 0 {
                self.push_event(VaultEvent::new(
                    kind.claimed_event(),
                    previous,
                    Some(receiver),
                    owed,
                ));
            }
        }

        if let Some(hook) = hook {
            let ack = RequestAck {
                operator: caller,
                owner,
                receiver,
                request_id: epoch_id,
                amount,
                balance_after: receipt.balance_after,
                data: data.to_vec(),
            };
            let outcome = match kind {
                RequestKind::Deposit => hook.on_deposit_requested(&ack),
                RequestKind::Redeem => hook.on_redeem_requested(&ack),
            };
            if let Err(err) = outcome {
                tracing::warn!(
                    receiver = %receiver,
                    epoch = epoch_id.0,
                    kind = ?kind,
                    error = %err,
                    "Request rejected by receiver hook, rolling back"
                );
                let unlock = Movement::Transfer {
                    unit: kind.locked_unit(),
                    from: Party::PendingSilo,
                    to: Party::Account(owner),
                    amount,
                };
                self.apply(&[unlock])?;
                self.revert_request(kind, &receipt)?;
                return Err(VaultError::ReceiverRejected {
                    reason: err.to_string(),
                });
            }
        }

        self.push_event(VaultEvent::new(
            kind.requested_event(),
            epoch_id,
            Some(receiver),
            amount,
        ));
        tracing::debug!(
            kind = ?kind,
            receiver = %receiver,
            owner = %owner,
            epoch = epoch_id.0,
            amount = %amount,
            "Request recorded"
        );
        self.check_conservation()?;
        Ok(epoch_id)
    }

    // =====================================================================
    // Claims (either state)
    // =====================================================================

    /// Claim the shares owed for `caller`'s last settled deposit request,
    /// delivering them to `receiver`. Returns zero when nothing is owed.
    pub fn claim_deposit(&mut self, caller: AccountId, receiver: AccountId) -> Result<Amount> {
        self.claim(RequestKind::Deposit, caller, receiver)
    }

    /// Claim the assets owed for `caller`'s last settled redeem request,
    /// delivering them to `receiver`. Returns zero when nothing is owed.
    pub fn claim_redeem(&mut self, caller: AccountId, receiver: AccountId) -> Result<Amount> {
        self.claim(RequestKind::Redeem, caller, receiver)
    }

    fn claim(&mut self, kind: RequestKind, caller: AccountId, receiver: AccountId) -> Result<Amount> {
        let Some(epoch_id) = self.last_request_epoch(kind, caller) else {
            return Ok(0);
        };
        let owed = self.claimable(kind, caller, epoch_id)?;
        if owed == 0 {
            return Ok(0);
        }
        self.apply(&[Movement::Transfer {
            unit: kind.claimed_unit(),
            from: Party::ClaimableSilo,
            to: Party::Account(receiver),
            amount: owed,
        }])?;
        self.consume_claim(kind, caller, epoch_id)?;

        self.push_event(VaultEvent::new(kind.claimed_event(), epoch_id, Some(caller), owed));
        tracing::debug!(
            kind = ?kind,
            account = %caller,
            receiver = %receiver,
            epoch = epoch_id.0,
            amount = %owed,
            "Claimed"
        );
        self.check_conservation()?;
        Ok(owed)
    }

    /// Shares `account` would receive from [`Vault::claim_deposit`] now.
    pub fn preview_claim_deposit(&self, account: AccountId) -> Result<Amount> {
        match self.ledger.last_deposit_epoch(account) {
            Some(epoch_id) => self.ledger.claimable_shares(account, epoch_id),
            None => Ok(0),
        }
    }

    /// Assets `account` would receive from [`Vault::claim_redeem`] now.
    pub fn preview_claim_redeem(&self, account: AccountId) -> Result<Amount> {
        match self.ledger.last_redeem_epoch(account) {
            Some(epoch_id) => self.ledger.claimable_assets(account, epoch_id),
            None => Ok(0),
        }
    }

    /// Assets `account` has queued in the active, unsettled epoch.
    #[must_use]
    pub fn pending_deposit_request(&self, account: AccountId) -> Amount {
        self.request_balance(RequestKind::Deposit, account, false)
    }

    /// Shares `account` has queued in the active, unsettled epoch.
    #[must_use]
    pub fn pending_redeem_request(&self, account: AccountId) -> Amount {
        self.request_balance(RequestKind::Redeem, account, false)
    }

    /// Assets of `account`'s deposit request that has settled but not been
    /// claimed yet.
    #[must_use]
    pub fn claimable_deposit_request(&self, account: AccountId) -> Amount {
        self.request_balance(RequestKind::Deposit, account, true)
    }

    /// Shares of `account`'s redeem request that has settled but not been
    /// claimed yet.
    #[must_use]
    pub fn claimable_redeem_request(&self, account: AccountId) -> Amount {
        self.request_balance(RequestKind::Redeem, account, true)
    }

    fn request_balance(&self, kind: RequestKind, account: AccountId, settled: bool) -> Amount {
        self.last_request_epoch(kind, account)
            .and_then(|epoch_id| self.ledger.epoch(epoch_id))
            .filter(|record| record.is_settled() == settled)
            .map_or(0, |record| match kind {
                RequestKind::Deposit => record.deposit_request(account),
                RequestKind::Redeem => record.redeem_request(account),
            })
    }

    // =====================================================================
    // Lifecycle (manager only)
    // =====================================================================

    /// OPEN → CLOSED. Starts the epoch at the current total assets and
    /// hands the vault's assets to the owner.
    ///
    /// # Errors
    /// - `Unauthorized` unless `caller` is the manager
    /// - `InvalidState` unless OPEN
    pub fn close(&mut self, caller: AccountId, now: DateTime<Utc>) -> Result<EpochId> {
        self.require_manager(caller, "close")?;
        self.require_state(VaultState::Open)?;
        let epoch_id = self.epoch_id;
        if self.ledger.epoch(epoch_id).is_some() {
            return Err(VaultError::Internal(format!("{epoch_id} was already started")));
        }

        self.apply(&[Movement::assets(
            Party::Vault,
            Party::Account(self.config.owner),
            self.total_assets,
        )])?;
        self.ledger.begin_epoch(epoch_id, self.total_assets, now)?;
        self.state = VaultState::Closed;

        self.push_event(VaultEvent::new(VaultEventKind::EpochStart, epoch_id, None, self.total_assets).at(now));
        tracing::info!(
            epoch = epoch_id.0,
            last_saved_balance = %self.total_assets,
            total_supply = %self.total_supply,
            "Vault closed, epoch started"
        );
        self.check_conservation()?;
        Ok(epoch_id)
    }

    /// Compute what settling the active epoch at `new_saved_balance` would
    /// do. Read-only.
    ///
    /// # Errors
    /// - `Unauthorized` unless `caller` is the manager
    /// - `InvalidState` unless CLOSED
    /// - `MaxDrawdownExceeded` if the balance is below the drawdown floor
    pub fn preview_settle(
        &self,
        caller: AccountId,
        new_saved_balance: Amount,
        now: DateTime<Utc>,
    ) -> Result<SettleValues> {
        self.require_manager(caller, "preview_settle")?;
        self.require_state(VaultState::Closed)?;
        let record = self.ledger.require_epoch(self.epoch_id)?;
        SettlementEngine::preview(record, self.total_supply, new_saved_balance, now, &self.config)
    }

    /// Settle the active epoch and start the next one; the vault stays
    /// CLOSED.
    ///
    /// # Errors
    /// Same as [`Vault::preview_settle`], plus `InsufficientBalance` when
    /// the owner cannot cover fees or a redemption shortfall. Nothing
    /// changes on failure.
    pub fn settle(
        &mut self,
        caller: AccountId,
        new_saved_balance: Amount,
        now: DateTime<Utc>,
    ) -> Result<SettleValues> {
        self.require_manager(caller, "settle")?;
        self.require_state(VaultState::Closed)?;
        self.commit(new_saved_balance, now, false, None)
    }

    /// [`Vault::settle`], but only if the re-derived values are exactly the
    /// `expected` ones from an earlier preview.
    ///
    /// # Errors
    /// `DeterminismViolation` when the digests differ; nothing changes.
    pub fn settle_checked(
        &mut self,
        caller: AccountId,
        expected: &SettleValues,
        new_saved_balance: Amount,
        now: DateTime<Utc>,
    ) -> Result<SettleValues> {
        self.require_manager(caller, "settle")?;
        self.require_state(VaultState::Closed)?;
        self.commit(new_saved_balance, now, false, Some(expected))
    }

    /// Settle the active epoch at `asset_returned` and go CLOSED → OPEN.
    /// The owner returns the vault's new total assets.
    pub fn open(
        &mut self,
        caller: AccountId,
        asset_returned: Amount,
        now: DateTime<Utc>,
    ) -> Result<SettleValues> {
        self.require_manager(caller, "open")?;
        self.require_state(VaultState::Closed)?;
        self.commit(asset_returned, now, true, None)
    }

    fn commit(
        &mut self,
        new_saved_balance: Amount,
        now: DateTime<Utc>,
        reopen: bool,
        expected: Option<&SettleValues>,
    ) -> Result<SettleValues> {
        let epoch_id = self.epoch_id;
        let record = self.ledger.require_epoch(epoch_id)?;
        let values =
            SettlementEngine::preview(record, self.total_supply, new_saved_balance, now, &self.config)?;

        if let Some(expected) = expected {
            let want = settlement_digest_hex(expected);
            let got = settlement_digest_hex(&values);
            if want != got {
                tracing::warn!(
                    epoch = epoch_id.0,
                    expected = %want,
                    actual = %got,
                    "Settlement differs from preview"
                );
                return Err(VaultError::DeterminismViolation {
                    expected: want,
                    actual: got,
                });
            }
        }

        let new_total_supply = values
            .new_total_supply()
            .ok_or(VaultError::ArithmeticOverflow {
                context: "Vault::commit total_supply",
            })?;
        let next_epoch = epoch_id.next();

        let plan = SettlementEngine::plan_commit(&values, &self.config, reopen);
        self.apply(&plan)?;

        self.ledger.record_settlement(values.clone())?;
        self.total_assets = values.new_total_assets;
        self.total_supply = new_total_supply;
        self.epoch_id = next_epoch;

        self.push_event(
            VaultEvent::new(VaultEventKind::EpochSettled, epoch_id, None, values.shares_to_mint)
                .with_counter(values.assets_to_withdraw)
                .at(now),
        );
        if reopen {
            self.state = VaultState::Open;
            self.push_event(
                VaultEvent::new(VaultEventKind::VaultOpened, epoch_id, None, values.new_total_assets)
                    .at(now),
            );
        } else {
            self.ledger.begin_epoch(next_epoch, values.new_total_assets, now)?;
            self.push_event(
                VaultEvent::new(VaultEventKind::EpochStart, next_epoch, None, values.new_total_assets)
                    .at(now),
            );
        }

        tracing::info!(
            epoch = epoch_id.0,
            next_epoch = next_epoch.0,
            state = %self.state,
            new_saved_balance = %new_saved_balance,
            shares_to_mint = %values.shares_to_mint,
            assets_to_withdraw = %values.assets_to_withdraw,
            fees1 = %values.fees1,
            fees2 = %values.fees2,
            total_assets = %self.total_assets,
            total_supply = %self.total_supply,
            "Epoch settled"
        );
        self.check_conservation()?;
        Ok(values)
    }

    // =====================================================================
    // Instant conversions (OPEN only)
    // =====================================================================

    /// Deposit `assets` from `caller` at the live price; shares go to
    /// `receiver`. Returns the shares minted.
    ///
    /// # Errors
    /// - `InvalidState` unless OPEN
    /// - `ZeroAmount` if `assets` is zero or buys no shares
    /// - `InsufficientBalance` if `caller` holds fewer assets
    pub fn deposit(&mut self, caller: AccountId, assets: Amount, receiver: AccountId) -> Result<Amount> {
        self.require_state(VaultState::Open)?;
        if assets == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let shares = self.preview_deposit(assets)?;
        if shares == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let total_assets = self
            .total_assets
            .checked_add(assets)
            .ok_or(VaultError::ArithmeticOverflow {
                context: "Vault::deposit total_assets",
            })?;
        let total_supply = self
            .total_supply
            .checked_add(shares)
            .ok_or(VaultError::ArithmeticOverflow {
                context: "Vault::deposit total_supply",
            })?;

        self.apply(&[
            Movement::assets(Party::Account(caller), Party::Vault, assets),
            Movement::Mint {
                to: Party::Account(receiver),
                amount: shares,
            },
        ])?;
        self.total_assets = total_assets;
        self.total_supply = total_supply;

        self.push_event(
            VaultEvent::new(VaultEventKind::InstantDeposit, self.epoch_id, Some(receiver), assets)
                .with_counter(shares),
        );
        tracing::debug!(
            caller = %caller,
            receiver = %receiver,
            assets = %assets,
            shares = %shares,
            "Instant deposit"
        );
        self.check_conservation()?;
        Ok(shares)
    }

    /// Redeem `shares` of `owner` at the live price; assets go to
    /// `receiver`. Returns the assets paid out.
    ///
    /// # Errors
    /// - `InvalidState` unless OPEN
    /// - `Unauthorized` if `caller != owner`
    /// - `ZeroAmount` if `shares` is zero
    /// - `InsufficientBalance` if `owner` holds fewer shares
    pub fn redeem(
        &mut self,
        caller: AccountId,
        shares: Amount,
        receiver: AccountId,
        owner: AccountId,
    ) -> Result<Amount> {
        self.require_state(VaultState::Open)?;
        if caller != owner {
            return Err(VaultError::Unauthorized {
                caller,
                reason: format!("cannot redeem shares of {owner}"),
            });
        }
        if shares == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let held = self.custody.balance(Party::Account(owner), Unit::Share);
        if held < shares {
            return Err(VaultError::InsufficientBalance {
                party: Party::Account(owner),
                unit: Unit::Share,
                needed: shares,
                available: held,
            });
        }
        let assets = self.preview_redeem(shares)?;
        let total_assets = self
            .total_assets
            .checked_sub(assets)
            .ok_or(VaultError::ArithmeticOverflow {
                context: "Vault::redeem total_assets",
            })?;
        let total_supply = self
            .total_supply
            .checked_sub(shares)
            .ok_or(VaultError::ArithmeticOverflow {
                context: "Vault::redeem total_supply",
            })?;

        self.apply(&[
            Movement::Burn {
                from: Party::Account(owner),
                amount: shares,
            },
            Movement::assets(Party::Vault, Party::Account(receiver), assets),
        ])?;
        self.total_assets = total_assets;
        self.total_supply = total_supply;

        self.push_event(
            VaultEvent::new(VaultEventKind::InstantRedeem, self.epoch_id, Some(owner), shares)
                .with_counter(assets),
        );
        tracing::debug!(
            owner = %owner,
            receiver = %receiver,
            shares = %shares,
            assets = %assets,
            "Instant redeem"
        );
        self.check_conservation()?;
        Ok(assets)
    }

    /// Shares an instant deposit of `assets` would mint now.
    pub fn preview_deposit(&self, assets: Amount) -> Result<Amount> {
        convert_to_shares(assets, self.total_assets, self.total_supply)
    }

    /// Assets an instant redemption of `shares` would pay out now.
    pub fn preview_redeem(&self, shares: Amount) -> Result<Amount> {
        convert_to_assets(shares, self.total_assets, self.total_supply)
    }

    // =====================================================================
    // Configuration (manager only)
    // =====================================================================

    /// Set both annual fee rates.
    ///
    /// # Errors
    /// `InvalidConfig` if either rate exceeds the fee ceiling.
    pub fn set_fee_schedules(
        &mut self,
        caller: AccountId,
        protocol_rate_bps: u32,
        operator_rate_bps: u32,
    ) -> Result<()> {
        self.update_config(caller, "set_fee_schedules", |cfg| {
            cfg.protocol_fee.rate_bps = protocol_rate_bps;
            cfg.operator_fee.rate_bps = operator_rate_bps;
        })
    }

    /// Set the drawdown bound checked at settlement.
    ///
    /// # Errors
    /// `InvalidConfig` if `max_drawdown_bps` exceeds 100%.
    pub fn set_max_drawdown(&mut self, caller: AccountId, max_drawdown_bps: u32) -> Result<()> {
        self.update_config(caller, "set_max_drawdown", |cfg| {
            cfg.max_drawdown_bps = max_drawdown_bps;
        })
    }

    /// Set where each fee schedule pays out.
    pub fn set_fee_recipients(
        &mut self,
        caller: AccountId,
        protocol: AccountId,
        operator: AccountId,
    ) -> Result<()> {
        self.update_config(caller, "set_fee_recipients", |cfg| {
            cfg.protocol_fee.recipient = protocol;
            cfg.operator_fee.recipient = operator;
        })
    }

    fn update_config(
        &mut self,
        caller: AccountId,
        action: &'static str,
        change: impl FnOnce(&mut VaultConfig),
    ) -> Result<()> {
        self.require_manager(caller, action)?;
        let mut next = self.config.clone();
        change(&mut next);
        next.validate()?;
        self.config = next;

        self.push_event(VaultEvent::new(
            VaultEventKind::ConfigUpdated,
            self.epoch_id,
            Some(caller),
            0,
        ));
        tracing::info!(
            action,
            protocol_fee_bps = self.config.protocol_fee.rate_bps,
            operator_fee_bps = self.config.operator_fee.rate_bps,
            max_drawdown_bps = self.config.max_drawdown_bps,
            "Vault config updated"
        );
        Ok(())
    }

    // =====================================================================
    // Internals
    // =====================================================================

    fn require_state(&self, expected: VaultState) -> Result<()> {
        if self.state != expected {
            return Err(VaultError::InvalidState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    fn require_manager(&self, caller: AccountId, action: &str) -> Result<()> {
        if caller != self.config.manager {
            return Err(VaultError::Unauthorized {
                caller,
                reason: format!("{action} is manager-only"),
            });
        }
        Ok(())
    }

    fn apply(&mut self, movements: &[Movement]) -> Result<()> {
        self.custody.apply(movements)?;
        self.supply.record_batch(movements);
        Ok(())
    }

    /// Runs after a transition has been applied. A failure means custody
    /// was changed behind the vault's back: the transition stays applied,
    /// the error is returned to the caller, and the vault must be treated as
    /// halted until the books are reconciled.
    fn check_conservation(&self) -> Result<()> {
        let checked = self
            .supply
            .verify_shares(self.total_supply, self.custody.share_supply())
            .and_then(|()| {
                if self.state == VaultState::Open {
                    self.supply.verify_idle_assets(
                        self.total_assets,
                        self.custody.balance(Party::Vault, Unit::Asset),
                    )
                } else {
                    Ok(())
                }
            });
        if let Err(e) = &checked {
            tracing::error!(
                epoch = self.epoch_id.0,
                state = %self.state,
                error = %e,
                "Conservation check failed, vault halted"
            );
        }
        checked
    }

    fn push_event(&mut self, event: VaultEvent) {
        if self.events.len() == constants::MAX_RETAINED_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    fn last_request_epoch(&self, kind: RequestKind, account: AccountId) -> Option<EpochId> {
        match kind {
            RequestKind::Deposit => self.ledger.last_deposit_epoch(account),
            RequestKind::Redeem => self.ledger.last_redeem_epoch(account),
        }
    }

    fn claimable(&self, kind: RequestKind, account: AccountId, epoch_id: EpochId) -> Result<Amount> {
        match kind {
            RequestKind::Deposit => self.ledger.claimable_shares(account, epoch_id),
            RequestKind::Redeem => self.ledger.claimable_assets(account, epoch_id),
        }
    }

    fn consume_claim(&mut self, kind: RequestKind, account: AccountId, epoch_id: EpochId) -> Result<Amount> {
        match kind {
            RequestKind::Deposit => self.ledger.claim_deposit(account, epoch_id),
            RequestKind::Redeem => self.ledger.claim_redeem(account, epoch_id),
        }
    }

    fn record_request(
        &mut self,
        kind: RequestKind,
        account: AccountId,
        epoch_id: EpochId,
        amount: Amount,
    ) -> Result<RecordReceipt> {
        match kind {
            RequestKind::Deposit => self.ledger.record_deposit(account, epoch_id, amount),
            RequestKind::Redeem => self.ledger.record_redeem(account, epoch_id, amount),
        }
    }

    fn revert_request(&mut self, kind: RequestKind, receipt: &RecordReceipt) -> Result<()> {
        match kind {
            RequestKind::Deposit => self.ledger.revert_deposit(receipt),
            RequestKind::Redeem => self.ledger.revert_redeem(receipt),
        }
    }
}

#[cfg(test)]
mod tests {
    use epochvault_ledger::InMemoryCustody;

    use super::*;

    fn manager() -> AccountId {
        AccountId::from_bytes([1; 16])
    }

    fn owner() -> AccountId {
        AccountId::from_bytes([2; 16])
    }

    fn alice() -> AccountId {
        AccountId::from_bytes([3; 16])
    }

    fn t0() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH
    }

    fn vault() -> Vault<InMemoryCustody> {
        let mut custody = InMemoryCustody::new();
        custody.fund(Party::Account(alice()), 1_000_000);
        Vault::new(VaultConfig::new(manager(), owner()), custody).unwrap()
    }

    #[test]
    fn new_vault_is_open_at_genesis() {
        let v = vault();
        assert_eq!(v.state(), VaultState::Open);
        assert_eq!(v.epoch_id(), EpochId::GENESIS);
        assert_eq!(v.price_per_share(), Some(Decimal::ONE));
        assert!(v.ledger().is_empty());
    }

    #[test]
    fn custody_tampering_is_reported_after_the_transition() {
        let mut v = vault();
        v.custody_mut()
            .apply(&[Movement::Mint {
                to: Party::Account(alice()),
                amount: 5,
            }])
            .unwrap();
        let err = v.close(manager(), t0()).unwrap_err();
        assert!(matches!(err, VaultError::SupplyInvariantViolation { .. }));
        // The close itself went through.
        assert_eq!(v.state(), VaultState::Closed);
        assert!(v.ledger().epoch(EpochId::GENESIS).is_some());
    }

    #[test]
    fn invalid_config_rejected() {
        let mut cfg = VaultConfig::new(manager(), owner());
        cfg.max_drawdown_bps = 20_000;
        let err = Vault::new(cfg, InMemoryCustody::new()).unwrap_err();
        assert!(matches!(err, VaultError::InvalidConfig { .. }));
    }

    #[test]
    fn request_while_open_is_invalid_state() {
        let mut v = vault();
        let err = v
            .request_deposit(alice(), 100, alice(), alice(), &[], None)
            .unwrap_err();
        assert!(matches!(
            err,
            VaultError::InvalidState {
                expected: VaultState::Closed,
                actual: VaultState::Open
            }
        ));
    }

    #[test]
    fn instant_deposit_while_closed_is_invalid_state() {
        let mut v = vault();
        v.close(manager(), t0()).unwrap();
        let err = v.deposit(alice(), 100, alice()).unwrap_err();
        assert!(matches!(
            err,
            VaultError::InvalidState {
                expected: VaultState::Open,
                actual: VaultState::Closed
            }
        ));
    }

    #[test]
    fn close_twice_fails() {
        let mut v = vault();
        assert_eq!(v.close(manager(), t0()).unwrap(), EpochId::GENESIS);
        assert!(matches!(
            v.close(manager(), t0()),
            Err(VaultError::InvalidState { .. })
        ));
    }

    #[test]
    fn lifecycle_is_manager_only() {
        let mut v = vault();
        assert!(matches!(
            v.close(alice(), t0()),
            Err(VaultError::Unauthorized { .. })
        ));
        v.close(manager(), t0()).unwrap();
        assert!(matches!(
            v.settle(alice(), 0, t0()),
            Err(VaultError::Unauthorized { .. })
        ));
        assert!(matches!(
            v.preview_settle(owner(), 0, t0()),
            Err(VaultError::Unauthorized { .. })
        ));
    }

    #[test]
    fn request_on_behalf_of_other_owner_is_unauthorized() {
        let mut v = vault();
        v.close(manager(), t0()).unwrap();
        let err = v
            .request_deposit(owner(), 100, owner(), alice(), &[], None)
            .unwrap_err();
        assert!(matches!(err, VaultError::Unauthorized { .. }));
        assert_eq!(v.pending_deposit_request(owner()), 0);
    }

    #[test]
    fn zero_request_rejected() {
        let mut v = vault();
        v.close(manager(), t0()).unwrap();
        assert!(matches!(
            v.request_redeem(alice(), 0, alice(), alice(), &[], None),
            Err(VaultError::ZeroAmount)
        ));
    }

    #[test]
    fn underfunded_request_leaves_ledger_untouched() {
        let mut v = vault();
        v.close(manager(), t0()).unwrap();
        let err = v
            .request_deposit(alice(), 2_000_000, alice(), alice(), &[], None)
            .unwrap_err();
        assert!(matches!(err, VaultError::InsufficientBalance { .. }));
        assert_eq!(v.pending_deposit_request(alice()), 0);
        assert_eq!(v.ledger().last_deposit_epoch(alice()), None);
        let record = v.ledger().epoch(EpochId::GENESIS).unwrap();
        assert_eq!(record.pending_deposit_total, 0);
    }

    #[test]
    fn instant_roundtrip_at_unit_price() {
        let mut v = vault();
        let shares = v.deposit(alice(), 1_000, alice()).unwrap();
        assert_eq!(shares, 1_000);
        assert_eq!(v.total_assets(), 1_000);
        assert_eq!(v.custody().balance(Party::Vault, Unit::Asset), 1_000);
        let assets = v.redeem(alice(), 400, alice(), alice()).unwrap();
        assert_eq!(assets, 400);
        assert_eq!(v.total_supply(), 600);
        assert_eq!(
            v.custody().balance(Party::Account(alice()), Unit::Asset),
            1_000_000 - 600
        );
    }

    #[test]
    fn redeem_more_than_held_fails_cleanly() {
        let mut v = vault();
        v.deposit(alice(), 100, alice()).unwrap();
        let err = v.redeem(alice(), 101, alice(), alice()).unwrap_err();
        assert!(matches!(
            err,
            VaultError::InsufficientBalance {
                needed: 101,
                available: 100,
                ..
            }
        ));
        assert_eq!(v.total_supply(), 100);
    }

    #[test]
    fn setters_validate_and_record_event() {
        let mut v = vault();
        v.set_fee_schedules(manager(), 100, 2_000).unwrap();
        assert_eq!(v.config().operator_fee.rate_bps, 2_000);
        assert_eq!(v.last_event().unwrap().kind, VaultEventKind::ConfigUpdated);

        let err = v.set_fee_schedules(manager(), 3_001, 0).unwrap_err();
        assert!(matches!(err, VaultError::InvalidConfig { .. }));
        assert_eq!(v.config().protocol_fee.rate_bps, 100);

        assert!(v.set_max_drawdown(manager(), 10_001).is_err());
        v.set_max_drawdown(manager(), 500).unwrap();
        assert_eq!(v.config().max_drawdown_bps, 500);

        assert!(matches!(
            v.set_fee_recipients(alice(), alice(), alice()),
            Err(VaultError::Unauthorized { .. })
        ));
        v.set_fee_recipients(manager(), alice(), owner()).unwrap();
        assert_eq!(v.config().protocol_fee.recipient, alice());
    }

    #[test]
    fn empty_epoch_settles_and_advances() {
        let mut v = vault();
        v.close(manager(), t0()).unwrap();
        let sv = v.settle(manager(), 0, t0()).unwrap();
        assert!(sv.is_empty());
        assert_eq!(v.epoch_id(), EpochId(2));
        assert_eq!(v.state(), VaultState::Closed);
        assert!(v.ledger().epoch(EpochId(1)).unwrap().is_settled());
        assert!(!v.ledger().epoch(EpochId(2)).unwrap().is_settled());
    }
}
