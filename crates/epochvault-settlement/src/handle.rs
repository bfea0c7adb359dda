//! Async shared handle over a [`Vault`].
//!
//! Every operation locks the vault for its whole duration, so two callers
//! can never interleave the reads and writes of one request, settlement or
//! claim. Cloning the handle shares the same vault.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use epochvault_ledger::Custody;
use epochvault_types::{AccountId, Amount, EpochId, RequestId, Result, SettleValues};
use tokio::sync::{Mutex, MutexGuard};

use crate::vault::Vault;

/// Cloneable, task-safe vault handle.
pub struct SharedVault<C: Custody> {
    inner: Arc<Mutex<Vault<C>>>,
}

impl<C: Custody> Clone for SharedVault<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Custody> SharedVault<C> {
    #[must_use]
    pub fn new(vault: Vault<C>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(vault)),
        }
    }

    /// Exclusive access for operations without a dedicated method, such as
    /// requests with a receiver hook.
    pub async fn lock(&self) -> MutexGuard<'_, Vault<C>> {
        self.inner.lock().await
    }

    /// Run `f` with exclusive access and return its result.
    pub async fn with<R>(&self, f: impl FnOnce(&mut Vault<C>) -> R) -> R {
        let mut vault = self.inner.lock().await;
        f(&mut vault)
    }

    pub async fn request_deposit(
        &self,
        caller: AccountId,
        assets: Amount,
        receiver: AccountId,
        owner: AccountId,
    ) -> Result<RequestId> {
        self.inner
            .lock()
            .await
            .request_deposit(caller, assets, receiver, owner, &[], None)
    }

    pub async fn request_redeem(
        &self,
        caller: AccountId,
        shares: Amount,
        receiver: AccountId,
        owner: AccountId,
    ) -> Result<RequestId> {
        self.inner
            .lock()
            .await
            .request_redeem(caller, shares, receiver, owner, &[], None)
    }

    pub async fn claim_deposit(&self, caller: AccountId, receiver: AccountId) -> Result<Amount> {
        self.inner.lock().await.claim_deposit(caller, receiver)
    }

    pub async fn claim_redeem(&self, caller: AccountId, receiver: AccountId) -> Result<Amount> {
        self.inner.lock().await.claim_redeem(caller, receiver)
    }

    pub async fn close(&self, caller: AccountId, now: DateTime<Utc>) -> Result<EpochId> {
        self.inner.lock().await.close(caller, now)
    }

    pub async fn preview_settle(
        &self,
        caller: AccountId,
        new_saved_balance: Amount,
        now: DateTime<Utc>,
    ) -> Result<SettleValues> {
        self.inner
            .lock()
            .await
            .preview_settle(caller, new_saved_balance, now)
    }

    pub async fn settle(
        &self,
        caller: AccountId,
        new_saved_balance: Amount,
        now: DateTime<Utc>,
    ) -> Result<SettleValues> {
        self.inner.lock().await.settle(caller, new_saved_balance, now)
    }

    pub async fn open(
        &self,
        caller: AccountId,
        asset_returned: Amount,
        now: DateTime<Utc>,
    ) -> Result<SettleValues> {
        self.inner.lock().await.open(caller, asset_returned, now)
    }

    pub async fn deposit(&self, caller: AccountId, assets: Amount, receiver: AccountId) -> Result<Amount> {
        self.inner.lock().await.deposit(caller, assets, receiver)
    }

    pub async fn redeem(
        &self,
        caller: AccountId,
        shares: Amount,
        receiver: AccountId,
        owner: AccountId,
    ) -> Result<Amount> {
        self.inner.lock().await.redeem(caller, shares, receiver, owner)
    }
}
