//! Wallet ledger: atomic balance and history mutations.
//!
//! Every mutation is a read-modify-write of one wallet, serialized two ways:
//! an in-process async mutex per wallet keeps concurrent callers in this
//! process from interleaving, and the store's version check rejects writes
//! based on a stale read from anywhere else. A rejected write is retried
//! from a fresh read a bounded number of times before surfacing
//! [`ExchangeError::Conflict`].
//!
//! Mutations are applied to a copy of the wallet; if the closure fails or
//! the save fails, nothing is written.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::models::{DepositEntry, EntryId, OrderId, Side, TradeEntry, Wallet, WalletId};
use crate::money::Asset;
use crate::store::WalletStore;
use crate::{ExchangeError, Result};

/// How many times a version conflict is retried before giving up.
const MAX_SAVE_ATTEMPTS: u32 = 5;

/// A settled trade leg recorded in the trade history alongside a credit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fill {
    pub entry_id: EntryId,
    pub order_id: Option<OrderId>,
    pub side: Side,
    pub asset_amount: Decimal,
    pub fiat_amount: Decimal,
    pub price: Decimal,
}

impl Fill {
    pub(crate) fn into_entry(self, timestamp: DateTime<Utc>) -> TradeEntry {
        TradeEntry {
            id: self.entry_id,
            order_id: self.order_id,
            timestamp,
            side: self.side,
            asset_amount: self.asset_amount,
            fiat_amount: self.fiat_amount,
            price: self.price,
        }
    }
}

/// Owner of all wallet mutations.
pub struct Ledger {
    store: Arc<dyn WalletStore>,
    clock: Arc<dyn Clock>,
    locks: DashMap<WalletId, Arc<Mutex<()>>>,
}

impl Ledger {
    pub fn new(store: Arc<dyn WalletStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            locks: DashMap::new(),
        }
    }

    /// Persists a newly generated wallet.
    pub async fn open_wallet(&self, wallet: Wallet) -> Result<()> {
        let id = wallet.id;
        self.store.insert(wallet).await?;
        info!(wallet = %id, "Opened wallet");
        Ok(())
    }

    /// Loads a wallet snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::NotFound`] if no wallet has this id.
    pub async fn wallet(&self, id: &WalletId) -> Result<Wallet> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| ExchangeError::not_found(format!("wallet {id}")))
    }

    pub async fn wallets_with_open_orders(&self) -> Result<Vec<Wallet>> {
        self.store.with_open_orders().await
    }

    /// Adds fiat, records a deposit entry and raises `total_deposited`.
    /// Returns the new fiat balance.
    pub async fn deposit(&self, id: &WalletId, amount: Decimal) -> Result<Decimal> {
        ensure_non_negative(amount)?;
        let balance = self
            .update(id, |wallet, now| {
                let balance = wallet.credit(Asset::Fiat, amount)?;
                let total = wallet
                    .total_deposited
                    .checked_add(amount)
                    .ok_or_else(|| ExchangeError::invalid("total deposited would overflow"))?;
                wallet.total_deposited = Asset::Fiat.round(total);
                wallet.deposit_history.push(DepositEntry {
                    id: EntryId::new(),
                    amount,
                    timestamp: now,
                });
                Ok(balance)
            })
            .await?;
        info!(wallet = %id, %amount, %balance, "Deposit applied");
        Ok(balance)
    }

    pub async fn credit_fiat(&self, id: &WalletId, amount: Decimal) -> Result<Decimal> {
        self.credit(id, Asset::Fiat, amount, None).await
    }

    pub async fn debit_fiat(&self, id: &WalletId, amount: Decimal) -> Result<Decimal> {
        self.debit(id, Asset::Fiat, amount).await
    }

    pub async fn credit_asset(&self, id: &WalletId, amount: Decimal) -> Result<Decimal> {
        self.credit(id, Asset::Crypto, amount, None).await
    }

    pub async fn debit_asset(&self, id: &WalletId, amount: Decimal) -> Result<Decimal> {
        self.debit(id, Asset::Crypto, amount).await
    }

    /// Adds `amount` of `asset`, appending `fill` to the trade history when
    /// the credit settles a trade. Returns the new balance.
    pub async fn credit(
        &self,
        id: &WalletId,
        asset: Asset,
        amount: Decimal,
        fill: Option<Fill>,
    ) -> Result<Decimal> {
        ensure_non_negative(amount)?;
        self.update(id, |wallet, now| {
            let balance = wallet.credit(asset, amount)?;
            if let Some(fill) = fill.clone() {
                wallet.trade_history.push(fill.into_entry(now));
            }
            Ok(balance)
        })
        .await
    }

    /// Removes `amount` of `asset`. Returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::InsufficientBalance`] if the spendable
    /// balance is smaller than `amount`.
    pub async fn debit(&self, id: &WalletId, asset: Asset, amount: Decimal) -> Result<Decimal> {
        ensure_non_negative(amount)?;
        self.update(id, |wallet, _| wallet.debit(asset, amount)).await
    }

    /// Applies `apply` to a fresh copy of the wallet and persists the result
    /// as one atomic step. `apply` may run more than once if the save hits
    /// a version conflict, so it must derive everything from its arguments.
    pub(crate) async fn update<T, F>(&self, id: &WalletId, mut apply: F) -> Result<T>
    where
        F: FnMut(&mut Wallet, DateTime<Utc>) -> Result<T> + Send,
        T: Send,
    {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        for attempt in 1..=MAX_SAVE_ATTEMPTS {
            let current = self.wallet(id).await?;
            let mut next = current.clone();
            let value = apply(&mut next, self.clock.now())?;
            match self.store.save(&next, current.version).await {
                Ok(_) => return Ok(value),
                Err(ExchangeError::Conflict(reason)) => {
                    debug!(wallet = %id, attempt, %reason, "Version conflict, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(ExchangeError::Conflict(format!(
            "wallet {id} kept changing after {MAX_SAVE_ATTEMPTS} attempts"
        )))
    }

    fn lock_for(&self, id: &WalletId) -> Arc<Mutex<()>> {
        self.locks.entry(*id).or_default().clone()
    }
}

fn ensure_non_negative(amount: Decimal) -> Result<()> {
    if amount < Decimal::ZERO {
        return Err(ExchangeError::invalid(format!(
            "amount must not be negative, got {amount}"
        )));
    }
    Ok(())
}
