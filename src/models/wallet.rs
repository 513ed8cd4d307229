//! The wallet entity and its balance rules.
//!
//! Balances are always *spendable* funds: whatever an open limit order
//! escrows has already been debited, so neither balance may ever go
//! negative. The mutation helpers here operate on an in-memory copy; the
//! [`Ledger`](crate::ledger::Ledger) is responsible for loading, locking
//! and persisting it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{EntryId, OrderId, Side, WalletId};
use crate::money::Asset;
use crate::{ExchangeError, Result};

/// Per-user ledger entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    /// Optimistic concurrency token, bumped by the store on every save.
    pub version: u64,
    pub balance_fiat: Decimal,
    pub balance_asset: Decimal,
    /// Cumulative fiat ever deposited; the baseline for profit figures.
    pub total_deposited: Decimal,
    pub deposit_history: Vec<DepositEntry>,
    pub trade_history: Vec<TradeEntry>,
    pub open_orders: Vec<OpenOrder>,
    /// Keyed hash of the first words of the recovery phrase (indexed).
    pub secret_fingerprint: String,
    /// One-way hash of the full recovery phrase.
    pub secret_verifier: String,
    pub created_at: DateTime<Utc>,
}

/// A fiat deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositEntry {
    pub id: EntryId,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// A settled trade, either a market trade or an executed limit order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeEntry {
    pub id: EntryId,
    /// Set when the trade came from a limit order.
    pub order_id: Option<OrderId>,
    pub timestamp: DateTime<Utc>,
    pub side: Side,
    pub asset_amount: Decimal,
    pub fiat_amount: Decimal,
    /// Price the trade settled at.
    pub price: Decimal,
}

/// A limit order waiting for the price to cross its threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub id: OrderId,
    pub timestamp: DateTime<Utc>,
    pub side: Side,
    /// Escrowed amount: fiat for a buy, crypto for a sell.
    pub amount: Decimal,
    pub limit_price: Decimal,
}

impl OpenOrder {
    /// A buy executes at or below its limit, a sell at or above.
    pub fn is_executable(&self, price: Decimal) -> bool {
        match self.side {
            Side::Buy => price <= self.limit_price,
            Side::Sell => price >= self.limit_price,
        }
    }

    /// Asset held in escrow while the order is open.
    pub fn escrow_asset(&self) -> Asset {
        self.side.spends()
    }
}

impl Wallet {
    /// A fresh wallet with empty balances and history.
    pub fn open(
        id: WalletId,
        secret_fingerprint: String,
        secret_verifier: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            version: 0,
            balance_fiat: Decimal::ZERO,
            balance_asset: Decimal::ZERO,
            total_deposited: Decimal::ZERO,
            deposit_history: Vec::new(),
            trade_history: Vec::new(),
            open_orders: Vec::new(),
            secret_fingerprint,
            secret_verifier,
            created_at,
        }
    }

    /// Spendable balance of `asset`.
    pub fn balance(&self, asset: Asset) -> Decimal {
        match asset {
            Asset::Fiat => self.balance_fiat,
            Asset::Crypto => self.balance_asset,
        }
    }

    fn balance_mut(&mut self, asset: Asset) -> &mut Decimal {
        match asset {
            Asset::Fiat => &mut self.balance_fiat,
            Asset::Crypto => &mut self.balance_asset,
        }
    }

    /// Adds `amount` and returns the new rounded balance.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::InvalidInput`] without touching the balance
    /// if the sum does not fit in a `Decimal`.
    pub(crate) fn credit(&mut self, asset: Asset, amount: Decimal) -> Result<Decimal> {
        let balance = self.balance_mut(asset);
        let sum = balance
            .checked_add(amount)
            .ok_or_else(|| ExchangeError::invalid(format!("{asset} balance would overflow")))?;
        *balance = asset.round(sum);
        Ok(*balance)
    }

    /// Subtracts `amount` and returns the new rounded balance.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::InsufficientBalance`] without touching the
    /// balance if it is smaller than `amount`.
    pub(crate) fn debit(&mut self, asset: Asset, amount: Decimal) -> Result<Decimal> {
        let balance = self.balance_mut(asset);
        if *balance < amount {
            return Err(ExchangeError::InsufficientBalance {
                asset,
                requested: amount,
                available: *balance,
            });
        }
        *balance = asset.round(*balance - amount);
        Ok(*balance)
    }

    pub fn order(&self, id: &OrderId) -> Option<&OpenOrder> {
        self.open_orders.iter().find(|o| o.id == *id)
    }

    /// Removes and returns an open order.
    pub(crate) fn take_order(&mut self, id: &OrderId) -> Option<OpenOrder> {
        let index = self.open_orders.iter().position(|o| o.id == *id)?;
        Some(self.open_orders.remove(index))
    }

    /// Total currently escrowed in open orders that spend `asset`.
    pub fn escrowed(&self, asset: Asset) -> Result<Decimal> {
        self.open_orders
            .iter()
            .filter(|o| o.escrow_asset() == asset)
            .try_fold(Decimal::ZERO, |total, o| total.checked_add(o.amount))
            .ok_or_else(|| ExchangeError::invalid(format!("escrowed {asset} would overflow")))
    }
}
