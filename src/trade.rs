//! Market trades at the latest price.
//!
//! A trade is two ledger steps: debit the spent asset, then credit the
//! received one together with its history entry. If the credit fails the
//! debit is compensated and the credit's error is returned.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::TradingRules;
use crate::ledger::{Fill, Ledger};
use crate::models::{EntryId, Side, WalletId};
use crate::money::{self, Asset};
use crate::price::PriceOracle;
use crate::{ExchangeError, Result};

/// Outcome of a settled market trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeReceipt {
    pub message: String,
    pub side: Side,
    pub asset_amount: Decimal,
    pub fiat_amount: Decimal,
    pub price: Decimal,
    pub balance_fiat: Decimal,
    pub balance_asset: Decimal,
}

/// Checks that `amount` of the side's spent asset is well-formed and at
/// least the configured minimum.
pub fn check_trade_size(rules: &TradingRules, side: Side, amount: Decimal) -> Result<()> {
    let asset = side.spends();
    asset.validate(amount)?;
    let minimum = match asset {
        Asset::Fiat => rules.min_trade_fiat,
        Asset::Crypto => rules.min_trade_asset,
    };
    if amount < minimum {
        return Err(ExchangeError::BelowMinimum {
            asset,
            amount,
            minimum,
        });
    }
    Ok(())
}

/// What `amount` of the spent asset converts to at `price`.
pub fn convert(side: Side, amount: Decimal, price: Decimal) -> Result<Decimal> {
    match side {
        Side::Buy => money::fiat_to_asset(amount, price),
        Side::Sell => money::asset_to_fiat(amount, price),
    }
}

/// Splits a trade into its `(asset_amount, fiat_amount)` legs.
pub(crate) fn legs(side: Side, spent: Decimal, received: Decimal) -> (Decimal, Decimal) {
    match side {
        Side::Buy => (received, spent),
        Side::Sell => (spent, received),
    }
}

pub struct TradeExecutor {
    ledger: Arc<Ledger>,
    oracle: Arc<PriceOracle>,
    rules: TradingRules,
}

impl TradeExecutor {
    pub fn new(ledger: Arc<Ledger>, oracle: Arc<PriceOracle>, rules: TradingRules) -> Self {
        Self {
            ledger,
            oracle,
            rules,
        }
    }

    /// Spends `fiat` on crypto.
    pub async fn market_buy(&self, wallet: &WalletId, fiat: Decimal) -> Result<TradeReceipt> {
        self.market_trade(wallet, Side::Buy, fiat).await
    }

    /// Sells `asset` units for fiat.
    pub async fn market_sell(&self, wallet: &WalletId, asset: Decimal) -> Result<TradeReceipt> {
        self.market_trade(wallet, Side::Sell, asset).await
    }

    /// Trades `amount` of the side's spent asset at the latest price.
    ///
    /// # Errors
    ///
    /// Fails before touching the wallet with [`ExchangeError::InvalidInput`],
    /// [`ExchangeError::BelowMinimum`], [`ExchangeError::InsufficientBalance`]
    /// or [`ExchangeError::NotFound`] (wallet or price). A failure after the
    /// debit is compensated and returned as-is.
    pub async fn market_trade(
        &self,
        wallet: &WalletId,
        side: Side,
        amount: Decimal,
    ) -> Result<TradeReceipt> {
        check_trade_size(&self.rules, side, amount)?;
        let spend = side.spends();
        let receive = side.receives();

        let snapshot = self.ledger.wallet(wallet).await?;
        let available = snapshot.balance(spend);
        if available < amount {
            return Err(ExchangeError::InsufficientBalance {
                asset: spend,
                requested: amount,
                available,
            });
        }

        let price = self.oracle.current_price().await?;
        let received = convert(side, amount, price)?;
        let (asset_amount, fiat_amount) = legs(side, amount, received);

        let spent_balance = self.ledger.debit(wallet, spend, amount).await?;
        let fill = Fill {
            entry_id: EntryId::new(),
            order_id: None,
            side,
            asset_amount,
            fiat_amount,
            price,
        };
        let received_balance = match self.ledger.credit(wallet, receive, received, Some(fill)).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(wallet = %wallet, %side, error = %e, "Credit failed, compensating debit");
                if let Err(undo) = self.ledger.credit(wallet, spend, amount, None).await {
                    error!(
                        wallet = %wallet,
                        %side,
                        %amount,
                        error = %undo,
                        "Compensation failed, wallet needs manual repair"
                    );
                }
                return Err(e);
            }
        };

        let (balance_fiat, balance_asset) = match side {
            Side::Buy => (spent_balance, received_balance),
            Side::Sell => (received_balance, spent_balance),
        };
        let verb = match side {
            Side::Buy => "Purchased",
            Side::Sell => "Sold",
        };
        let message = format!(
            "{verb} {asset_amount:.8} {} for {fiat_amount:.2} {}",
            Asset::Crypto,
            Asset::Fiat
        );
        info!(wallet = %wallet, %side, %asset_amount, %fiat_amount, %price, "Market trade settled");

        Ok(TradeReceipt {
            message,
            side,
            asset_amount,
            fiat_amount,
            price,
            balance_fiat,
            balance_asset,
        })
    }
}
