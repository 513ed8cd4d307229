//! Limit orders with escrow.
//!
//! Placing an order moves the spent amount out of the wallet's spendable
//! balance into the order itself. Cancelling removes the order and can
//! refund the escrow. A matcher pass settles every order whose limit is
//! satisfied by the latest price, converting at that price.
//!
//! Each of these is a single [`Ledger`] update, so an order is never
//! half-placed or half-settled.

use std::sync::Arc;

use futures_util::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::TradingRules;
use crate::error::Failure;
use crate::ledger::{Fill, Ledger};
use crate::models::{EntryId, OpenOrder, OrderId, Side, Wallet, WalletId};
use crate::money::Asset;
use crate::price::PriceOracle;
use crate::trade::{check_trade_size, convert, legs};
use crate::{ExchangeError, Result};

/// A settled limit order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Execution {
    pub wallet: WalletId,
    pub order_id: OrderId,
    pub side: Side,
    pub asset_amount: Decimal,
    pub fiat_amount: Decimal,
    pub price: Decimal,
}

/// An order the pass could not settle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderFailure {
    pub wallet: WalletId,
    pub order_id: OrderId,
    pub failure: Failure,
}

/// Result of one matcher pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchReport {
    pub price: Decimal,
    /// Open orders looked at.
    pub examined: usize,
    pub executions: Vec<Execution>,
    pub failures: Vec<OrderFailure>,
}

pub struct OrderEngine {
    ledger: Arc<Ledger>,
    oracle: Arc<PriceOracle>,
    rules: TradingRules,
}

impl OrderEngine {
    pub fn new(ledger: Arc<Ledger>, oracle: Arc<PriceOracle>, rules: TradingRules) -> Self {
        Self {
            ledger,
            oracle,
            rules,
        }
    }

    /// Escrows `amount` of the side's spent asset and opens an order.
    ///
    /// # Errors
    ///
    /// [`ExchangeError::BelowMinimum`], [`ExchangeError::InvalidInput`] or
    /// [`ExchangeError::InsufficientBalance`], all without changing the
    /// wallet.
    pub async fn place(
        &self,
        wallet: &WalletId,
        side: Side,
        amount: Decimal,
        limit_price: Decimal,
    ) -> Result<OrderId> {
        check_trade_size(&self.rules, side, amount)?;
        self.check_limit_price(limit_price)?;

        let id = OrderId::new();
        let balance = self
            .ledger
            .update(wallet, |w, now| {
                let balance = w.debit(side.spends(), amount)?;
                w.open_orders.push(OpenOrder {
                    id,
                    timestamp: now,
                    side,
                    amount,
                    limit_price,
                });
                Ok(balance)
            })
            .await?;
        info!(
            wallet = %wallet,
            order = %id,
            %side,
            %amount,
            %limit_price,
            %balance,
            "Limit order placed"
        );
        Ok(id)
    }

    /// Removes an open order, returning it. With `refund` the escrow goes
    /// back to the spendable balance; without it the escrow is forfeited.
    ///
    /// # Errors
    ///
    /// [`ExchangeError::NotFound`] if the order is not open on this wallet.
    pub async fn cancel(&self, wallet: &WalletId, order_id: &OrderId, refund: bool) -> Result<OpenOrder> {
        let order = self
            .ledger
            .update(wallet, |w, _| {
                let order = w
                    .take_order(order_id)
                    .ok_or_else(|| ExchangeError::not_found(format!("order {order_id}")))?;
                if refund {
                    w.credit(order.escrow_asset(), order.amount)?;
                }
                Ok(order)
            })
            .await?;
        info!(wallet = %wallet, order = %order_id, refund, "Limit order cancelled");
        Ok(order)
    }

    /// Settles one order at `price` if it is still open and executable.
    /// Returns `None` when there is nothing to do.
    pub async fn execute_order(
        &self,
        wallet: &WalletId,
        order_id: &OrderId,
        price: Decimal,
    ) -> Result<Option<Execution>> {
        let entry_id = EntryId::new();
        let execution = self
            .ledger
            .update(wallet, |w, now| settle(w, order_id, price, entry_id, now))
            .await?;
        if let Some(execution) = &execution {
            info!(
                wallet = %wallet,
                order = %order_id,
                side = %execution.side,
                asset_amount = %execution.asset_amount,
                fiat_amount = %execution.fiat_amount,
                %price,
                "Limit order executed"
            );
        }
        Ok(execution)
    }

    /// Runs a pass at the latest price.
    pub async fn run_pass(&self) -> Result<MatchReport> {
        let price = self.oracle.current_price().await?;
        self.execute_pass(price).await
    }

    /// Settles every executable open order at `price`.
    ///
    /// Wallets are processed concurrently and each wallet's orders in
    /// sequence. A failing order is recorded in the report and does not
    /// stop the others.
    pub async fn execute_pass(&self, price: Decimal) -> Result<MatchReport> {
        let wallets = self.ledger.wallets_with_open_orders().await?;
        let examined = wallets.iter().map(|w| w.open_orders.len()).sum();

        let outcomes = join_all(wallets.iter().map(|w| self.execute_wallet(w, price))).await;

        let mut report = MatchReport {
            price,
            examined,
            executions: Vec::new(),
            failures: Vec::new(),
        };
        for (executions, failures) in outcomes {
            report.executions.extend(executions);
            report.failures.extend(failures);
        }
        debug!(
            %price,
            examined,
            executed = report.executions.len(),
            failed = report.failures.len(),
            "Matcher pass finished"
        );
        Ok(report)
    }

    async fn execute_wallet(
        &self,
        wallet: &Wallet,
        price: Decimal,
    ) -> (Vec<Execution>, Vec<OrderFailure>) {
        let mut executions = Vec::new();
        let mut failures = Vec::new();
        for order in wallet.open_orders.iter().filter(|o| o.is_executable(price)) {
            match self.execute_order(&wallet.id, &order.id, price).await {
                Ok(Some(execution)) => executions.push(execution),
                Ok(None) => {}
                Err(e) => {
                    warn!(wallet = %wallet.id, order = %order.id, error = %e, "Order execution failed");
                    failures.push(OrderFailure {
                        wallet: wallet.id,
                        order_id: order.id,
                        failure: e.into(),
                    });
                }
            }
        }
        (executions, failures)
    }

    fn check_limit_price(&self, limit_price: Decimal) -> Result<()> {
        Asset::Fiat.validate(limit_price)?;
        if limit_price < self.rules.min_limit_price {
            return Err(ExchangeError::invalid(format!(
                "limit price must be at least {}, got {limit_price}",
                self.rules.min_limit_price
            )));
        }
        Ok(())
    }
}

/// Converts the order's escrow at `price`, credits the received asset,
/// records the trade and closes the order.
fn settle(
    wallet: &mut Wallet,
    order_id: &OrderId,
    price: Decimal,
    entry_id: EntryId,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<Option<Execution>> {
    let Some(order) = wallet.order(order_id).cloned() else {
        return Ok(None);
    };
    if !order.is_executable(price) {
        return Ok(None);
    }

    let received = convert(order.side, order.amount, price)?;
    let (asset_amount, fiat_amount) = legs(order.side, order.amount, received);
    wallet.credit(order.side.receives(), received)?;
    wallet.take_order(order_id);
    let fill = Fill {
        entry_id,
        order_id: Some(order.id),
        side: order.side,
        asset_amount,
        fiat_amount,
        price,
    };
    wallet.trade_history.push(fill.into_entry(now));

    Ok(Some(Execution {
        wallet: wallet.id,
        order_id: order.id,
        side: order.side,
        asset_amount,
        fiat_amount,
        price,
    }))
}
