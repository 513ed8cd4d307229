//! Wallet valuation against the deposit baseline.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::Wallet;
use crate::money::{Asset, overflowed, round_fiat};
use crate::{ExchangeError, Result};

/// Mark-to-market figures for one wallet, all rounded to cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Valuation {
    pub current_value: Decimal,
    pub net_profit: Decimal,
    pub percent_profit: Decimal,
}

/// Fiat value of everything the wallet owns at `price`, escrow included.
///
/// # Errors
///
/// Returns [`ExchangeError::InvalidInput`] if the value does not fit in a
/// `Decimal`.
pub fn current_value(wallet: &Wallet, price: Decimal) -> Result<Decimal> {
    let fiat = add(wallet.balance_fiat, wallet.escrowed(Asset::Fiat)?)?;
    let asset = add(wallet.balance_asset, wallet.escrowed(Asset::Crypto)?)?;
    let worth = asset
        .checked_mul(price)
        .ok_or_else(|| overflowed("multiplying", asset, price))?;
    add(fiat, worth)
}

/// Values `wallet` at `price`. Percent profit is 0 for a wallet that never
/// deposited.
pub fn valuation(wallet: &Wallet, price: Decimal) -> Result<Valuation> {
    let value = current_value(wallet, price)?;
    let net = value
        .checked_sub(wallet.total_deposited)
        .ok_or_else(|| ExchangeError::invalid("net profit overflowed"))?;
    let percent = if wallet.total_deposited.is_zero() {
        Decimal::ZERO
    } else {
        net.checked_div(wallet.total_deposited)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .ok_or_else(|| ExchangeError::invalid("percent profit overflowed"))?
    };
    Ok(Valuation {
        current_value: round_fiat(value),
        net_profit: round_fiat(net),
        percent_profit: round_fiat(percent),
    })
}

fn add(lhs: Decimal, rhs: Decimal) -> Result<Decimal> {
    lhs.checked_add(rhs)
        .ok_or_else(|| ExchangeError::invalid(format!("wallet value overflowed adding {rhs}")))
}
