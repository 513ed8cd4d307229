//! Assets, canonical precision and rounding.
//!
//! The exchange holds exactly two assets: a fiat currency kept to 2
//! decimal places and one crypto asset kept to 8. Every balance the
//! ledger writes passes through [`Asset::round`], which rounds half-up.

use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::{ExchangeError, Result};

/// One side of the fiat/crypto pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Asset {
    Fiat,
    Crypto,
}

impl Asset {
    /// Number of decimal places balances of this asset are kept to.
    pub const fn precision(self) -> u32 {
        match self {
            Asset::Fiat => 2,
            Asset::Crypto => 8,
        }
    }

    /// Ticker shown in messages.
    pub const fn symbol(self) -> &'static str {
        match self {
            Asset::Fiat => "USD",
            Asset::Crypto => "BTC",
        }
    }

    /// Rounds `value` half-up to this asset's precision.
    pub fn round(self, value: Decimal) -> Decimal {
        value.round_dp_with_strategy(self.precision(), RoundingStrategy::MidpointAwayFromZero)
    }

    /// Rejects negative amounts and amounts carrying more decimal places
    /// than this asset supports.
    pub fn validate(self, amount: Decimal) -> Result<Decimal> {
        if amount < Decimal::ZERO {
            return Err(ExchangeError::invalid(format!(
                "amount must not be negative, got {amount}"
            )));
        }
        if amount.normalize().scale() > self.precision() {
            return Err(ExchangeError::invalid(format!(
                "{} amount can have at most {} decimals, got {amount}",
                self.symbol(),
                self.precision()
            )));
        }
        Ok(amount)
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Rounds a fiat value to 2 decimals.
pub fn round_fiat(value: Decimal) -> Decimal {
    Asset::Fiat.round(value)
}

/// Rounds a crypto value to 8 decimals.
pub fn round_asset(value: Decimal) -> Decimal {
    Asset::Crypto.round(value)
}

/// Parses a caller-supplied amount string for `asset`.
///
/// # Errors
///
/// Returns [`ExchangeError::InvalidInput`] for empty, malformed, negative
/// or over-precise input.
pub fn parse_amount(text: &str, asset: Asset) -> Result<Decimal> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ExchangeError::invalid("amount is required"));
    }
    let amount = Decimal::from_str(trimmed)
        .map_err(|e| ExchangeError::invalid(format!("malformed amount {trimmed:?}: {e}")))?;
    asset.validate(amount)
}

/// Converts fiat into crypto at `price`, rounded to 8 decimals.
///
/// # Errors
///
/// Returns [`ExchangeError::InvalidInput`] for a non-positive price or a
/// result that does not fit in a `Decimal`.
pub fn fiat_to_asset(fiat: Decimal, price: Decimal) -> Result<Decimal> {
    ensure_positive_price(price)?;
    fiat.checked_div(price)
        .map(round_asset)
        .ok_or_else(|| overflowed("dividing", fiat, price))
}

/// Converts crypto into fiat at `price`, rounded to 2 decimals.
///
/// # Errors
///
/// Same as [`fiat_to_asset`].
pub fn asset_to_fiat(asset: Decimal, price: Decimal) -> Result<Decimal> {
    ensure_positive_price(price)?;
    asset
        .checked_mul(price)
        .map(round_fiat)
        .ok_or_else(|| overflowed("multiplying", asset, price))
}

pub(crate) fn overflowed(op: &str, lhs: Decimal, rhs: Decimal) -> ExchangeError {
    ExchangeError::invalid(format!("{op} {lhs} by {rhs} overflowed"))
}

fn ensure_positive_price(price: Decimal) -> Result<()> {
    if price <= Decimal::ZERO {
        return Err(ExchangeError::invalid(format!(
            "price must be positive, got {price}"
        )));
    }
    Ok(())
}
