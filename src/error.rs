//! Crate-level error types.
//!
//! [`ExchangeError`] unifies every failure the exchange core can report
//! (validation, balance, lookup, storage) behind a single enum so callers
//! can match on the variant they care about while still using the `?`
//! operator for easy propagation. [`Failure`] is the flattened
//! `{kind, message}` form handed across the query surface.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::money::Asset;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ExchangeError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    /// Malformed amount, wrong decimal precision, bad timestamp or id.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A trade, order or deposit is smaller than the configured floor.
    #[error("{amount} {asset} is below the minimum of {minimum} {asset}")]
    BelowMinimum {
        asset: Asset,
        amount: Decimal,
        minimum: Decimal,
    },

    /// The wallet's spendable balance cannot cover the request.
    #[error("insufficient {asset} balance: requested {requested}, available {available}")]
    InsufficientBalance {
        asset: Asset,
        requested: Decimal,
        available: Decimal,
    },

    /// A wallet, order or price record does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// A price query window exceeds the configured ceiling.
    #[error("range too large: {requested} exceeds the maximum of {maximum}")]
    RangeTooLarge { requested: i64, maximum: i64 },

    /// Concurrent modification could not be resolved within the retry budget.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The persistence layer or price source could not be reached.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Startup configuration is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Flat classification of [`ExchangeError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    BelowMinimum,
    InsufficientBalance,
    NotFound,
    RangeTooLarge,
    Conflict,
    Unavailable,
    Config,
}

/// Structured failure returned to callers of the query surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl ExchangeError {
    /// Returns the variant's [`ErrorKind`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::BelowMinimum { .. } => ErrorKind::BelowMinimum,
            Self::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::RangeTooLarge { .. } => ErrorKind::RangeTooLarge,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

impl From<ExchangeError> for Failure {
    fn from(err: ExchangeError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("json error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn display_below_minimum() {
        let err = ExchangeError::BelowMinimum {
            asset: Asset::Fiat,
            amount: dec!(5),
            minimum: dec!(10),
        };
        assert_eq!(err.to_string(), "5 USD is below the minimum of 10 USD");
    }

    #[test]
    fn display_insufficient_balance() {
        let err = ExchangeError::InsufficientBalance {
            asset: Asset::Crypto,
            requested: dec!(0.5),
            available: dec!(0.25),
        };
        assert_eq!(
            err.to_string(),
            "insufficient BTC balance: requested 0.5, available 0.25"
        );
    }

    #[test]
    fn failure_carries_kind_and_message() {
        let failure = Failure::from(ExchangeError::not_found("order 42"));
        assert_eq!(failure.kind, ErrorKind::NotFound);
        assert_eq!(failure.message, "order 42 not found");

        let json = serde_json::to_string(&failure).unwrap();
        assert_eq!(json, r#"{"kind":"not_found","message":"order 42 not found"}"#);
    }
}
