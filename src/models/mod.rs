//! Shared domain models: identifiers, order side, wallets and candles.

pub mod candle;
pub mod wallet;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ExchangeError;
use crate::money::Asset;

pub use candle::Candle;
pub use wallet::{DepositEntry, OpenOrder, TradeEntry, Wallet};

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a fresh random id.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = ExchangeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self).map_err(|e| {
                    ExchangeError::invalid(format!(concat!("invalid ", $label, " {:?}: {}"), s, e))
                })
            }
        }
    };
}

opaque_id!(
    /// Opaque wallet identity supplied by the session provider.
    WalletId,
    "wallet id"
);
opaque_id!(
    /// Identifier of a limit order, unique across all wallets.
    OrderId,
    "order id"
);
opaque_id!(
    /// Identifier of a single deposit or trade history entry.
    EntryId,
    "entry id"
);

/// Trade direction, from the wallet owner's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The asset a trade on this side spends (and a limit order escrows).
    pub const fn spends(self) -> Asset {
        match self {
            Side::Buy => Asset::Fiat,
            Side::Sell => Asset::Crypto,
        }
    }

    /// The asset a trade on this side receives.
    pub const fn receives(self) -> Asset {
        match self {
            Side::Buy => Asset::Crypto,
            Side::Sell => Asset::Fiat,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            other => Err(ExchangeError::invalid(format!(
                "side must be buy or sell, got {other:?}"
            ))),
        }
    }
}
