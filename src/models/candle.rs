//! OHLCV candle records.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ExchangeError, Result};

/// One OHLCV bar. `timestamp` is the bucket start in Unix seconds and is
/// unique within a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    pub fn new(
        timestamp: i64,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Rejects records an ingestion job should never write.
    pub fn validate(&self) -> Result<()> {
        if self.timestamp < 0 {
            return Err(ExchangeError::invalid(format!(
                "candle timestamp must not be negative, got {}",
                self.timestamp
            )));
        }
        if self.low > self.high {
            return Err(ExchangeError::invalid(format!(
                "candle at {} has low {} above high {}",
                self.timestamp, self.low, self.high
            )));
        }
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| *p <= Decimal::ZERO) {
            return Err(ExchangeError::invalid(format!(
                "candle at {} has a non-positive price",
                self.timestamp
            )));
        }
        if self.volume < Decimal::ZERO {
            return Err(ExchangeError::invalid(format!(
                "candle at {} has negative volume {}",
                self.timestamp, self.volume
            )));
        }
        Ok(())
    }

    /// Folds a later candle into this one as part of the same bucket.
    pub(crate) fn absorb(&mut self, later: &Candle) {
        self.high = self.high.max(later.high);
        self.low = self.low.min(later.low);
        self.close = later.close;
        self.volume = self.volume.saturating_add(later.volume);
    }
}
