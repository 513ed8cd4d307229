//! Short-lived cache of the latest candle for display surfaces.
//!
//! Trades and order matching always read the oracle directly; this cache
//! only saves repeated lookups when rendering a ticker.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use super::PriceOracle;
use crate::Result;
use crate::clock::Clock;
use crate::models::Candle;

pub struct PriceCache {
    oracle: Arc<PriceOracle>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    slot: Mutex<Option<(DateTime<Utc>, Candle)>>,
}

impl PriceCache {
    pub fn new(oracle: Arc<PriceOracle>, clock: Arc<dyn Clock>, ttl: std::time::Duration) -> Self {
        Self {
            oracle,
            clock,
            ttl: Duration::from_std(ttl).unwrap_or(Duration::zero()),
            slot: Mutex::new(None),
        }
    }

    /// The latest candle, reusing the previous answer while it is younger
    /// than the TTL.
    pub async fn latest(&self) -> Result<Candle> {
        let mut slot = self.slot.lock().await;
        let now = self.clock.now();
        if let Some((fetched_at, candle)) = slot.as_ref() {
            if now - *fetched_at < self.ttl {
                return Ok(candle.clone());
            }
        }
        let candle = self.oracle.latest().await?;
        *slot = Some((now, candle.clone()));
        Ok(candle)
    }

    /// Drops the cached candle.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::ExchangeConfig;
    use crate::store::MemoryCandleStore;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn serves_cached_until_ttl_expires() {
        let clock = Arc::new(ManualClock::at_unix(600));
        let oracle = Arc::new(PriceOracle::new(
            Arc::new(MemoryCandleStore::new()),
            clock.clone(),
            &ExchangeConfig::default(),
        ));
        let candle = |ts: i64, p| Candle::new(ts, p, p, p, p, dec!(1));
        oracle.upsert(&[candle(60, dec!(1))]).await.unwrap();

        let cache = PriceCache::new(oracle.clone(), clock.clone(), std::time::Duration::from_secs(60));
        assert_eq!(cache.latest().await.unwrap().close, dec!(1));

        oracle.upsert(&[candle(120, dec!(2))]).await.unwrap();
        clock.advance(Duration::seconds(30));
        assert_eq!(cache.latest().await.unwrap().close, dec!(1));

        clock.advance(Duration::seconds(30));
        assert_eq!(cache.latest().await.unwrap().close, dec!(2));

        oracle.upsert(&[candle(180, dec!(3))]).await.unwrap();
        cache.invalidate().await;
        assert_eq!(cache.latest().await.unwrap().close, dec!(3));
    }
}
