//! Price oracle over a minute-candle series.
//!
//! Answers point lookups (exact or latest-before), bounded raw range
//! queries, and downsampled range queries. Coarse intervals can be served
//! from precomputed [`snapshot`]s refreshed by a background job; anything
//! else is aggregated live from raw candles.

pub mod cache;
pub mod snapshot;

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::ExchangeConfig;
use crate::models::Candle;
use crate::store::{CandleStore, UpsertSummary};
use crate::{ExchangeError, Result};

pub use cache::PriceCache;
pub use snapshot::{Snapshot, SnapshotBook, SnapshotPlan};

/// Granularity of the raw series, in seconds.
pub const RAW_INTERVAL_SECS: i64 = 60;

/// Start of the bucket of width `interval` containing `timestamp`.
pub fn bucket_start(timestamp: i64, interval: i64) -> i64 {
    timestamp - timestamp.rem_euclid(interval)
}

/// Aggregates ascending candles into buckets of `interval` seconds.
///
/// Within a bucket `open` is the first candle's, `close` the last one's,
/// `high`/`low` the extremes and `volume` the sum. Each output candle is
/// stamped with its bucket start; output is ascending.
pub fn downsample_candles(candles: &[Candle], interval: i64) -> Vec<Candle> {
    let mut buckets: BTreeMap<i64, Candle> = BTreeMap::new();
    for candle in candles {
        let key = bucket_start(candle.timestamp, interval);
        buckets
            .entry(key)
            .and_modify(|bucket| bucket.absorb(candle))
            .or_insert_with(|| Candle {
                timestamp: key,
                ..candle.clone()
            });
    }
    buckets.into_values().collect()
}

/// Read side of the candle series.
pub struct PriceOracle {
    store: Arc<dyn CandleStore>,
    clock: Arc<dyn Clock>,
    max_range_minutes: i64,
    max_buckets: i64,
    snapshot_max_age: chrono::Duration,
    snapshots: SnapshotBook,
}

impl PriceOracle {
    pub fn new(store: Arc<dyn CandleStore>, clock: Arc<dyn Clock>, config: &ExchangeConfig) -> Self {
        Self {
            store,
            clock,
            max_range_minutes: config.max_range_minutes,
            max_buckets: config.max_buckets,
            snapshot_max_age: chrono::Duration::from_std(config.snapshot_max_age)
                .unwrap_or(chrono::Duration::MAX),
            snapshots: SnapshotBook::default(),
        }
    }

    /// Ingestion entry point: inserts or replaces candles by timestamp.
    /// The whole batch is validated before anything is written.
    pub async fn upsert(&self, candles: &[Candle]) -> Result<UpsertSummary> {
        for candle in candles {
            candle.validate()?;
        }
        let summary = self.store.upsert(candles).await?;
        debug!(
            inserted = summary.inserted,
            replaced = summary.replaced,
            "Candles upserted"
        );
        Ok(summary)
    }

    /// The candle at `timestamp`, or else the latest one strictly before it.
    pub async fn find_at_or_before(&self, timestamp: i64) -> Result<Candle> {
        if timestamp < 0 {
            return Err(ExchangeError::invalid(format!(
                "timestamp must not be negative, got {timestamp}"
            )));
        }
        if let Some(exact) = self.store.exact(timestamp).await? {
            return Ok(exact);
        }
        self.store
            .latest_before(timestamp)
            .await?
            .ok_or_else(|| ExchangeError::not_found(format!("price data at or before {timestamp}")))
    }

    /// The most recent candle as of the oracle's clock.
    pub async fn latest(&self) -> Result<Candle> {
        self.find_at_or_before(self.clock.unix_now()).await
    }

    /// Close of the most recent candle.
    pub async fn current_price(&self) -> Result<Decimal> {
        Ok(self.latest().await?.close)
    }

    /// Raw candles with `from <= timestamp <= to`, ascending.
    ///
    /// # Errors
    ///
    /// [`ExchangeError::RangeTooLarge`] when the window spans more than the
    /// configured number of minutes.
    pub async fn find_range(&self, from: i64, to: i64) -> Result<Vec<Candle>> {
        validate_window(from, to)?;
        let minutes = (to - from) / RAW_INTERVAL_SECS;
        if minutes > self.max_range_minutes {
            return Err(ExchangeError::RangeTooLarge {
                requested: minutes,
                maximum: self.max_range_minutes,
            });
        }
        self.store.range(from, to).await
    }

    /// Candles in `[from, to]` aggregated into `interval`-second buckets.
    ///
    /// Served from a snapshot when a fresh one exists for `interval` and
    /// covers `from`'s bucket; aggregated live otherwise.
    pub async fn downsample(&self, from: i64, to: i64, interval: i64) -> Result<Vec<Candle>> {
        validate_window(from, to)?;
        validate_interval(interval)?;
        let buckets = (to - from) / interval;
        if buckets > self.max_buckets {
            return Err(ExchangeError::RangeTooLarge {
                requested: buckets,
                maximum: self.max_buckets,
            });
        }

        if let Some(snapshot) = self.snapshots.get(interval) {
            let now = self.clock.now();
            if snapshot.is_fresh(now, self.snapshot_max_age) && snapshot.covers(from) {
                debug!(interval, "Serving downsample from snapshot");
                return Ok(snapshot.slice(from, to));
            }
        }

        let raw = self.store.range(from, to).await?;
        Ok(downsample_candles(&raw, interval))
    }

    /// `interval == 60` returns raw candles; anything coarser downsamples.
    pub async fn price_range(&self, from: i64, to: i64, interval: i64) -> Result<Vec<Candle>> {
        if interval == RAW_INTERVAL_SECS {
            self.find_range(from, to).await
        } else {
            self.downsample(from, to, interval).await
        }
    }

    /// Recomputes the snapshot described by `plan`. Returns the number of
    /// buckets it holds.
    pub async fn refresh_snapshot(&self, plan: &SnapshotPlan) -> Result<usize> {
        validate_interval(plan.interval)?;
        let now = self.clock.now();
        let to = now.timestamp();
        let from = match plan.lookback {
            Some(lookback) => bucket_start((now - lookback).timestamp().max(0), plan.interval),
            None => match self.store.first().await? {
                Some(first) => bucket_start(first.timestamp, plan.interval),
                None => 0,
            },
        };

        let raw = self.store.range(from, to).await?;
        let candles = downsample_candles(&raw, plan.interval);
        let buckets = candles.len();
        self.snapshots.put(Snapshot {
            interval: plan.interval,
            covers_from: from,
            generated_at: now,
            candles,
        });
        info!(interval = plan.interval, buckets, "Snapshot refreshed");
        Ok(buckets)
    }

    pub fn snapshot(&self, interval: i64) -> Option<Arc<Snapshot>> {
        self.snapshots.get(interval)
    }
}

fn validate_window(from: i64, to: i64) -> Result<()> {
    if from < 0 || to < 0 {
        return Err(ExchangeError::invalid(format!(
            "timestamps must not be negative, got {from}..{to}"
        )));
    }
    if from > to {
        return Err(ExchangeError::invalid(format!(
            "range start {from} is after its end {to}"
        )));
    }
    Ok(())
}

fn validate_interval(interval: i64) -> Result<()> {
    if interval <= 0 || interval % RAW_INTERVAL_SECS != 0 {
        return Err(ExchangeError::invalid(format!(
            "interval must be a positive multiple of {RAW_INTERVAL_SECS} seconds, got {interval}"
        )));
    }
    Ok(())
}
