//! Precomputed downsamples for the coarse chart intervals.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};

use super::bucket_start;
use crate::models::Candle;

/// Seconds in a day.
pub const DAY_SECS: i64 = 86_400;

/// What a snapshot covers: its bucket width and how far back it reaches
/// (`None` for the whole series).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPlan {
    pub interval: i64,
    pub lookback: Option<Duration>,
}

impl SnapshotPlan {
    /// Daily buckets over the trailing year and 15-day buckets over all
    /// history.
    pub fn defaults() -> Vec<SnapshotPlan> {
        vec![
            SnapshotPlan {
                interval: DAY_SECS,
                lookback: Some(Duration::days(365)),
            },
            SnapshotPlan {
                interval: 15 * DAY_SECS,
                lookback: None,
            },
        ]
    }
}

/// Downsampled candles for one interval as of `generated_at`.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub interval: i64,
    /// First bucket start included.
    pub covers_from: i64,
    pub generated_at: DateTime<Utc>,
    pub candles: Vec<Candle>,
}

impl Snapshot {
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.generated_at <= max_age
    }

    /// Whether the bucket containing `from` is inside the snapshot.
    pub fn covers(&self, from: i64) -> bool {
        self.covers_from <= bucket_start(from, self.interval)
    }

    /// Buckets whose start lies in `[bucket_start(from), to]`.
    pub fn slice(&self, from: i64, to: i64) -> Vec<Candle> {
        let start = bucket_start(from, self.interval);
        self.candles
            .iter()
            .filter(|c| c.timestamp >= start && c.timestamp <= to)
            .cloned()
            .collect()
    }
}

/// Latest snapshot per interval.
#[derive(Default)]
pub struct SnapshotBook {
    by_interval: RwLock<HashMap<i64, Arc<Snapshot>>>,
}

impl SnapshotBook {
    pub fn get(&self, interval: i64) -> Option<Arc<Snapshot>> {
        self.by_interval
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&interval)
            .cloned()
    }

    pub fn put(&self, snapshot: Snapshot) {
        self.by_interval
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(snapshot.interval, Arc::new(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot(generated_at: DateTime<Utc>) -> Snapshot {
        let candles = (0..3)
            .map(|day| {
                Candle::new(
                    (10 + day) * DAY_SECS,
                    dec!(1),
                    dec!(1),
                    dec!(1),
                    dec!(1),
                    dec!(1),
                )
            })
            .collect();
        Snapshot {
            interval: DAY_SECS,
            covers_from: 10 * DAY_SECS,
            generated_at,
            candles,
        }
    }

    #[test]
    fn freshness_is_inclusive_of_max_age() {
        let now = Utc::now();
        let snap = snapshot(now - Duration::hours(2));
        assert!(snap.is_fresh(now, Duration::hours(2)));
        assert!(!snap.is_fresh(now, Duration::minutes(119)));
    }

    #[test]
    fn slice_includes_the_bucket_holding_from() {
        let snap = snapshot(Utc::now());
        assert!(snap.covers(10 * DAY_SECS + 500));
        assert!(!snap.covers(10 * DAY_SECS - 1));

        let out = snap.slice(11 * DAY_SECS + 500, 12 * DAY_SECS);
        let keys: Vec<i64> = out.iter().map(|c| c.timestamp).collect();
        assert_eq!(keys, vec![11 * DAY_SECS, 12 * DAY_SECS]);
    }

    #[test]
    fn book_replaces_per_interval() {
        let book = SnapshotBook::default();
        assert!(book.get(DAY_SECS).is_none());
        book.put(snapshot(Utc::now()));
        let mut newer = snapshot(Utc::now());
        newer.candles.clear();
        book.put(newer);
        assert!(book.get(DAY_SECS).unwrap().candles.is_empty());
    }

    #[test]
    fn default_plans() {
        let plans = SnapshotPlan::defaults();
        assert_eq!(plans[0].interval, 86_400);
        assert_eq!(plans[1].interval, 1_296_000);
        assert!(plans[1].lookback.is_none());
    }
}
