//! Persistence seam for wallets and candles.
//!
//! Components never talk to a database directly; they receive an
//! `Arc<dyn WalletStore>` / `Arc<dyn CandleStore>` at construction. The
//! in-memory implementations in [`memory`] back the tests and the demo
//! service.

pub mod memory;

use async_trait::async_trait;

use crate::Result;
use crate::models::{Candle, Wallet, WalletId};

pub use memory::{MemoryCandleStore, MemoryWalletStore};

/// Wallet rows keyed by id, with a secondary index on `secret_fingerprint`.
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Loads one wallet, `None` if absent.
    async fn get(&self, id: &WalletId) -> Result<Option<Wallet>>;

    /// Inserts a new wallet.
    ///
    /// Fails with [`Conflict`](crate::ExchangeError::Conflict) if the id
    /// already exists.
    async fn insert(&self, wallet: Wallet) -> Result<()>;

    /// Replaces a wallet if its stored version still equals
    /// `expected_version`, and returns the new version.
    ///
    /// Fails with [`Conflict`](crate::ExchangeError::Conflict) when another
    /// writer got there first.
    async fn save(&self, wallet: &Wallet, expected_version: u64) -> Result<u64>;

    /// All wallets whose fingerprint equals `fingerprint`.
    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Vec<Wallet>>;

    /// All wallets holding at least one open order.
    async fn with_open_orders(&self) -> Result<Vec<Wallet>>;
}

/// Counts reported by an upsert batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub replaced: usize,
}

/// Candle rows unique by timestamp.
#[async_trait]
pub trait CandleStore: Send + Sync {
    /// Inserts or replaces candles keyed by timestamp.
    async fn upsert(&self, candles: &[Candle]) -> Result<UpsertSummary>;

    /// The candle with exactly this timestamp.
    async fn exact(&self, timestamp: i64) -> Result<Option<Candle>>;

    /// The latest candle strictly before `timestamp`.
    async fn latest_before(&self, timestamp: i64) -> Result<Option<Candle>>;

    /// Candles with `from <= timestamp <= to`, ascending.
    async fn range(&self, from: i64, to: i64) -> Result<Vec<Candle>>;

    /// The earliest stored candle.
    async fn first(&self) -> Result<Option<Candle>>;
}
