//! In-memory store implementations.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CandleStore, UpsertSummary, WalletStore};
use crate::models::{Candle, Wallet, WalletId};
use crate::{ExchangeError, Result};

#[derive(Default)]
struct WalletTable {
    rows: HashMap<WalletId, Wallet>,
    by_fingerprint: HashMap<String, Vec<WalletId>>,
}

/// Wallet table held in process memory.
#[derive(Default)]
pub struct MemoryWalletStore {
    table: RwLock<WalletTable>,
}

impl MemoryWalletStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored wallets.
    pub async fn len(&self) -> usize {
        self.table.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl WalletStore for MemoryWalletStore {
    async fn get(&self, id: &WalletId) -> Result<Option<Wallet>> {
        Ok(self.table.read().await.rows.get(id).cloned())
    }

    async fn insert(&self, wallet: Wallet) -> Result<()> {
        let mut table = self.table.write().await;
        if table.rows.contains_key(&wallet.id) {
            return Err(ExchangeError::Conflict(format!(
                "wallet {} already exists",
                wallet.id
            )));
        }
        table
            .by_fingerprint
            .entry(wallet.secret_fingerprint.clone())
            .or_default()
            .push(wallet.id);
        table.rows.insert(wallet.id, wallet);
        Ok(())
    }

    async fn save(&self, wallet: &Wallet, expected_version: u64) -> Result<u64> {
        let mut table = self.table.write().await;
        let stored = table
            .rows
            .get_mut(&wallet.id)
            .ok_or_else(|| ExchangeError::not_found(format!("wallet {}", wallet.id)))?;
        if stored.version != expected_version {
            return Err(ExchangeError::Conflict(format!(
                "wallet {} is at version {}, expected {expected_version}",
                wallet.id, stored.version
            )));
        }
        // The fingerprint is fixed at creation, so the index needs no update.
        let mut next = wallet.clone();
        next.version = expected_version + 1;
        *stored = next;
        Ok(expected_version + 1)
    }

    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Vec<Wallet>> {
        let table = self.table.read().await;
        let ids = match table.by_fingerprint.get(fingerprint) {
            Some(ids) => ids,
            None => return Ok(Vec::new()),
        };
        Ok(ids
            .iter()
            .filter_map(|id| table.rows.get(id).cloned())
            .collect())
    }

    async fn with_open_orders(&self) -> Result<Vec<Wallet>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter(|w| !w.open_orders.is_empty())
            .cloned()
            .collect())
    }
}

/// Candle series held in an ordered map keyed by timestamp.
#[derive(Default)]
pub struct MemoryCandleStore {
    candles: RwLock<BTreeMap<i64, Candle>>,
}

impl MemoryCandleStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CandleStore for MemoryCandleStore {
    async fn upsert(&self, candles: &[Candle]) -> Result<UpsertSummary> {
        let mut map = self.candles.write().await;
        let mut summary = UpsertSummary::default();
        for candle in candles {
            match map.insert(candle.timestamp, candle.clone()) {
                Some(_) => summary.replaced += 1,
                None => summary.inserted += 1,
            }
        }
        Ok(summary)
    }

    async fn exact(&self, timestamp: i64) -> Result<Option<Candle>> {
        Ok(self.candles.read().await.get(&timestamp).cloned())
    }

    async fn latest_before(&self, timestamp: i64) -> Result<Option<Candle>> {
        Ok(self
            .candles
            .read()
            .await
            .range(..timestamp)
            .next_back()
            .map(|(_, c)| c.clone()))
    }

    async fn range(&self, from: i64, to: i64) -> Result<Vec<Candle>> {
        if from > to {
            return Ok(Vec::new());
        }
        Ok(self
            .candles
            .read()
            .await
            .range(from..=to)
            .map(|(_, c)| c.clone())
            .collect())
    }

    async fn first(&self) -> Result<Option<Candle>> {
        Ok(self.candles.read().await.values().next().cloned())
    }
}
