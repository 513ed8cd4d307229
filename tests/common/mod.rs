//! Shared test utilities.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;

use simex::clock::ManualClock;
use simex::config::ExchangeConfig;
use simex::exchange::Exchange;
use simex::identity::SecretPhrase;
use simex::models::{Candle, Wallet, WalletId};
use simex::store::{MemoryCandleStore, MemoryWalletStore, WalletStore};
use simex::{ExchangeError, Result};

/// A minute boundary that is also aligned to 3 minutes.
pub const BASE_TS: i64 = 1_699_999_920;

/// Wallet store that fails chosen `save` calls with `Unavailable`.
///
/// Saves are numbered from 1 in call order.
pub struct FlakyWalletStore {
    inner: MemoryWalletStore,
    saves: AtomicUsize,
    failing: HashSet<usize>,
}

impl FlakyWalletStore {
    pub fn failing_saves(failing: impl IntoIterator<Item = usize>) -> Self {
        Self {
            inner: MemoryWalletStore::new(),
            saves: AtomicUsize::new(0),
            failing: failing.into_iter().collect(),
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletStore for FlakyWalletStore {
    async fn get(&self, id: &WalletId) -> Result<Option<Wallet>> {
        self.inner.get(id).await
    }

    async fn insert(&self, wallet: Wallet) -> Result<()> {
        self.inner.insert(wallet).await
    }

    async fn save(&self, wallet: &Wallet, expected_version: u64) -> Result<u64> {
        let n = self.saves.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing.contains(&n) {
            return Err(ExchangeError::Unavailable(format!("injected failure on save {n}")));
        }
        self.inner.save(wallet, expected_version).await
    }

    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Vec<Wallet>> {
        self.inner.find_by_fingerprint(fingerprint).await
    }

    async fn with_open_orders(&self) -> Result<Vec<Wallet>> {
        self.inner.with_open_orders().await
    }
}

/// Wallet store that yields to the scheduler before every call, so
/// concurrent callers interleave at each await.
#[derive(Default)]
pub struct YieldingWalletStore {
    inner: MemoryWalletStore,
}

impl YieldingWalletStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.len().await
    }
}

#[async_trait]
impl WalletStore for YieldingWalletStore {
    async fn get(&self, id: &WalletId) -> Result<Option<Wallet>> {
        tokio::task::yield_now().await;
        self.inner.get(id).await
    }

    async fn insert(&self, wallet: Wallet) -> Result<()> {
        tokio::task::yield_now().await;
        self.inner.insert(wallet).await
    }

    async fn save(&self, wallet: &Wallet, expected_version: u64) -> Result<u64> {
        tokio::task::yield_now().await;
        self.inner.save(wallet, expected_version).await
    }

    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Vec<Wallet>> {
        tokio::task::yield_now().await;
        self.inner.find_by_fingerprint(fingerprint).await
    }

    async fn with_open_orders(&self) -> Result<Vec<Wallet>> {
        tokio::task::yield_now().await;
        self.inner.with_open_orders().await
    }
}

/// An exchange over in-memory stores with its clock at `now`.
pub fn exchange_at(now: i64) -> (Exchange, Arc<ManualClock>) {
    exchange_with(Arc::new(MemoryWalletStore::new()), now)
}

pub fn exchange_with(wallets: Arc<dyn WalletStore>, now: i64) -> (Exchange, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::at_unix(now));
    let exchange = Exchange::new(
        ExchangeConfig::default(),
        wallets,
        Arc::new(MemoryCandleStore::new()),
        clock.clone(),
    );
    (exchange, clock)
}

/// A candle whose four prices all equal `price`.
pub fn flat_candle(timestamp: i64, price: Decimal) -> Candle {
    Candle::new(timestamp, price, price, price, price, Decimal::ONE)
}

/// Opens an empty wallet for a deterministic phrase.
pub async fn empty_wallet(exchange: &Exchange, seed: u8) -> WalletId {
    let phrase = SecretPhrase::from_entropy(&[seed; 16]).expect("valid entropy");
    exchange
        .register_wallet(&phrase, Decimal::ZERO)
        .await
        .expect("Failed to register wallet")
}
