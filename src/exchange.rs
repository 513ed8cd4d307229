//! The exchange's query surface.
//!
//! [`Exchange`] wires the components together over injected stores and a
//! clock, and exposes the operations a transport layer calls with an
//! already-authenticated wallet id.

use std::sync::Arc;

use dashmap::DashMap;
use rand::Rng;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;

use crate::clock::Clock;
use crate::config::ExchangeConfig;
use crate::identity::{self, IdentityResolver, SecretPhrase};
use crate::jobs::BackgroundTasks;
use crate::ledger::Ledger;
use crate::models::{
    Candle, DepositEntry, OpenOrder, OrderId, Side, TradeEntry, Wallet, WalletId,
};
use crate::money::Asset;
use crate::orders::{MatchReport, OrderEngine};
use crate::price::{PriceCache, PriceOracle};
use crate::profit;
use crate::store::{CandleStore, UpsertSummary, WalletStore};
use crate::trade::{TradeExecutor, TradeReceipt};
use crate::{ExchangeError, Result};

/// Attempts at drawing a phrase no existing wallet resolves from.
const MAX_PHRASE_ATTEMPTS: u32 = 5;

/// A freshly created wallet. `phrase` is shown to the user once and not
/// kept anywhere else.
#[derive(Debug)]
pub struct NewWallet {
    pub id: WalletId,
    pub phrase: SecretPhrase,
    pub balance_fiat: Decimal,
}

/// Everything the wallet page shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletSummary {
    pub id: WalletId,
    pub balance_fiat: Decimal,
    pub balance_asset: Decimal,
    pub total_deposited: Decimal,
    pub net_profit: Decimal,
    pub percent_profit: Decimal,
    pub deposit_history: Vec<DepositEntry>,
    pub trade_history: Vec<TradeEntry>,
    pub open_orders: Vec<OpenOrder>,
}

pub struct Exchange {
    config: ExchangeConfig,
    clock: Arc<dyn Clock>,
    ledger: Arc<Ledger>,
    identity: IdentityResolver,
    oracle: Arc<PriceOracle>,
    cache: PriceCache,
    trades: TradeExecutor,
    orders: Arc<OrderEngine>,
    registrations: DashMap<String, Arc<Mutex<()>>>,
}

impl Exchange {
    pub fn new(
        config: ExchangeConfig,
        wallets: Arc<dyn WalletStore>,
        candles: Arc<dyn CandleStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ledger = Arc::new(Ledger::new(wallets.clone(), clock.clone()));
        let identity = IdentityResolver::new(wallets, config.fingerprint_key.clone());
        let oracle = Arc::new(PriceOracle::new(candles, clock.clone(), &config));
        let cache = PriceCache::new(oracle.clone(), clock.clone(), config.price_cache_ttl);
        let trades = TradeExecutor::new(ledger.clone(), oracle.clone(), config.rules.clone());
        let orders = Arc::new(OrderEngine::new(
            ledger.clone(),
            oracle.clone(),
            config.rules.clone(),
        ));
        Self {
            config,
            clock,
            ledger,
            identity,
            oracle,
            cache,
            trades,
            orders,
            registrations: DashMap::new(),
        }
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn oracle(&self) -> &Arc<PriceOracle> {
        &self.oracle
    }

    pub fn orders(&self) -> &Arc<OrderEngine> {
        &self.orders
    }

    /// Generates a phrase, opens a wallet for it with a random starter
    /// balance, and hands the phrase back.
    ///
    /// # Errors
    ///
    /// [`ExchangeError::Conflict`] if every drawn phrase was already taken.
    pub async fn create_wallet(&self) -> Result<NewWallet> {
        for _ in 0..MAX_PHRASE_ATTEMPTS {
            let phrase = SecretPhrase::generate()?;
            let starter = self.starter_fiat();
            match self.register_wallet(&phrase, starter).await {
                Ok(id) => {
                    return Ok(NewWallet {
                        id,
                        phrase,
                        balance_fiat: starter,
                    });
                }
                Err(ExchangeError::Conflict(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(ExchangeError::Conflict(format!(
            "no unused seed phrase after {MAX_PHRASE_ATTEMPTS} attempts"
        )))
    }

    /// Opens a wallet for a caller-supplied phrase. A non-zero
    /// `starter_fiat` is booked as the opening deposit.
    ///
    /// # Errors
    ///
    /// [`ExchangeError::Conflict`] if a wallet already resolves from
    /// `phrase`.
    pub async fn register_wallet(&self, phrase: &SecretPhrase, starter_fiat: Decimal) -> Result<WalletId> {
        Asset::Fiat.validate(starter_fiat)?;
        // Registrations sharing a fingerprint bucket run one at a time, so
        // the uniqueness check and the insert cannot interleave.
        let fingerprint = identity::fingerprint(&self.config.fingerprint_key, phrase)?;
        let lock = self.registrations.entry(fingerprint).or_default().clone();
        let _guard = lock.lock().await;

        match self.identity.resolve_phrase(phrase).await {
            Ok(_) => {
                return Err(ExchangeError::Conflict(
                    "seed phrase is already in use".to_string(),
                ));
            }
            Err(ExchangeError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let credentials = self.identity.credentials(phrase)?;
        let wallet = Wallet::open(
            WalletId::new(),
            credentials.fingerprint,
            credentials.verifier,
            self.clock.now(),
        );
        let id = wallet.id;
        self.ledger.open_wallet(wallet).await?;
        if !starter_fiat.is_zero() {
            self.ledger.deposit(&id, starter_fiat).await?;
        }
        info!(wallet = %id, %starter_fiat, "Wallet registered");
        Ok(id)
    }

    /// Resolves a recovery phrase to its wallet.
    pub async fn unlock(&self, phrase: &str) -> Result<WalletId> {
        self.identity.resolve(phrase).await
    }

    /// Balances, histories and profit figures for one wallet.
    ///
    /// # Errors
    ///
    /// [`ExchangeError::NotFound`] if the wallet or price data is missing.
    pub async fn wallet_summary(&self, id: &WalletId) -> Result<WalletSummary> {
        let wallet = self.ledger.wallet(id).await?;
        let price = self.oracle.current_price().await?;
        let valuation = profit::valuation(&wallet, price)?;
        Ok(WalletSummary {
            id: wallet.id,
            balance_fiat: wallet.balance_fiat,
            balance_asset: wallet.balance_asset,
            total_deposited: wallet.total_deposited,
            net_profit: valuation.net_profit,
            percent_profit: valuation.percent_profit,
            deposit_history: wallet.deposit_history,
            trade_history: wallet.trade_history,
            open_orders: wallet.open_orders,
        })
    }

    /// Deposits fiat. Returns the new fiat balance.
    ///
    /// # Errors
    ///
    /// [`ExchangeError::InvalidInput`] for more than 2 decimals,
    /// [`ExchangeError::BelowMinimum`] under the configured minimum.
    pub async fn deposit(&self, id: &WalletId, amount: Decimal) -> Result<Decimal> {
        Asset::Fiat.validate(amount)?;
        let minimum = self.config.rules.min_deposit;
        if amount < minimum {
            return Err(ExchangeError::BelowMinimum {
                asset: Asset::Fiat,
                amount,
                minimum,
            });
        }
        self.ledger.deposit(id, amount).await
    }

    pub async fn market_trade(&self, id: &WalletId, side: Side, amount: Decimal) -> Result<TradeReceipt> {
        self.trades.market_trade(id, side, amount).await
    }

    pub async fn place_limit_order(
        &self,
        id: &WalletId,
        side: Side,
        amount: Decimal,
        limit_price: Decimal,
    ) -> Result<OrderId> {
        self.orders.place(id, side, amount, limit_price).await
    }

    pub async fn cancel_order(&self, id: &WalletId, order_id: &OrderId, refund: bool) -> Result<()> {
        self.orders.cancel(id, order_id, refund).await.map(|_| ())
    }

    /// One open order of this wallet.
    pub async fn order(&self, id: &WalletId, order_id: &OrderId) -> Result<OpenOrder> {
        self.ledger
            .wallet(id)
            .await?
            .order(order_id)
            .cloned()
            .ok_or_else(|| ExchangeError::not_found(format!("order {order_id}")))
    }

    pub async fn price_at(&self, timestamp: i64) -> Result<Candle> {
        self.oracle.find_at_or_before(timestamp).await
    }

    pub async fn price_range(&self, from: i64, to: i64, interval: i64) -> Result<Vec<Candle>> {
        self.oracle.price_range(from, to, interval).await
    }

    /// Latest candle for display, possibly a few seconds old.
    pub async fn ticker(&self) -> Result<Candle> {
        self.cache.latest().await
    }

    pub async fn ingest_candles(&self, candles: &[Candle]) -> Result<UpsertSummary> {
        self.oracle.upsert(candles).await
    }

    /// Runs one matcher pass now instead of waiting for the background task.
    pub async fn match_orders(&self) -> Result<MatchReport> {
        self.orders.run_pass().await
    }

    /// Starts the matcher and snapshot refresher.
    pub fn spawn_background(&self) -> BackgroundTasks {
        BackgroundTasks::spawn(
            self.orders.clone(),
            self.oracle.clone(),
            self.config.match_interval,
            self.config.snapshot_refresh,
        )
    }

    fn starter_fiat(&self) -> Decimal {
        let whole = rand::thread_rng().gen_range(0..=self.config.starter_fiat_max);
        Decimal::from(whole)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{MemoryCandleStore, MemoryWalletStore};
    use rust_decimal_macros::dec;

    fn exchange() -> Exchange {
        Exchange::new(
            ExchangeConfig::default(),
            Arc::new(MemoryWalletStore::new()),
            Arc::new(MemoryCandleStore::new()),
            Arc::new(ManualClock::at_unix(600)),
        )
    }

    #[tokio::test]
    async fn created_wallet_unlocks_with_its_phrase() {
        let exchange = exchange();
        let created = exchange.create_wallet().await.unwrap();
        assert!(created.balance_fiat <= dec!(1000));

        let id = exchange.unlock(created.phrase.expose()).await.unwrap();
        assert_eq!(id, created.id);

        let wallet = exchange.ledger().wallet(&id).await.unwrap();
        assert_eq!(wallet.balance_fiat, created.balance_fiat);
        assert_eq!(wallet.total_deposited, created.balance_fiat);
        assert_eq!(wallet.balance_asset, dec!(0));
    }

    #[tokio::test]
    async fn same_phrase_cannot_register_twice() {
        let exchange = exchange();
        let phrase = SecretPhrase::from_entropy(&[3u8; 16]).unwrap();
        exchange.register_wallet(&phrase, dec!(0)).await.unwrap();
        assert!(matches!(
            exchange.register_wallet(&phrase, dec!(0)).await,
            Err(ExchangeError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn deposit_enforces_minimum_and_precision() {
        let exchange = exchange();
        let phrase = SecretPhrase::from_entropy(&[4u8; 16]).unwrap();
        let id = exchange.register_wallet(&phrase, dec!(0)).await.unwrap();

        assert!(matches!(
            exchange.deposit(&id, dec!(9.99)).await,
            Err(ExchangeError::BelowMinimum { .. })
        ));
        assert!(matches!(
            exchange.deposit(&id, dec!(10.001)).await,
            Err(ExchangeError::InvalidInput(_))
        ));
        assert_eq!(exchange.deposit(&id, dec!(10)).await.unwrap(), dec!(10));
    }

    #[tokio::test]
    async fn order_lookup_is_scoped_to_wallet() {
        let exchange = exchange();
        let a = exchange
            .register_wallet(&SecretPhrase::from_entropy(&[5u8; 16]).unwrap(), dec!(50))
            .await
            .unwrap();
        let b = exchange
            .register_wallet(&SecretPhrase::from_entropy(&[6u8; 16]).unwrap(), dec!(50))
            .await
            .unwrap();

        let order = exchange
            .place_limit_order(&a, Side::Buy, dec!(20), dec!(100))
            .await
            .unwrap();
        assert_eq!(exchange.order(&a, &order).await.unwrap().amount, dec!(20));
        assert!(matches!(
            exchange.order(&b, &order).await,
            Err(ExchangeError::NotFound(_))
        ));
    }
}
